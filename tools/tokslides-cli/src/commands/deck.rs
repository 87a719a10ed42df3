//! Resolving the deck a command works on.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokslides_common::config::AppConfig;
use tokslides_project_model::{
    find_theme, FsImageStore, JsonProjectStore, ProjectStore, Theme, STARTER_DECK,
};
use tokslides_render_engine::SvgSurfaceRenderer;

use crate::DeckSource;

/// Markdown and theme ready to present.
#[derive(Debug, Clone)]
pub struct LoadedDeck {
    pub name: String,
    pub markdown: String,
    pub theme: Theme,
    /// Directory relative image paths resolve against.
    pub asset_root: Option<PathBuf>,
}

/// Read the deck named by `source`, falling back to the most recent project
/// and then to the starter deck.
pub fn load(config: &AppConfig, source: &DeckSource) -> anyhow::Result<LoadedDeck> {
    let (name, markdown, theme_id, asset_root) = if let Some(path) = &source.markdown {
        let markdown = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "deck".to_string());
        (name, markdown, None, path.parent().map(|p| p.to_path_buf()))
    } else {
        let store = JsonProjectStore::open(config.projects_file())
            .context("failed to open the project store")?;
        let record = match &source.project {
            Some(id) => Some(
                store
                    .get(id)
                    .with_context(|| format!("no project with id '{id}'"))?,
            ),
            None => store.list().into_iter().next(),
        };
        match record {
            Some(record) => (record.name, record.content, Some(record.theme_id), None),
            None => ("Starter deck".to_string(), STARTER_DECK.to_string(), None, None),
        }
    };

    let theme_id = source
        .theme
        .clone()
        .or(theme_id)
        .unwrap_or_else(|| tokslides_project_model::DEFAULT_THEME_ID.to_string());

    Ok(LoadedDeck {
        name,
        markdown,
        theme: find_theme(&theme_id),
        asset_root,
    })
}

/// Renderer wired to the configured fonts, image store and the deck's directory.
pub fn renderer(config: &AppConfig, deck: &LoadedDeck) -> Arc<SvgSurfaceRenderer> {
    let mut renderer = SvgSurfaceRenderer::new()
        .with_image_store(Arc::new(FsImageStore::new(config.images_dir())));
    if let Some(dir) = &config.fonts_dir {
        renderer = renderer.with_fonts_dir(dir.clone());
    }
    if let Some(root) = &deck.asset_root {
        renderer = renderer.with_asset_root(root.clone());
    }
    Arc::new(renderer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            downloads_dir: dir.join("downloads"),
            ..AppConfig::default()
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tokslides-cli-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_empty_store_uses_starter_deck() {
        let dir = scratch_dir("starter");
        let deck = load(&config_in(&dir), &DeckSource::default()).unwrap();
        assert_eq!(deck.markdown, STARTER_DECK);
        assert_eq!(deck.theme.id, tokslides_project_model::DEFAULT_THEME_ID);
    }

    #[test]
    fn test_markdown_file_with_theme_override() {
        let dir = scratch_dir("markdown");
        let path = dir.join("talk.md");
        std::fs::write(&path, "# One\n---\n# Two").unwrap();
        let source = DeckSource {
            markdown: Some(path),
            theme: Some("vaporwave".to_string()),
            ..DeckSource::default()
        };
        let deck = load(&config_in(&dir), &source).unwrap();
        assert_eq!(deck.name, "talk");
        assert_eq!(deck.theme.id, "vaporwave");
        assert_eq!(deck.asset_root.as_deref(), Some(dir.as_path()));
    }

    #[test]
    fn test_unknown_project_is_an_error() {
        let dir = scratch_dir("missing");
        let source = DeckSource {
            project: Some("nope".to_string()),
            ..DeckSource::default()
        };
        assert!(load(&config_in(&dir), &source).is_err());
    }
}
