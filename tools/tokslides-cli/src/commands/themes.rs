//! List built-in themes.

use tokslides_project_model::{builtin_themes, DEFAULT_THEME_ID};

pub fn run() -> anyhow::Result<()> {
    for theme in builtin_themes() {
        let marker = if theme.id == DEFAULT_THEME_ID { "*" } else { " " };
        let font = match &theme.font.file {
            Some(file) => format!("{} ({file})", theme.font.family),
            None => theme.font.family.clone(),
        };
        println!("{marker} {:<18} {:<18} {}", theme.id, theme.name, font);
    }
    Ok(())
}
