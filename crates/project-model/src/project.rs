//! Project records and their local store.
//!
//! A project is one markdown deck plus the theme it is shown with. The whole
//! collection is persisted as a single JSON document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::theme::DEFAULT_THEME_ID;

/// Starter deck for new projects.
pub const STARTER_DECK: &str = "# Welcome to TokSlides

Create **vertical** decks for TikTok, Shorts & Reels.

---

# Why TokSlides?

- Fast writing in Markdown
- Customisable themes
- Native 9:16 format

---

<!-- layout: top -->

## Code Snippets

```javascript
const createMagic = () => {
  return \"magic\";
}
```

> Simplicity is the ultimate sophistication.

---

# Thanks!

Follow for more.
";

/// A stored project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    /// Markdown source of the deck.
    pub content: String,
    pub theme_id: String,
    /// Unix milliseconds of the last change.
    pub last_modified: i64,
}

impl ProjectRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_project_id(),
            name: name.into(),
            content: STARTER_DECK.to_string(),
            theme_id: DEFAULT_THEME_ID.to_string(),
            last_modified: now_millis(),
        }
    }
}

/// Errors that can occur when working with projects and assets.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Project not found: {id}")]
    NotFound { id: String },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

/// CRUD over project records.
pub trait ProjectStore {
    /// All projects, most recently modified first.
    fn list(&self) -> Vec<ProjectRecord>;

    fn get(&self, id: &str) -> Option<ProjectRecord>;

    /// Create a project; `None` picks the next free default name.
    fn create(&mut self, name: Option<&str>) -> Result<ProjectRecord, ProjectError>;

    fn rename(&mut self, id: &str, name: &str) -> Result<ProjectRecord, ProjectError>;

    fn delete(&mut self, id: &str) -> Result<(), ProjectError>;

    /// Store new content/theme. Returns `false` (and writes nothing) when
    /// neither changed.
    fn autosave(&mut self, id: &str, content: &str, theme_id: &str) -> Result<bool, ProjectError>;

    /// Bump the modification time (explicit save).
    fn touch(&mut self, id: &str) -> Result<ProjectRecord, ProjectError>;
}

/// Project store backed by one JSON file.
#[derive(Debug)]
pub struct JsonProjectStore {
    path: PathBuf,
    projects: Vec<ProjectRecord>,
}

impl JsonProjectStore {
    /// Open the store at `path`. A missing file is an empty store; a corrupt
    /// one is logged and treated as empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref().to_path_buf();
        let projects = if path.exists() {
            let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
                path: path.clone(),
                source: e,
            })?;
            match serde_json::from_str::<Vec<ProjectRecord>>(&json) {
                Ok(projects) => projects,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable project store");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self { path, projects })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), ProjectError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json =
            serde_json::to_string_pretty(&self.projects).map_err(|e| ProjectError::ParseError {
                path: self.path.clone(),
                source: e,
            })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ProjectError::IoError {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ProjectError::IoError {
            path: self.path.clone(),
            source: e,
        })
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut ProjectRecord, ProjectError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ProjectError::NotFound { id: id.to_string() })
    }

    fn next_default_name(&self) -> String {
        let mut n = self.projects.len() + 1;
        loop {
            let candidate = format!("Untitled Project {n}");
            if !self.projects.iter().any(|p| p.name == candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl ProjectStore for JsonProjectStore {
    fn list(&self) -> Vec<ProjectRecord> {
        let mut projects = self.projects.clone();
        projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        projects
    }

    fn get(&self, id: &str) -> Option<ProjectRecord> {
        self.projects.iter().find(|p| p.id == id).cloned()
    }

    fn create(&mut self, name: Option<&str>) -> Result<ProjectRecord, ProjectError> {
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => self.next_default_name(),
        };
        let record = ProjectRecord::new(name);
        self.projects.push(record.clone());
        self.persist()?;
        tracing::info!(id = %record.id, name = %record.name, "Created project");
        Ok(record)
    }

    fn rename(&mut self, id: &str, name: &str) -> Result<ProjectRecord, ProjectError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProjectError::ValidationError {
                message: "project name cannot be empty".to_string(),
            });
        }
        let record = self.find_mut(id)?;
        record.name = name.to_string();
        record.last_modified = now_millis();
        let record = record.clone();
        self.persist()?;
        Ok(record)
    }

    fn delete(&mut self, id: &str) -> Result<(), ProjectError> {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        if self.projects.len() == before {
            return Err(ProjectError::NotFound { id: id.to_string() });
        }
        self.persist()?;
        tracing::info!(id, "Deleted project");
        Ok(())
    }

    fn autosave(&mut self, id: &str, content: &str, theme_id: &str) -> Result<bool, ProjectError> {
        let record = self.find_mut(id)?;
        if record.content == content && record.theme_id == theme_id {
            return Ok(false);
        }
        record.content = content.to_string();
        record.theme_id = theme_id.to_string();
        record.last_modified = now_millis();
        self.persist()?;
        tracing::debug!(id, "Autosaved project");
        Ok(true)
    }

    fn touch(&mut self, id: &str) -> Result<ProjectRecord, ProjectError> {
        let record = self.find_mut(id)?;
        // Strictly increasing even when two saves land in the same millisecond.
        record.last_modified = now_millis().max(record.last_modified + 1);
        let record = record.clone();
        self.persist()?;
        Ok(record)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Time-ordered project id: millisecond timestamp plus a process-local counter.
fn new_project_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:012x}-{:04x}-{:04x}", nanos >> 20, (nanos & 0xFFFF) as u16, seq & 0xFFFF)
}
