//! Manage the stored project collection.

use anyhow::Context;
use clap::Subcommand;
use tokslides_common::config::AppConfig;
use tokslides_project_model::{parse_deck, JsonProjectStore, ProjectRecord, ProjectStore};

#[derive(Subcommand, Debug)]
pub enum ProjectsCommand {
    /// List projects, most recent first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a project with the starter deck
    Create {
        /// Project name (defaults to "Untitled Project N")
        name: Option<String>,
    },

    /// Rename a project
    Rename { id: String, name: String },

    /// Delete a project
    Delete { id: String },

    /// Print a project's markdown
    Show { id: String },

    /// Replace a project's markdown with a file's contents
    Import {
        id: String,
        file: std::path::PathBuf,

        /// Also switch the project's theme
        #[arg(long)]
        theme: Option<String>,
    },
}

pub fn run(config: &AppConfig, command: ProjectsCommand) -> anyhow::Result<()> {
    let path = config.projects_file();
    let mut store = JsonProjectStore::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    match command {
        ProjectsCommand::List { json } => {
            let projects = store.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects yet. Create one with `tokslides projects create`.");
            } else {
                for project in &projects {
                    print_row(project);
                }
            }
        }
        ProjectsCommand::Create { name } => {
            let project = store.create(name.as_deref())?;
            println!("Created {} ({})", project.name, project.id);
        }
        ProjectsCommand::Rename { id, name } => {
            let project = store.rename(&id, &name)?;
            println!("Renamed {} to '{}'", project.id, project.name);
        }
        ProjectsCommand::Delete { id } => {
            store.delete(&id)?;
            println!("Deleted {id}");
        }
        ProjectsCommand::Show { id } => {
            let project = store
                .get(&id)
                .with_context(|| format!("no project with id '{id}'"))?;
            println!("{}", project.content);
        }
        ProjectsCommand::Import { id, file, theme } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let current = store
                .get(&id)
                .with_context(|| format!("no project with id '{id}'"))?;
            let theme_id = theme.unwrap_or(current.theme_id);
            if store.autosave(&id, &content, &theme_id)? {
                println!("Saved {} slides to {}", parse_deck(&content).len(), id);
            } else {
                println!("No changes");
            }
        }
    }

    Ok(())
}

fn print_row(project: &ProjectRecord) {
    let modified = tokslides_common::clock::format_unix_millis(project.last_modified);
    println!(
        "{:<22} {:<28} {:>3} slides  {:<16} {}",
        project.id,
        project.name,
        parse_deck(&project.content).len(),
        project.theme_id,
        modified
    );
}
