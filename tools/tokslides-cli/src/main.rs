//! TokSlides CLI: record vertical slide videos with a camera overlay.
//!
//! Usage:
//!   tokslides record [OPTIONS]     Present a deck and record it
//!   tokslides snapshot [OPTIONS]   Render one slide to PNG
//!   tokslides projects <COMMAND>   Manage stored projects
//!   tokslides themes               List built-in themes
//!   tokslides check                Check recording capabilities
//!   tokslides config <COMMAND>     Show or initialise the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tokslides",
    about = "Markdown slides recorded as vertical video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the deck comes from.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DeckSource {
    /// Stored project id (defaults to the most recently modified project)
    #[arg(long, conflicts_with = "markdown")]
    pub project: Option<String>,

    /// Markdown file to present instead of a stored project
    #[arg(long)]
    pub markdown: Option<PathBuf>,

    /// Theme id (defaults to the project's theme)
    #[arg(long)]
    pub theme: Option<String>,

    /// Hide the "n / total" footer
    #[arg(long)]
    pub no_footer: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Present a deck and record it; commands are read from stdin
    Record {
        #[command(flatten)]
        deck: DeckSource,

        /// Camera device (platform specific, e.g. /dev/video0)
        #[arg(long, conflicts_with = "no_camera")]
        camera: Option<String>,

        /// Record without the camera overlay
        #[arg(long)]
        no_camera: bool,

        /// Camera shape: circle, square, rounded, portrait or landscape
        #[arg(long, default_value = "circle")]
        shape: String,

        /// Directory for the finished recording (defaults to the downloads directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render one slide to a PNG file
    Snapshot {
        #[command(flatten)]
        deck: DeckSource,

        /// One-based slide number
        #[arg(long, default_value = "1")]
        slide: usize,

        /// Output PNG path
        #[arg(short, long, default_value = "slide.png")]
        out: PathBuf,
    },

    /// Manage stored projects
    Projects {
        #[command(subcommand)]
        command: commands::projects::ProjectsCommand,
    },

    /// List built-in themes
    Themes,

    /// Check recording capabilities
    Check,

    /// Show or initialise the configuration file
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = tokslides_common::config::AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    tokslides_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            deck,
            camera,
            no_camera,
            shape,
            output,
        } => {
            commands::record::run(
                &config,
                commands::record::RecordOptions {
                    deck,
                    camera,
                    no_camera,
                    shape,
                    output,
                },
            )
            .await
        }
        Commands::Snapshot { deck, slide, out } => {
            commands::snapshot::run(&config, deck, slide, out).await
        }
        Commands::Projects { command } => commands::projects::run(&config, command),
        Commands::Themes => commands::themes::run(),
        Commands::Check => commands::check::run(&config).await,
        Commands::Config { command } => commands::config::run(&config, command),
    }
}
