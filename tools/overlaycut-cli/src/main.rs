//! overlaycut CLI: author overlays on a video and export the trimmed result.
//!
//! Usage:
//!   overlaycut init <DOC> --source <VIDEO>     Create an edit document
//!   overlaycut add-text <DOC> <TEXT>           Add a text overlay
//!   overlaycut add-drawing <DOC> <PNG>         Add a drawing overlay
//!   overlaycut layout <DOC>                    Print timeline rows
//!   overlaycut export <DOC> -o <OUT>           Export the trimmed video
//!   overlaycut check                           Check export capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use overlaycut_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "overlaycut",
    about = "Trim videos and burn in text and drawing overlays",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/overlaycut/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an edit document for a source video
    Init {
        /// Path of the document to create
        doc: PathBuf,

        /// Source video
        #[arg(short, long)]
        source: PathBuf,

        /// Source duration in seconds (probed when omitted)
        #[arg(long)]
        duration: Option<f64>,

        /// Preview width the overlays are placed in (source width when omitted)
        #[arg(long)]
        width: Option<u32>,

        /// Preview height the overlays are placed in (source height when omitted)
        #[arg(long)]
        height: Option<u32>,

        /// Trim start (seconds)
        #[arg(long)]
        trim_start: Option<f64>,

        /// Trim end (seconds)
        #[arg(long)]
        trim_end: Option<f64>,
    },

    /// Add a text overlay
    AddText {
        /// Path to the edit document
        doc: PathBuf,

        /// Text content; `\n` starts a new line
        content: String,

        /// Left edge in preview pixels
        #[arg(long, default_value = "0")]
        x: f64,

        /// Top edge in preview pixels
        #[arg(long, default_value = "0")]
        y: f64,

        /// Visible from (seconds)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Visible until (seconds, defaults to the end of the video)
        #[arg(long)]
        end: Option<f64>,

        /// Font size in preview pixels
        #[arg(long, default_value = "32")]
        font_size: f64,

        /// Text color (#rrggbb or a basic name)
        #[arg(long, default_value = "#ffffff")]
        color: String,

        /// Font family
        #[arg(long, default_value = "sans-serif")]
        font_family: String,

        /// Uniform scale about the center
        #[arg(long, default_value = "1.0")]
        scale: f64,

        /// Clockwise rotation in degrees
        #[arg(long, default_value = "0")]
        rotation: f64,
    },

    /// Add a drawing overlay from a PNG
    AddDrawing {
        /// Path to the edit document
        doc: PathBuf,

        /// PNG with the drawing, sized in preview pixels
        png: PathBuf,

        /// Left edge in preview pixels
        #[arg(long, default_value = "0")]
        x: f64,

        /// Top edge in preview pixels
        #[arg(long, default_value = "0")]
        y: f64,

        /// Visible from (seconds)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Visible until (seconds, defaults to the end of the video)
        #[arg(long)]
        end: Option<f64>,
    },

    /// Print the timeline rows of a document
    Layout {
        /// Path to the edit document
        doc: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export the trimmed video with overlays burned in
    Export {
        /// Path to the edit document
        doc: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output width (probed from the source when omitted)
        #[arg(long)]
        width: Option<u32>,

        /// Output height (probed from the source when omitted)
        #[arg(long)]
        height: Option<u32>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Backend: auto|graph|streaming
        #[arg(long, default_value = "auto")]
        strategy: String,

        /// Export the trim only, dropping every overlay
        #[arg(long)]
        no_overlays: bool,
    },

    /// Check export capabilities of this host
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    overlaycut_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Init {
            doc,
            source,
            duration,
            width,
            height,
            trim_start,
            trim_end,
        } => commands::init::run(doc, source, duration, width, height, trim_start, trim_end),
        Commands::AddText {
            doc,
            content,
            x,
            y,
            start,
            end,
            font_size,
            color,
            font_family,
            scale,
            rotation,
        } => commands::add_text::run(
            doc,
            content,
            x,
            y,
            start,
            end,
            font_size,
            color,
            font_family,
            scale,
            rotation,
        ),
        Commands::AddDrawing {
            doc,
            png,
            x,
            y,
            start,
            end,
        } => commands::add_drawing::run(doc, png, x, y, start, end),
        Commands::Layout { doc, json } => commands::layout::run(doc, json),
        Commands::Export {
            doc,
            output,
            width,
            height,
            fps,
            strategy,
            no_overlays,
        } => {
            commands::export::run(
                &config,
                doc,
                output,
                width,
                height,
                fps,
                strategy,
                no_overlays,
            )
            .await
        }
        Commands::Check => commands::check::run(),
    }
}
