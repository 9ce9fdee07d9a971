use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;
pub mod legacy;

use self::commands::{
    EventArgs, ExportArgs, ImportArgs, PersonArgs, PlaceArgs, SearchArgs, ShowArgs, SourceArgs,
    SyncArgs, TimelineArgs, Workspace,
};
use self::legacy::LegacyArgs;

#[derive(Parser, Debug)]
#[command(
    name = "annals",
    version,
    about = "Annotated historical timeline with person and place links"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over ANNALS_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over ANNALS_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the interactive reader (default)
    Reader,
    /// Print the timeline grouped by year
    Timeline(TimelineArgs),
    /// Print one event with its annotated sources
    Show(ShowArgs),
    /// Create, edit, move and delete events
    Event(EventArgs),
    /// Manage the sources of an event
    Source(SourceArgs),
    /// Add, update or remove a biography
    Person(PersonArgs),
    /// Add, update or remove a place
    Place(PlaceArgs),
    /// Search events, biographies and places
    Search(SearchArgs),
    /// Write the dataset as pretty-printed JSON
    Export(ExportArgs),
    /// Replace the dataset from a JSON export
    Import(ImportArgs),
    /// Restore the seeded default dataset
    Reset,
    /// Pull from or push to the configured remote document
    Sync(SyncArgs),
    /// Show paths, dataset counts and storage health
    Status,
    /// The legacy annotation workspace
    Legacy(LegacyArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("ANNALS_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("ANNALS_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);
    let storage = storage::init(&paths, &config.storage)?;

    let command = cli.command.unwrap_or(Commands::Reader);
    match command {
        Commands::Reader => {
            let mut app = App::new(config, storage)?;
            commands::run_reader(&mut app)
        }
        Commands::Status => commands::print(commands::status(&paths, &storage)?),
        Commands::Legacy(args) => commands::print(legacy::handle(&storage, args)?),
        command => {
            let mut workspace = Workspace::open(config, storage)?;
            let output = match command {
                Commands::Timeline(args) => commands::timeline(&workspace, &args),
                Commands::Show(args) => commands::show(&workspace, &args)?,
                Commands::Event(args) => commands::handle_event(&mut workspace, args)?,
                Commands::Source(args) => commands::handle_source(&mut workspace, args)?,
                Commands::Person(args) => commands::handle_person(&mut workspace, args)?,
                Commands::Place(args) => commands::handle_place(&mut workspace, args)?,
                Commands::Search(args) => commands::search(&workspace, &args)?,
                Commands::Export(args) => commands::export(&workspace, &args)?,
                Commands::Import(args) => commands::import(&mut workspace, &args)?,
                Commands::Reset => commands::reset(&mut workspace)?,
                Commands::Sync(args) => commands::handle_sync(&mut workspace, args)?,
                Commands::Reader | Commands::Status | Commands::Legacy(_) => String::new(),
            };
            commands::print(output)
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
