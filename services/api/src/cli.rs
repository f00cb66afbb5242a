use crate::demo::{
    run_demo, run_referentiel_inspect, run_tsf_preview, DemoArgs, ReferentielInspectArgs,
    TsfPreviewArgs,
};
use crate::server;
use alternance::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Alternance",
    about = "Run and explore the apprenticeship management service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with RNCP referential exports
    Referentiel {
        #[command(subcommand)]
        command: ReferentielCommand,
    },
    /// Explore TSF period slicing
    Tsf {
        #[command(subcommand)]
        command: TsfCommand,
    },
    /// Walk one contract through positioning, TSF, proofs, livret and reporting
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ReferentielCommand {
    /// Parse a referential CSV export and print its structure
    Inspect(ReferentielInspectArgs),
}

#[derive(Subcommand, Debug)]
enum TsfCommand {
    /// Print the periods and bloc placement for a contract window
    Preview(TsfPreviewArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Directory receiving archived contract snapshots
    #[arg(long, default_value = "archives")]
    pub(crate) archive_dir: PathBuf,
    /// Seed a tenant and admin key even outside development
    #[arg(long)]
    pub(crate) bootstrap: bool,
    /// Slug of the bootstrap tenant
    #[arg(long, default_value = "cfa-local")]
    pub(crate) bootstrap_slug: String,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            archive_dir: PathBuf::from("archives"),
            bootstrap: false,
            bootstrap_slug: "cfa-local".to_string(),
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Referentiel {
            command: ReferentielCommand::Inspect(args),
        } => run_referentiel_inspect(args),
        Command::Tsf {
            command: TsfCommand::Preview(args),
        } => run_tsf_preview(args),
        Command::Demo(args) => run_demo(args),
    }
}
