use anyhow::Result;
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

// CLI Commands (cmd_ prefix)
mod cmd_chapters;
mod cmd_ls;
mod cmd_rm;
mod cmd_status;

// Helper modules (no cmd_ prefix)
mod logger;
mod utils;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(bin_name = "booksync")]
#[command(version = VERSION)]
#[command(about = concat!("booksync v", env!("CARGO_PKG_VERSION"), " - chaptered book storage inspection"))]
#[command(long_about = concat!(
    "booksync v", env!("CARGO_PKG_VERSION"), " - chaptered book storage inspection\n\n",
    "Inspects a books directory maintained by the companion-device sync:\n",
    "the bookshelf catalog, per-book sharded chapter indexes, and chapter\n",
    "content synced in resumable batches."
))]
#[command(author)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Books directory
    #[arg(short = 'C', long = "dir", global = true, default_value = ".", value_hint = ValueHint::DirPath)]
    dir: PathBuf,

    /// Suppress progress output
    #[arg(long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Ls(cmd_ls::LsCommand),
    Status(cmd_status::StatusCommand),
    Chapters(cmd_chapters::ChaptersCommand),
    Rm(cmd_rm::RmCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger based on verbosity flags
    logger::init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Ls(cmd) => cmd_ls::run(cmd, cli.dir)?,
        Commands::Status(cmd) => cmd_status::run(cmd, cli.dir)?,
        Commands::Chapters(cmd) => cmd_chapters::run(cmd, cli.dir)?,
        Commands::Rm(cmd) => cmd_rm::run(cmd, cli.dir)?,
    }

    Ok(())
}

/// Macro to create clap help templates with examples
/// This works around the limitation that {bin} doesn't work in after_help
#[macro_export]
macro_rules! clap_help {
    (examples: $examples:literal) => {{
        const BIN: &str = env!("CARGO_PKG_NAME");
        concat!(
            "{about-with-newline}\n",
            "{usage-heading} {usage}\n\n",
            "{all-args}\n\n",
            "Examples:\n",
            $examples
        ).replace("{bin}", BIN)
    }};
}
