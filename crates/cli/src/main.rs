mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::context::{GlobalOptions, ProjectContext};
use commands::*;
use console::style;
use strata_migrations::MigrationError;

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Batch-based database migrations and seeds", version = strata_core::VERSION)]
struct Cli {
    /// Path to the project configuration file
    #[arg(long, global = true, default_value = strata_core::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory relative paths are resolved against
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Environment whose connection is used
    #[arg(long, global = true, env = "STRATA_ENV", default_value = "development")]
    env: String,

    /// Log each migration as it runs
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run all pending migrations as a new batch
    #[command(name = "migrate:latest")]
    MigrateLatest,

    /// Run the next pending migration, or the named one
    #[command(name = "migrate:up")]
    MigrateUp {
        /// Migration name (file stem)
        name: Option<String>,
    },

    /// Undo the last applied migration, or the named one
    #[command(name = "migrate:down")]
    MigrateDown {
        /// Migration name (file stem)
        name: Option<String>,
    },

    /// Roll back the latest batch
    #[command(name = "migrate:rollback")]
    MigrateRollback {
        /// Roll back every applied migration
        #[arg(long)]
        all: bool,

        /// Only roll back migrations applied from this one onwards
        #[arg(long)]
        name: Option<String>,
    },

    /// Show completed and pending migrations
    #[command(name = "migrate:list", alias = "migrate:status")]
    MigrateList,

    /// Show the most recently applied migration
    #[command(name = "migrate:currentVersion")]
    MigrateCurrentVersion,

    /// Run seed files
    #[command(name = "seed:run")]
    SeedRun {
        /// Run only this seed (file stem)
        #[arg(long)]
        specific: Option<String>,

        /// Allow seeding environments not marked safe, such as production
        #[arg(long)]
        force: bool,
    },

    /// Create a starter configuration file
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = GlobalOptions {
        config: cli.config,
        cwd: cli.cwd,
        env: cli.env,
    };

    let context = || ProjectContext::load(&options);

    match cli.command {
        Commands::Init => init::run(&options),
        Commands::MigrateLatest => migrate::latest(&context()?).await,
        Commands::MigrateUp { name } => migrate::up(&context()?, name.as_deref()).await,
        Commands::MigrateDown { name } => migrate::down(&context()?, name.as_deref()).await,
        Commands::MigrateRollback { all, name } => {
            migrate::rollback(&context()?, name.as_deref(), all).await
        }
        Commands::MigrateList => migrate::list(&context()?).await,
        Commands::MigrateCurrentVersion => migrate::current_version(&context()?).await,
        Commands::SeedRun { specific, force } => {
            seed::run(&context()?, specific.as_deref(), force).await
        }
    }
}

fn report_error(error: &anyhow::Error) {
    let label = style("error:").red().bold();

    match error.downcast_ref::<MigrationError>() {
        // Migration errors already carry their cause in the message
        Some(migration_error) => {
            eprintln!("{} {}", label, migration_error);
            let completed = migration_error.completed();
            if !completed.is_empty() {
                eprintln!("Completed before the failure:");
                for name in completed {
                    eprintln!("  {}", style(name).green());
                }
            }
        }
        None => eprintln!("{} {:#}", label, error),
    }
}
