mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::migrate::{self, ProjectOptions};
use logging::{init_logging, LoggingConfig};

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Versioned SQL schema migrations")]
#[command(version)]
struct Cli {
    /// Project directory containing environments/, scripts/ and hooks/
    #[arg(long, short, global = true, default_value = ".")]
    path: PathBuf,

    /// Environment to run against
    #[arg(long, short, global = true, default_value = "development")]
    env: String,

    /// Run bootstrap even when the changelog already exists
    #[arg(long, global = true)]
    force: bool,

    /// Show debug output
    #[arg(long, global = true)]
    trace: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bootstrap script (never recorded in the changelog)
    Bootstrap,

    /// Apply all migrations above the current version
    Up {
        /// Apply at most this many migrations
        steps: Option<usize>,
    },

    /// Undo the most recent migrations
    Down {
        /// Number of migrations to undo
        #[arg(default_value = "1")]
        steps: usize,
    },

    /// Apply migrations missing from the changelog, out of order if needed
    Pending,

    /// Migrate up or down to a specific version
    Version {
        /// Target version id
        version: String,
    },

    /// Show applied and pending migrations
    Status,

    /// Print the SQL for a range of migrations without running it
    Script {
        /// Starting version (exclusive), or "pending"
        from: String,

        /// Ending version (inclusive); lower than FROM produces undo scripts
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingConfig::from_flags(cli.trace, cli.log_json))?;

    let project = ProjectOptions {
        path: cli.path,
        env: cli.env,
    };

    match cli.command {
        Commands::Bootstrap => migrate::bootstrap(&project, cli.force).await?,
        Commands::Up { steps } => migrate::up(&project, steps).await?,
        Commands::Down { steps } => migrate::down(&project, steps).await?,
        Commands::Pending => migrate::pending(&project).await?,
        Commands::Version { version } => migrate::version(&project, &version).await?,
        Commands::Status => migrate::status(&project).await?,
        Commands::Script { from, to } => migrate::script(&project, &from, to.as_deref()).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["chronicle", "down", "2", "--env", "production", "--trace"])
            .unwrap();
        assert_eq!(cli.env, "production");
        assert!(cli.trace);
        assert!(matches!(cli.command, Commands::Down { steps: 2 }));
    }

    #[test]
    fn test_script_range_arguments() {
        let cli = Cli::try_parse_from(["chronicle", "script", "pending"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Script { ref from, to: None } if from == "pending"
        ));

        let cli = Cli::try_parse_from(["chronicle", "-p", "db", "script", "5", "2"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("db"));
        assert!(matches!(cli.command, Commands::Script { to: Some(_), .. }));
    }
}
