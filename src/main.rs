use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracker_analytics::{summarize, ReportGenerator};
use tracker_core::config::AppConfig;
use tracker_core::{Database, RecordStore, Scope, UserStore};
use tracker_server::AppState;

#[derive(Parser)]
#[command(
    name = "progress-tracker",
    about = "Log learning sessions and see where your study hours go",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/progress-tracker/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
        /// Keep everything in memory; nothing is written to disk
        #[arg(long)]
        ephemeral: bool,
    },

    /// Print a summary of all recorded sessions
    Report {
        /// Full markdown report instead of the short summary
        #[arg(long)]
        markdown: bool,
    },

    /// Manage login accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account (password is read from stdin when omitted)
    Add {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Block an account from logging in
    Disable { username: String },
    /// Re-enable a disabled account
    Enable { username: String },
    /// List accounts
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "progress_tracker=info,tracker_server=info,tracker_core=info,tower_http=info,warn"
                .into()
        }))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config.
    // `config init` may target a file that does not exist yet.
    let initializing = matches!(
        cli.command,
        Some(Commands::Config {
            action: Some(ConfigAction::Init)
        })
    );
    let mut config = match &cli.config {
        Some(path) if initializing && !path.exists() => AppConfig::default(),
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(path) = &cli.database {
        config.database.path = Some(path.clone());
    }

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            ephemeral,
        }) => {
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
            run_server(config, ephemeral).await?;
        }
        None => run_server(config, false).await?,
        Some(Commands::Report { markdown }) => {
            handle_report(&config, markdown)?;
        }
        Some(Commands::User { action }) => {
            handle_user_command(action, &config)?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, &config, cli.config.as_deref())?;
        }
    }

    Ok(())
}

async fn run_server(config: AppConfig, ephemeral: bool) -> Result<()> {
    let state = if ephemeral {
        tracing::info!("Using in-memory database");
        AppState::new(config, Arc::new(Database::in_memory()?))
    } else {
        tracing::info!("Using database {}", config.database_path().display());
        AppState::open(config)?
    };
    tracker_server::serve(state).await
}

fn open_database(config: &AppConfig) -> Result<Arc<Database>> {
    let path = config.database_path();
    let db = Database::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Arc::new(db))
}

fn handle_report(config: &AppConfig, markdown: bool) -> Result<()> {
    let store = RecordStore::new(open_database(config)?);
    let summary = summarize(&store, Scope::All, config.analytics.recent_window_days)?;
    if markdown {
        print!(
            "{}",
            ReportGenerator::markdown_report(&summary, config.analytics.display_precision)
        );
    } else {
        print!("{}", ReportGenerator::text_summary(&summary));
    }
    Ok(())
}

fn handle_user_command(action: UserAction, config: &AppConfig) -> Result<()> {
    let users = UserStore::new(open_database(config)?).with_cost(config.auth.password_cost);
    match action {
        UserAction::Add { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            let user = users.create(&username, &password)?;
            println!("Created user '{}' (id {})", user.username, user.id);
        }
        UserAction::Disable { username } => {
            users.set_disabled(&username, true)?;
            println!("Disabled user '{}'", username);
        }
        UserAction::Enable { username } => {
            users.set_disabled(&username, false)?;
            println!("Enabled user '{}'", username);
        }
        UserAction::List => {
            for user in users.list()? {
                println!(
                    "{:>4}  {}{}",
                    user.id,
                    user.username,
                    if user.disabled { "  (disabled)" } else { "" }
                );
            }
        }
    }
    Ok(())
}

fn read_password() -> Result<String> {
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn handle_config_command(
    action: Option<ConfigAction>,
    config: &AppConfig,
    config_path: Option<&Path>,
) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save_to(&path)?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_init_honours_config_flag() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tracker.toml");
        let cli = Cli::try_parse_from([
            "progress-tracker",
            "--config",
            path.to_str().unwrap(),
            "config",
            "init",
        ])
        .unwrap();
        let Some(Commands::Config { action }) = cli.command else {
            panic!("expected config subcommand");
        };

        handle_config_command(action, &AppConfig::default(), cli.config.as_deref()).unwrap();
        let written = AppConfig::load_from(&path).unwrap();
        assert_eq!(written.server.port, 8000);
    }
}
