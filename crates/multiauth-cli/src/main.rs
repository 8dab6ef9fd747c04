//! Multiauth - credential dispatcher administration
//!
//! Verifies credentials through the configured providers and manages which
//! provider owns each local account.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commands::CommandContext;
use multiauth_core::config::LoggingConfig;
use multiauth_core::MultiAuthConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "multiauth")]
#[command(author = "Multiauth Team")]
#[command(version = multiauth_core::VERSION)]
#[command(about = "Multi-provider credential dispatcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MULTIAUTH_CONFIG")]
    config: Option<String>,

    /// Account database URL (`sqlite://...` or `memory`)
    #[arg(long, global = true, env = "MULTIAUTH_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MULTIAUTH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Only print results
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a password through the configured providers
    Verify {
        login: String,
        /// Read from stdin when not given
        #[arg(long, env = "MULTIAUTH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// List the registered providers
    Providers,

    /// Show the provider owning an account
    ProviderFor { login: String },

    /// Tell whether the password of an account can be changed
    CanChangePassword { login: String },

    /// Change a password through the provider owning the account
    ChangePassword {
        login: String,
        #[arg(long, env = "MULTIAUTH_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Assign an account to a provider
    SetProvider { login: String, provider: String },

    /// Rewrite accounts still carrying the former LDAP driver marker
    MigrateLdapdao {
        /// Migrate a single account
        login: Option<String>,
    },

    /// List accounts, `%` matching any run of characters
    Users {
        #[arg(default_value = "%")]
        pattern: String,
    },

    /// Delete an account
    RemoveUser { login: String },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging);

    if let Commands::Version = cli.command {
        println!("multiauth {}", multiauth_core::VERSION);
        return Ok(());
    }

    let ctx = CommandContext::open(&config, cli.output, cli.quiet).await?;

    match cli.command {
        Commands::Verify { login, password } => commands::verify::execute(&ctx, &login, password).await,
        Commands::Providers => commands::providers::list(&ctx).await,
        Commands::ProviderFor { login } => commands::providers::provider_for(&ctx, &login).await,
        Commands::CanChangePassword { login } => {
            commands::accounts::can_change_password(&ctx, &login).await
        }
        Commands::ChangePassword { login, password } => {
            commands::accounts::change_password(&ctx, &login, password).await
        }
        Commands::SetProvider { login, provider } => {
            commands::accounts::set_provider(&ctx, &login, &provider).await
        }
        Commands::MigrateLdapdao { login } => {
            commands::accounts::migrate_ldapdao(&ctx, login.as_deref()).await
        }
        Commands::Users { pattern } => commands::accounts::list(&ctx, &pattern).await,
        Commands::RemoveUser { login } => commands::accounts::remove(&ctx, &login).await,
        Commands::Version => Ok(()),
    }
}

/// The configuration file when given, else defaults; `MULTIAUTH_*`
/// variables override both.
fn load_config(path: Option<&str>) -> Result<MultiAuthConfig> {
    let mut config = match path {
        Some(path) => MultiAuthConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => MultiAuthConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // logs go to stderr so command output stays parseable
    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}
