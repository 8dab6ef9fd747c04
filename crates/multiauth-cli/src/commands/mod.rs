//! CLI command implementations

pub mod accounts;
pub mod providers;
pub mod verify;

use crate::OutputFormat;
use anyhow::{Context, Result};
use multiauth_auth::{CredentialDispatcher, Ldap3Connector, ProviderContext};
use multiauth_core::MultiAuthConfig;
use multiauth_metadata::Stores;
use serde::Serialize;
use std::io::BufRead;
use std::sync::Arc;
use tracing::debug;

/// Context passed to all commands
pub struct CommandContext {
    pub dispatcher: CredentialDispatcher,
    pub output_format: OutputFormat,
    pub quiet: bool,
}

impl CommandContext {
    /// Open the account stores and build the dispatcher
    pub async fn open(config: &MultiAuthConfig, output_format: OutputFormat, quiet: bool) -> Result<Self> {
        let stores = Stores::open(&config.database.url, config.database.max_connections)
            .await
            .with_context(|| format!("Failed to open account database {}", config.database.url))?;

        let mut context = ProviderContext::new(
            stores.users.clone(),
            stores.groups.clone(),
            Arc::new(Ldap3Connector),
        );

        for (name, url) in &config.database.stores {
            debug!("Opening account store '{}'", name);
            let external = Stores::open(url, config.database.max_connections)
                .await
                .with_context(|| format!("Failed to open account store '{}'", name))?;
            context = context.with_external_store(name.clone(), external.users);
        }

        let dispatcher =
            CredentialDispatcher::new(config, context).context("Invalid provider configuration")?;

        Ok(Self {
            dispatcher,
            output_format,
            quiet,
        })
    }

    /// Check if output should be JSON
    pub fn is_json(&self) -> bool {
        matches!(self.output_format, OutputFormat::Json)
    }

    /// Print info message if not quiet
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Use `given` or read one line from stdin
pub fn password_or_stdin(given: Option<String>, prompt: &str) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }

    eprint!("{}: ", prompt);
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
