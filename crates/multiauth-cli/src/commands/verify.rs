//! verify command - check a password through the providers

use super::{password_or_stdin, CommandContext};
use anyhow::Result;
use colored::Colorize;
use multiauth_core::tag::parse_provider_tag;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct VerifyResult {
    login: String,
    authenticated: bool,
    provider: Option<String>,
    fields: BTreeMap<String, String>,
}

pub async fn execute(ctx: &CommandContext, login: &str, password: Option<String>) -> Result<()> {
    let password = password_or_stdin(password, "Password")?;
    let user = ctx.dispatcher.verify_password(login, &password).await?;

    let result = match user {
        Some(user) => {
            let provider = parse_provider_tag(&user.password)
                .map(str::to_string)
                .or_else(|| {
                    ctx.dispatcher
                        .shared_table_provider()
                        .map(|p| p.key().to_string())
                });
            VerifyResult {
                login: user.login,
                authenticated: true,
                provider,
                fields: user.fields,
            }
        }
        None => VerifyResult {
            login: login.to_string(),
            authenticated: false,
            provider: None,
            fields: BTreeMap::new(),
        },
    };

    if ctx.is_json() {
        ctx.print_json(&result)?;
    } else if result.authenticated {
        println!(
            "{} {} via {}",
            "OK".green().bold(),
            result.login,
            result.provider.as_deref().unwrap_or("-")
        );
        if !ctx.quiet {
            for (name, value) in &result.fields {
                println!("  {:<16} {}", name, value);
            }
        }
    } else {
        println!("{} {}", "DENIED".red().bold(), result.login);
    }

    if !result.authenticated {
        anyhow::bail!("Authentication failed for '{}'", login);
    }
    Ok(())
}
