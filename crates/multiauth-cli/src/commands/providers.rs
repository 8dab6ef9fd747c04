//! providers and provider-for commands

use super::CommandContext;
use anyhow::Result;
use colored::Colorize;
use multiauth_auth::ProviderDescriptor;
use serde::Serialize;

#[derive(Serialize)]
struct ProviderInfo {
    key: String,
    kind: String,
    label: String,
    features: String,
    shared_table: bool,
}

impl From<&ProviderDescriptor> for ProviderInfo {
    fn from(descriptor: &ProviderDescriptor) -> Self {
        Self {
            key: descriptor.key().to_string(),
            kind: descriptor.kind().to_string(),
            label: descriptor.provider().label(),
            features: descriptor.features().to_string(),
            shared_table: descriptor.uses_shared_table(),
        }
    }
}

pub async fn list(ctx: &CommandContext) -> Result<()> {
    let providers: Vec<ProviderInfo> = ctx.dispatcher.providers().iter().map(Into::into).collect();

    if ctx.is_json() {
        return ctx.print_json(&providers);
    }

    if !ctx.quiet {
        println!(
            "{:<32} {:<12} {:<24} {}",
            "KEY".bold(),
            "KIND".bold(),
            "LABEL".bold(),
            "FEATURES".bold()
        );
    }
    for p in &providers {
        let key = if p.shared_table {
            format!("{} *", p.key)
        } else {
            p.key.clone()
        };
        println!("{:<32} {:<12} {:<24} {}", key, p.kind, p.label, p.features);
    }
    ctx.info(&format!("\n{} provider(s), * owns the account table", providers.len()));
    Ok(())
}

pub async fn provider_for(ctx: &CommandContext, login: &str) -> Result<()> {
    let provider = ctx.dispatcher.provider_for_login(login, None).await?;
    let info = provider.map(ProviderInfo::from);

    if ctx.is_json() {
        return ctx.print_json(&info);
    }

    match info {
        Some(p) => println!("{} ({})", p.key, p.label),
        None => println!("{}", "no registered provider".yellow()),
    }
    Ok(())
}
