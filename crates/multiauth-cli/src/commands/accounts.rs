//! Account commands

use super::{password_or_stdin, CommandContext};
use anyhow::Result;
use colored::Colorize;
use multiauth_core::tag::LEGACY_DIRECTORY_SENTINEL;
use multiauth_core::PasswordField;
use serde::Serialize;

#[derive(Serialize)]
struct AccountInfo {
    login: String,
    owner: String,
}

/// Owner column: the tag key, `legacy ldap`, `none` or `local`
fn owner_of(password: &str) -> String {
    match PasswordField::classify(password) {
        PasswordField::ProviderTag(key) => key.to_string(),
        PasswordField::LegacyDirectory => "legacy ldap".to_string(),
        PasswordField::NoLocalSecret => "none".to_string(),
        PasswordField::Secret(_) => "local".to_string(),
    }
}

pub async fn list(ctx: &CommandContext, pattern: &str) -> Result<()> {
    let mut users = ctx.dispatcher.list_users(pattern).await?;
    users.sort_by(|a, b| a.login.cmp(&b.login));

    let accounts: Vec<AccountInfo> = users
        .iter()
        .map(|u| AccountInfo {
            login: u.login.clone(),
            owner: owner_of(&u.password),
        })
        .collect();

    if ctx.is_json() {
        return ctx.print_json(&accounts);
    }

    for account in &accounts {
        println!("{:<32} {}", account.login, account.owner);
    }
    ctx.info(&format!("{} account(s)", accounts.len()));
    Ok(())
}

pub async fn remove(ctx: &CommandContext, login: &str) -> Result<()> {
    if ctx.dispatcher.get_user(login).await?.is_none() {
        anyhow::bail!("No account '{}'", login);
    }
    ctx.dispatcher.remove_user(login).await?;
    ctx.info(&format!("{} {}", "Removed".green(), login));
    Ok(())
}

pub async fn can_change_password(ctx: &CommandContext, login: &str) -> Result<()> {
    let allowed = ctx.dispatcher.can_change_password(login).await?;

    if ctx.is_json() {
        return ctx.print_json(&serde_json::json!({ "login": login, "can_change_password": allowed }));
    }
    println!("{}", if allowed { "yes".green() } else { "no".red() });
    Ok(())
}

pub async fn change_password(ctx: &CommandContext, login: &str, password: Option<String>) -> Result<()> {
    let password = password_or_stdin(password, "New password")?;
    if password.is_empty() {
        anyhow::bail!("The new password cannot be empty");
    }

    ctx.dispatcher.change_password(login, &password).await?;
    ctx.info(&format!("{} password of {}", "Changed".green(), login));
    Ok(())
}

pub async fn set_provider(ctx: &CommandContext, login: &str, provider: &str) -> Result<()> {
    ctx.dispatcher.update_provider_in_account(login, provider).await?;
    ctx.info(&format!("{} is now owned by {}", login, provider.bold()));
    Ok(())
}

/// Migrate one account, or every account still carrying the marker
pub async fn migrate_ldapdao(ctx: &CommandContext, login: Option<&str>) -> Result<()> {
    let logins: Vec<String> = match login {
        Some(login) => vec![login.to_string()],
        None => ctx
            .dispatcher
            .list_users("")
            .await?
            .into_iter()
            .filter(|u| u.password == LEGACY_DIRECTORY_SENTINEL)
            .map(|u| u.login)
            .collect(),
    };

    let mut migrated = Vec::new();
    for login in &logins {
        if ctx.dispatcher.migrate_legacy_directory_sentinel(login).await? {
            migrated.push(login.clone());
        }
    }

    if ctx.is_json() {
        return ctx.print_json(&serde_json::json!({ "migrated": migrated }));
    }
    for login in &migrated {
        println!("{} {}", "Migrated".green(), login);
    }
    ctx.info(&format!("{} account(s) migrated", migrated.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_of() {
        assert_eq!(owner_of("!!multiauth:ldap:corp!!"), "ldap:corp");
        assert_eq!(owner_of(LEGACY_DIRECTORY_SENTINEL), "legacy ldap");
        assert_eq!(owner_of(""), "none");
        assert_eq!(owner_of("$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA"), "local");
    }
}
