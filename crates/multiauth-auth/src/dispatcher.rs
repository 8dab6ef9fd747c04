//! Credential dispatcher
//!
//! Resolves which provider owns a login from the local password field,
//! verifies the credentials against it and reconciles the local account:
//! provider tag rewrite, hash upgrades and account creation on first login.

use crate::metrics;
use crate::provider::{AuthOutcome, Features, ProviderContext};
use crate::registry::{ProviderDescriptor, ProviderFactories, ProviderRegistry};
use multiauth_core::tag::{looks_like_tag, provider_tag, LEGACY_DIRECTORY_SENTINEL};
use multiauth_core::{Error, MultiAuthConfig, PasswordField, Result, UserRecord, UserStore};
use multiauth_crypto::PasswordHasher;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct CredentialDispatcher {
    registry: ProviderRegistry,
    accounts: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    automatic_account_creation: bool,
}

impl CredentialDispatcher {
    /// Build the dispatcher and the built-in providers listed in `config`
    pub fn new(config: &MultiAuthConfig, context: ProviderContext) -> Result<Self> {
        Self::with_factories(config, context, &ProviderFactories::builtin())
    }

    pub fn with_factories(
        config: &MultiAuthConfig,
        context: ProviderContext,
        factories: &ProviderFactories,
    ) -> Result<Self> {
        let hasher = PasswordHasher::from_config(&config.multiauth.hashing)?;
        let registry = ProviderRegistry::from_config(config, &context, factories)?;

        Ok(Self::from_registry(
            registry,
            context.accounts,
            hasher,
            config.multiauth.automatic_account_creation,
        ))
    }

    pub fn from_registry(
        registry: ProviderRegistry,
        accounts: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        automatic_account_creation: bool,
    ) -> Self {
        Self {
            registry,
            accounts,
            hasher,
            automatic_account_creation,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Verify `password` for `login`.
    ///
    /// Returns the up to date account on success and `None` when the
    /// credentials are rejected. Nothing is persisted on failure.
    #[instrument(skip(self, password))]
    pub async fn verify_password(&self, login: &str, password: &str) -> Result<Option<UserRecord>> {
        let (user, mut created) = match self.accounts.get_by_login(login).await? {
            Some(user) => (user, false),
            None => (self.create_user_object(login, password)?, true),
        };

        let candidates: Vec<&ProviderDescriptor> = if created {
            self.registry.descriptors().iter().collect()
        } else {
            self.candidates_for(&user.password)
        };

        for descriptor in candidates {
            let shared_table = descriptor.uses_shared_table();

            // an unknown login is never checked against the table it
            // would be written into
            if shared_table && created {
                debug!(provider = %descriptor.key(), "Skipping shared table provider for unknown account");
                continue;
            }

            let mut attempt = user.clone();
            let outcome = descriptor
                .provider()
                .verify_authentication(&mut attempt, login, password)
                .await?;
            metrics::record_auth_attempt(descriptor.key(), outcome.as_str());

            if !outcome.is_success() {
                debug!(provider = %descriptor.key(), "Authentication rejected");
                continue;
            }
            let mut user = attempt;
            let mut persisted_login = login.to_string();

            // a provider may return the login with another letter case
            if created && user.login != login && self.accounts.get_by_login(&user.login).await?.is_some() {
                debug!(provider = %descriptor.key(), account = %user.login, "Account exists under provider login");
                created = false;
                persisted_login = user.login.clone();
            }

            if !shared_table {
                let tag = provider_tag(descriptor.key());
                if user.password != tag {
                    user.password = tag;
                    if !created {
                        self.accounts
                            .update_password(&persisted_login, &user.password)
                            .await?;
                    }
                }
            }

            if created {
                let allowed = descriptor
                    .provider()
                    .automatic_account_creation()
                    .unwrap_or(self.automatic_account_creation);
                if !allowed || shared_table {
                    info!(provider = %descriptor.key(), "Authenticated but account creation is disabled");
                    return Ok(None);
                }
                self.accounts.insert(&user).await?;
                metrics::record_account_created(descriptor.key());
                info!(provider = %descriptor.key(), "Created account on first login");
            } else if outcome == AuthOutcome::OkUserNeedsUpdate {
                self.accounts.update(&user).await?;
            }

            info!(provider = %descriptor.key(), "Authenticated");
            return Ok(Some(user));
        }

        Ok(None)
    }

    /// Providers to try for an existing account, in order
    fn candidates_for(&self, password_field: &str) -> Vec<&ProviderDescriptor> {
        match PasswordField::classify(password_field) {
            PasswordField::ProviderTag(key) => {
                if let Some(descriptor) = self.registry.get(key) {
                    return vec![descriptor];
                }
                warn!(provider = %key, "Account tagged with an unknown provider");
            }
            PasswordField::LegacyDirectory => {
                if let Some(descriptor) = self.registry.first_directory() {
                    return vec![descriptor];
                }
            }
            PasswordField::Secret(_) => {
                if let Some(descriptor) = self.registry.shared_table() {
                    return vec![descriptor];
                }
            }
            PasswordField::NoLocalSecret => {}
        }
        self.registry.descriptors().iter().collect()
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// A new, unsaved account. The password is hashed unless it is a tag.
    pub fn create_user_object(&self, login: &str, password: &str) -> Result<UserRecord> {
        let password = if looks_like_tag(password) {
            password.to_string()
        } else {
            self.hasher.hash(password)?
        };
        Ok(UserRecord::new(login, password))
    }

    pub async fn get_user(&self, login: &str) -> Result<Option<UserRecord>> {
        self.accounts.get_by_login(login).await
    }

    /// Accounts matching a `%` pattern; `""` and `"%"` list everything
    pub async fn list_users(&self, pattern: &str) -> Result<Vec<UserRecord>> {
        match pattern {
            "" | "%" => self.accounts.find_all().await,
            _ => self.accounts.find_by_login(pattern).await,
        }
    }

    pub async fn save_new_user(&self, user: &UserRecord) -> Result<()> {
        self.accounts.insert(user).await
    }

    pub async fn update_user(&self, user: &UserRecord) -> Result<()> {
        if user.login.is_empty() {
            return Err(Error::InvalidUser("login is not set".to_string()));
        }
        self.accounts.update(user).await
    }

    pub async fn remove_user(&self, login: &str) -> Result<()> {
        self.accounts.delete_by_login(login).await
    }

    async fn require_user(&self, login: &str) -> Result<UserRecord> {
        self.accounts
            .get_by_login(login)
            .await?
            .ok_or_else(|| Error::UserNotFound(login.to_string()))
    }

    // =========================================================================
    // Providers
    // =========================================================================

    pub fn providers(&self) -> &[ProviderDescriptor] {
        self.registry.descriptors()
    }

    pub fn provider(&self, key: &str) -> Option<&ProviderDescriptor> {
        self.registry.get(key)
    }

    pub fn shared_table_provider(&self) -> Option<&ProviderDescriptor> {
        self.registry.shared_table()
    }

    /// The provider owning `login`.
    ///
    /// `password_field` is read from the account when not given. A tag
    /// naming an unknown provider resolves to `None`.
    pub async fn provider_for_login(
        &self,
        login: &str,
        password_field: Option<&str>,
    ) -> Result<Option<&ProviderDescriptor>> {
        let field = match password_field {
            Some(field) if !field.is_empty() => field.to_string(),
            _ => self.require_user(login).await?.password,
        };

        Ok(match PasswordField::classify(&field) {
            PasswordField::ProviderTag(key) => self.registry.get(key),
            PasswordField::LegacyDirectory => self
                .registry
                .first_directory()
                .or_else(|| self.registry.shared_table()),
            _ => self.registry.shared_table(),
        })
    }

    pub async fn can_change_password(&self, login: &str) -> Result<bool> {
        let user = self.require_user(login).await?;

        Ok(match PasswordField::classify(&user.password) {
            PasswordField::ProviderTag(key) => self
                .registry
                .get(key)
                .map(|p| p.supports(Features::CHANGE_PASSWORD))
                .unwrap_or(false),
            PasswordField::LegacyDirectory => self
                .registry
                .first_directory()
                .map(|p| p.supports(Features::CHANGE_PASSWORD))
                .unwrap_or(false),
            _ => true,
        })
    }

    /// Change the password through the provider owning `login`
    pub async fn change_password(&self, login: &str, new_password: &str) -> Result<bool> {
        let user = self.require_user(login).await?;

        let provider = match PasswordField::classify(&user.password) {
            PasswordField::ProviderTag(key) => self.registry.get(key),
            PasswordField::LegacyDirectory => self.registry.first_directory(),
            _ => self.registry.shared_table(),
        };

        match provider {
            Some(p) if p.supports(Features::CHANGE_PASSWORD) => {
                let changed = p.provider().change_password(login, new_password).await?;
                info!(login = %login, provider = %p.key(), "Password changed");
                Ok(changed)
            }
            Some(p) => Err(Error::UnsupportedOperation(format!(
                "provider '{}' cannot change passwords",
                p.key()
            ))),
            None => Err(Error::UnsupportedOperation(format!(
                "no provider can change the password of '{}'",
                login
            ))),
        }
    }

    /// Make `key` the owning provider of `login`
    pub async fn update_provider_in_account(&self, login: &str, key: &str) -> Result<()> {
        let descriptor = self
            .registry
            .get(key)
            .ok_or_else(|| Error::UnknownProvider(key.to_string()))?;
        if descriptor.uses_shared_table() {
            return Err(Error::SharedTableProviderNotAssignable(key.to_string()));
        }

        self.accounts
            .update_password(login, &provider_tag(descriptor.key()))
            .await?;
        info!(login = %login, provider = %key, "Account assigned to provider");
        Ok(())
    }

    /// Rewrite the former LDAP driver sentinel into the tag of the first
    /// directory provider. Returns whether the account was rewritten.
    pub async fn migrate_legacy_directory_sentinel(&self, login: &str) -> Result<bool> {
        let user = self.require_user(login).await?;
        if user.password != LEGACY_DIRECTORY_SENTINEL {
            return Ok(false);
        }

        let directory = self.registry.first_directory().ok_or_else(|| {
            Error::UnsupportedOperation("no directory provider is configured".to_string())
        })?;

        self.accounts
            .update_password(login, &provider_tag(directory.key()))
            .await?;
        info!(login = %login, provider = %directory.key(), "Migrated legacy directory account");
        Ok(true)
    }
}
