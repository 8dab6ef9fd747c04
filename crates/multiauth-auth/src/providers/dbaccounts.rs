//! Provider checking passwords stored in the dispatcher's account table

use crate::metrics;
use crate::provider::{AuthOutcome, Features, Provider, ProviderContext, ProviderKind};
use crate::providers::common::{hasher_from_params, ProviderBase};
use async_trait::async_trait;
use multiauth_core::config::ProviderParams;
use multiauth_core::{PasswordField, Result, UserRecord, UserStore};
use multiauth_crypto::{HashCheck, PasswordHasher};
use std::sync::Arc;
use tracing::debug;

pub struct DbAccountsProvider {
    base: ProviderBase,
    hasher: PasswordHasher,
    accounts: Arc<dyn UserStore>,
}

impl DbAccountsProvider {
    pub fn new(params: &ProviderParams, context: &ProviderContext) -> Result<Self> {
        let mut params = params.clone();
        // accounts of this provider are never created on the fly
        params.remove("automatic_account_creation");

        Ok(Self {
            hasher: hasher_from_params(&params)?,
            base: ProviderBase::new(params, "Local accounts"),
            accounts: context.accounts.clone(),
        })
    }
}

#[async_trait]
impl Provider for DbAccountsProvider {
    fn label(&self) -> String {
        self.base.label()
    }

    fn register_key(&self) -> &str {
        self.base.key()
    }

    fn set_register_key(&mut self, key: &str) {
        self.base.set_key(key);
    }

    fn configuration(&self) -> &ProviderParams {
        self.base.params()
    }

    fn features(&self) -> Features {
        Features::CHANGE_PASSWORD | Features::SUPPORT_PASSWORD | Features::USES_SHARED_TABLE
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::DbAccounts
    }

    async fn change_password(&self, login: &str, new_password: &str) -> Result<bool> {
        let hash = self.hasher.hash(new_password)?;
        self.accounts.update_password(login, &hash).await?;
        Ok(true)
    }

    async fn verify_authentication(
        &self,
        user: &mut UserRecord,
        login: &str,
        password: &str,
    ) -> Result<AuthOutcome> {
        if password.trim().is_empty() {
            return Ok(AuthOutcome::Bad);
        }

        // tags and sentinels are not secrets
        if !matches!(PasswordField::classify(&user.password), PasswordField::Secret(_)) {
            debug!(login = %login, "No local password stored");
            return Ok(AuthOutcome::Bad);
        }

        match self.hasher.verify(password, &user.password)? {
            HashCheck::Bad => Ok(AuthOutcome::Bad),
            HashCheck::Ok => Ok(AuthOutcome::Ok),
            HashCheck::OkWithNewHash(hash) => {
                debug!(login = %login, "Upgrading password hash");
                metrics::record_password_rehash(self.register_key());
                user.password = hash;
                Ok(AuthOutcome::OkUserNeedsUpdate)
            }
        }
    }

    async fn user_exists(&self, login: &str) -> Result<bool> {
        Ok(self.accounts.get_by_login(login).await?.is_some())
    }
}
