//! Provider checking passwords stored in an external account table

use crate::metrics;
use crate::provider::{AuthOutcome, Features, Provider, ProviderContext, ProviderKind};
use crate::providers::common::{hasher_from_params, ProviderBase};
use async_trait::async_trait;
use multiauth_core::config::{param_str, ProviderParams};
use multiauth_core::{Error, Result, UserRecord, UserStore};
use multiauth_crypto::{HashCheck, PasswordHasher};
use std::sync::Arc;
use tracing::debug;

pub struct DbDaoProvider {
    base: ProviderBase,
    hasher: PasswordHasher,
    store: Arc<dyn UserStore>,
}

impl DbDaoProvider {
    /// The `dao` parameter names a store of `context.external_stores`
    pub fn new(params: &ProviderParams, context: &ProviderContext) -> Result<Self> {
        let dao = param_str(params, "dao").ok_or_else(|| {
            Error::Configuration("dbdao provider requires a 'dao' parameter".to_string())
        })?;
        let store = context.external_stores.get(dao).cloned().ok_or_else(|| {
            Error::Configuration(format!("Unknown account store '{}' for dbdao provider", dao))
        })?;

        Ok(Self {
            hasher: hasher_from_params(params)?,
            base: ProviderBase::new(params.clone(), "External accounts"),
            store,
        })
    }
}

#[async_trait]
impl Provider for DbDaoProvider {
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
        Features::CHANGE_PASSWORD | Features::SUPPORT_PASSWORD
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::DbDao
    }

    async fn change_password(&self, login: &str, new_password: &str) -> Result<bool> {
        let hash = self.hasher.hash(new_password)?;
        self.store.update_password(login, &hash).await?;
        Ok(true)
    }

    async fn verify_authentication(
        &self,
        _user: &mut UserRecord,
        login: &str,
        password: &str,
    ) -> Result<AuthOutcome> {
        if password.trim().is_empty() {
            return Ok(AuthOutcome::Bad);
        }

        let record = match self.store.get_by_login(login).await? {
            Some(record) => record,
            None => return Ok(AuthOutcome::Bad),
        };

        match self.hasher.verify(password, &record.password)? {
            HashCheck::Bad => Ok(AuthOutcome::Bad),
            HashCheck::Ok => Ok(AuthOutcome::Ok),
            HashCheck::OkWithNewHash(hash) => {
                debug!(login = %login, "Upgrading password hash in external table");
                self.store.update_password(login, &hash).await?;
                metrics::record_password_rehash(self.register_key());
                Ok(AuthOutcome::Ok)
            }
        }
    }

    async fn user_exists(&self, login: &str) -> Result<bool> {
        Ok(self.store.get_by_login(login).await?.is_some())
    }
}
