//! Provider contract
//!
//! Every identity backend implements [`Provider`]. The dispatcher only talks
//! to backends through this trait and the capabilities they advertise.

use crate::ldap::DirectoryConnector;
use async_trait::async_trait;
use multiauth_core::config::{param_bool, ProviderParams};
use multiauth_core::{GroupStore, Result, UserRecord, UserStore};
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Capability set of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Features(u8);

impl Features {
    pub const NONE: Features = Features(0);
    /// Passwords can be changed through the provider
    pub const CHANGE_PASSWORD: Features = Features(1);
    /// The provider verifies passwords
    pub const SUPPORT_PASSWORD: Features = Features(2);
    /// Credentials live in the dispatcher's own account table
    pub const USES_SHARED_TABLE: Features = Features(4);

    pub fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Features::CHANGE_PASSWORD) {
            names.push("change_password");
        }
        if self.contains(Features::SUPPORT_PASSWORD) {
            names.push("support_password");
        }
        if self.contains(Features::USES_SHARED_TABLE) {
            names.push("uses_shared_table");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Result of a provider verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Bad,
    Ok,
    /// Credentials are valid and the record was modified and must be saved
    OkUserNeedsUpdate,
}

impl AuthOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, AuthOutcome::Bad)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthOutcome::Bad => "bad",
            AuthOutcome::Ok => "ok",
            AuthOutcome::OkUserNeedsUpdate => "ok_user_needs_update",
        }
    }
}

/// Implementation type of a provider, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    DbAccounts,
    DbDao,
    Ldap,
    /// Registered through a custom factory
    Custom,
}

impl ProviderKind {
    pub fn is_directory(self) -> bool {
        matches!(self, ProviderKind::Ldap)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::DbAccounts => "dbaccounts",
            ProviderKind::DbDao => "dbdao",
            ProviderKind::Ldap => "ldap",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Human readable name
    fn label(&self) -> String;

    fn register_key(&self) -> &str;

    fn set_register_key(&mut self, key: &str);

    /// Parameters the provider was built with
    fn configuration(&self) -> &ProviderParams;

    fn features(&self) -> Features;

    fn kind(&self) -> ProviderKind;

    /// Change the password of `login`.
    ///
    /// Providers without [`Features::CHANGE_PASSWORD`] return
    /// `Error::UnsupportedOperation`.
    async fn change_password(&self, login: &str, new_password: &str) -> Result<bool>;

    /// Check `password` for `login`.
    ///
    /// `user` is the in-flight record; the provider may update its fields.
    /// Failures of remote backends are reported as [`AuthOutcome::Bad`],
    /// `Err` is kept for local store failures.
    async fn verify_authentication(
        &self,
        user: &mut UserRecord,
        login: &str,
        password: &str,
    ) -> Result<AuthOutcome>;

    async fn user_exists(&self, login: &str) -> Result<bool>;

    /// Per-provider override of the dispatcher's account creation setting
    fn automatic_account_creation(&self) -> Option<bool> {
        param_bool(self.configuration(), "automatic_account_creation")
    }
}

/// Collaborators handed to provider factories
#[derive(Clone)]
pub struct ProviderContext {
    /// The dispatcher's account table
    pub accounts: Arc<dyn UserStore>,
    pub groups: Arc<dyn GroupStore>,
    /// External account tables, by name
    pub external_stores: HashMap<String, Arc<dyn UserStore>>,
    pub directory: Arc<dyn DirectoryConnector>,
}

impl ProviderContext {
    pub fn new(
        accounts: Arc<dyn UserStore>,
        groups: Arc<dyn GroupStore>,
        directory: Arc<dyn DirectoryConnector>,
    ) -> Self {
        Self {
            accounts,
            groups,
            external_stores: HashMap::new(),
            directory,
        }
    }

    pub fn with_external_store(mut self, name: impl Into<String>, store: Arc<dyn UserStore>) -> Self {
        self.external_stores.insert(name.into(), store);
        self
    }
}
