//! Provider Registry
//!
//! The registry provides:
//! - Provider construction from configuration through named factories
//! - Lookup by registration key
//! - The shared-table and directory providers, resolved once at startup

use crate::ldap::LdapProvider;
use crate::provider::{Features, Provider, ProviderContext, ProviderKind};
use crate::providers::{DbAccountsProvider, DbDaoProvider};
use multiauth_core::config::{ProviderEntry, ProviderParams};
use multiauth_core::{Error, MultiAuthConfig, Result, DEFAULT_PROVIDER};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds a provider from its parameters
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderParams, &ProviderContext) -> Result<Box<dyn Provider>> + Send + Sync>;

/// Provider implementations, by kind name
#[derive(Clone, Default)]
pub struct ProviderFactories {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dbaccounts`, `dbdao` and `ldap`
    pub fn builtin() -> Self {
        let mut factories = Self::new();
        factories.register("dbaccounts", |params, context| {
            Ok(Box::new(DbAccountsProvider::new(params, context)?) as Box<dyn Provider>)
        });
        factories.register("dbdao", |params, context| {
            Ok(Box::new(DbDaoProvider::new(params, context)?) as Box<dyn Provider>)
        });
        factories.register("ldap", |params, context| {
            Ok(Box::new(LdapProvider::new(params, context)?) as Box<dyn Provider>)
        });
        factories
    }

    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ProviderParams, &ProviderContext) -> Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn create(
        &self,
        kind: &str,
        params: &ProviderParams,
        context: &ProviderContext,
    ) -> Result<Box<dyn Provider>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::UnknownProviderKind(kind.to_string()))?;
        factory(params, context)
    }
}

/// A registered provider with the capabilities read at registration
#[derive(Clone)]
pub struct ProviderDescriptor {
    key: String,
    kind: ProviderKind,
    features: Features,
    provider: Arc<dyn Provider>,
}

impl ProviderDescriptor {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn supports(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    /// Credentials are checked against the dispatcher's own account table
    pub fn uses_shared_table(&self) -> bool {
        self.features.contains(Features::USES_SHARED_TABLE) || self.kind == ProviderKind::DbAccounts
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("features", &self.features)
            .finish()
    }
}

/// Immutable set of configured providers, in registration order
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderDescriptor>,
    shared_table: Option<usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the providers listed in `config`.
    ///
    /// Without a provider list a single `dbaccounts` provider is registered.
    pub fn from_config(
        config: &MultiAuthConfig,
        context: &ProviderContext,
        factories: &ProviderFactories,
    ) -> Result<Self> {
        let mut entries = config.provider_entries();
        if entries.is_empty() {
            debug!("No provider configured, using {}", DEFAULT_PROVIDER);
            entries.push(ProviderEntry::parse(DEFAULT_PROVIDER));
        }

        let mut registry = Self::new();
        for entry in entries {
            if !factories.contains(&entry.kind) {
                return Err(Error::UnknownProviderKind(entry.kind));
            }
            let params = config.provider_params(&entry)?;
            let provider = factories.create(&entry.kind, &params, context)?;
            registry.register(&entry.key, provider)?;
        }

        info!(
            "Registered providers: {}",
            registry
                .providers
                .iter()
                .map(|p| p.key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(registry)
    }

    /// Register `provider` under `key`
    pub fn register(&mut self, key: &str, mut provider: Box<dyn Provider>) -> Result<()> {
        if self.get(key).is_some() {
            return Err(Error::Configuration(format!(
                "Provider '{}' is configured twice",
                key
            )));
        }

        provider.set_register_key(key);
        let descriptor = ProviderDescriptor {
            key: key.to_string(),
            kind: provider.kind(),
            features: provider.features(),
            provider: Arc::from(provider),
        };

        if descriptor.uses_shared_table() {
            if let Some(index) = self.shared_table {
                return Err(Error::DuplicateSharedTableProvider {
                    first: self.providers[index].key.clone(),
                    second: key.to_string(),
                });
            }
            self.shared_table = Some(self.providers.len());
        }

        debug!(
            provider = %key,
            kind = %descriptor.kind,
            features = %descriptor.features,
            "Registered provider"
        );
        self.providers.push(descriptor);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter()
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// The provider owning the dispatcher's account table
    pub fn shared_table(&self) -> Option<&ProviderDescriptor> {
        self.shared_table.map(|i| &self.providers[i])
    }

    /// First registered directory provider
    pub fn first_directory(&self) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.is_directory())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
