//! Shared provider state

use multiauth_core::config::{param_str, PasswordHashConfig, ProviderParams};
use multiauth_core::Result;
use multiauth_crypto::PasswordHasher;

/// Registration key, parameters and label shared by all built-in providers
#[derive(Debug, Clone)]
pub struct ProviderBase {
    key: String,
    params: ProviderParams,
    default_label: &'static str,
}

impl ProviderBase {
    pub fn new(params: ProviderParams, default_label: &'static str) -> Self {
        Self {
            key: String::new(),
            params,
            default_label,
        }
    }

    /// The `label` parameter, else the built-in label
    pub fn label(&self) -> String {
        param_str(&self.params, "label")
            .unwrap_or(self.default_label)
            .to_string()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_key(&mut self, key: &str) {
        self.key = key.to_string();
    }

    pub fn params(&self) -> &ProviderParams {
        &self.params
    }
}

/// Hasher configured from the hashing keys of `params`
pub fn hasher_from_params(params: &ProviderParams) -> Result<PasswordHasher> {
    PasswordHasher::from_config(&PasswordHashConfig::from_params(params)?)
}
