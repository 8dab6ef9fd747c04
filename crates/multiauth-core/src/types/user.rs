//! User types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Profile fields that directory attributes are never allowed to overwrite
pub const RESERVED_FIELDS: &[&str] = &["login", "password"];

/// A local account record
///
/// `password` holds either a real hash, a provider tag
/// (`!!multiauth:<key>!!`) or a legacy sentinel. See [`crate::tag`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            fields: BTreeMap::new(),
            created_at: Some(Utc::now()),
        }
    }

    /// Get a profile field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Set a profile field. Reserved fields are left untouched and
    /// `false` is returned.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return false;
        }
        self.fields.insert(name, value.into());
        true
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }
}
