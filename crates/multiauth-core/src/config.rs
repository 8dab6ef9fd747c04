//! Configuration for Multiauth
//!
//! Example:
//! ```toml
//! [multiauth]
//! providers = ["dbaccounts", "ldap:multiauth_ldap"]
//! automatic_account_creation = true
//! password_hash_method = "argon2id"
//!
//! [multiauth_ldap]
//! hostname = "ldap.example.com"
//! search_user_base_dn = "ou=people,dc=example,dc=com"
//! search_user_filter = ["(&(objectClass=inetOrgPerson)(uid=%%LOGIN%%))"]
//! bind_user_dn = ["uid=%?%,ou=people,dc=example,dc=com"]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Parameters handed to a provider factory
pub type ProviderParams = toml::Table;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiAuthConfig {
    #[serde(default)]
    pub multiauth: DriverConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named provider sections
    #[serde(flatten)]
    pub sections: BTreeMap<String, toml::Table>,
}

impl MultiAuthConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Build a configuration from INI-like `section.key = value` pairs.
    ///
    /// Keys without a section belong to `[multiauth]`. A `[]` suffix appends
    /// to a list. `true`/`false` and integers are typed, everything else is
    /// kept as a string.
    pub fn from_flat_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut root = toml::Table::new();

        for (key, value) in pairs {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            let (path, append) = match key.strip_suffix("[]") {
                Some(k) => (k, true),
                None => (key, false),
            };
            let mut segments: Vec<&str> = path.split('.').map(str::trim).collect();
            if segments.len() == 1 {
                segments.insert(0, "multiauth");
            }
            insert_flat(&mut root, &segments, parse_flat_value(value.as_ref()), append)?;
        }

        Ok(toml::Value::Table(root).try_into()?)
    }

    /// Override settings from `MULTIAUTH_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MULTIAUTH_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = std::env::var("MULTIAUTH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("MULTIAUTH_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(value) = std::env::var("MULTIAUTH_AUTOMATIC_ACCOUNT_CREATION") {
            if let Some(flag) = parse_bool(&value) {
                self.multiauth.automatic_account_creation = flag;
            }
        }
    }

    /// Configured provider entries, in registration order
    pub fn provider_entries(&self) -> Vec<ProviderEntry> {
        self.multiauth
            .providers
            .iter()
            .map(|p| ProviderEntry::parse(p))
            .collect()
    }

    /// Parameters for one provider: the shared hashing settings merged with
    /// the provider's section, section keys winning.
    pub fn provider_params(&self, entry: &ProviderEntry) -> Result<ProviderParams> {
        let mut params = self.multiauth.hashing.to_table()?;

        if let Some(section) = &entry.section {
            let values = self.sections.get(section).ok_or_else(|| Error::MissingConfigSection {
                provider: entry.kind.clone(),
                section: section.clone(),
            })?;
            for (k, v) in values {
                params.insert(k.clone(), v.clone());
            }
        }

        Ok(params)
    }
}

/// One element of the `providers` list: `kind[:section]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEntry {
    /// Registration key, the full configured string
    pub key: String,
    /// Implementation name
    pub kind: String,
    /// Configuration section merged into the provider parameters
    pub section: Option<String>,
}

impl ProviderEntry {
    pub fn parse(value: &str) -> Self {
        let key = value.trim().to_string();
        match key.split_once(':') {
            Some((kind, section)) => {
                let section = section.split(':').next().unwrap_or_default().to_string();
                Self {
                    kind: kind.to_string(),
                    section: Some(section),
                    key,
                }
            }
            None => Self {
                kind: key.clone(),
                section: None,
                key,
            },
        }
    }
}

/// Settings of the credential dispatcher itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Provider list, `kind[:section]`
    #[serde(default, deserialize_with = "string_or_seq")]
    pub providers: Vec<String>,

    /// Create a local account on the first successful external login
    #[serde(default)]
    pub automatic_account_creation: bool,

    #[serde(flatten)]
    pub hashing: PasswordHashConfig,
}

/// Password hashing settings shared by the dispatcher and table providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHashConfig {
    /// Adaptive algorithm: argon2id, argon2i, argon2d, or empty for none
    #[serde(default = "default_hash_method")]
    pub password_hash_method: String,

    #[serde(default)]
    pub password_hash_options: HashOptions,

    /// Legacy digest: `name`, `1:name` (salted) or `2:name` (config-aware)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_crypt_function: Option<String>,

    /// Static salt for salted legacy digests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_salt: Option<String>,
}

fn default_hash_method() -> String {
    "argon2id".to_string()
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            password_hash_method: default_hash_method(),
            password_hash_options: HashOptions::default(),
            password_crypt_function: None,
            password_salt: None,
        }
    }
}

impl PasswordHashConfig {
    pub fn to_table(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self) {
            Ok(toml::Value::Table(table)) => Ok(table),
            Ok(_) => Err(Error::Configuration("hashing settings are not a table".into())),
            Err(e) => Err(Error::Configuration(e.to_string())),
        }
    }

    /// Read hashing settings back from provider parameters
    pub fn from_params(params: &ProviderParams) -> Result<Self> {
        Ok(toml::Value::Table(params.clone()).try_into()?)
    }
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashOptions {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    19456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Account database: `sqlite://...` or `memory`
    pub url: String,
    pub max_connections: u32,
    /// External account tables used by `dbdao` providers, name -> url
    #[serde(default)]
    pub stores: BTreeMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://multiauth.db?mode=rwc".to_string(),
            max_connections: 5,
            stores: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Accept either a single string or a list of strings
pub fn string_or_seq<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Read a boolean parameter, accepting ini-style spellings
pub fn param_bool(params: &ProviderParams, key: &str) -> Option<bool> {
    match params.get(key)? {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::Integer(i) => Some(*i != 0),
        toml::Value::String(s) => parse_bool(s),
        _ => None,
    }
}

/// Read a string parameter; empty strings count as absent
pub fn param_str<'a>(params: &'a ProviderParams, key: &str) -> Option<&'a str> {
    match params.get(key)? {
        toml::Value::String(s) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

fn parse_flat_value(value: &str) -> toml::Value {
    let trimmed = value.trim();
    match trimmed {
        "true" => toml::Value::Boolean(true),
        "false" => toml::Value::Boolean(false),
        _ => match trimmed.parse::<i64>() {
            Ok(i) => toml::Value::Integer(i),
            Err(_) => toml::Value::String(trimmed.to_string()),
        },
    }
}

fn insert_flat(
    table: &mut toml::Table,
    segments: &[&str],
    value: toml::Value,
    append: bool,
) -> Result<()> {
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = match entry {
            toml::Value::Table(t) => t,
            _ => {
                return Err(Error::Configuration(format!(
                    "'{}' is both a value and a section",
                    segment
                )))
            }
        };
    }

    if append {
        let entry = current
            .entry(last.to_string())
            .or_insert_with(|| toml::Value::Array(Vec::new()));
        match entry {
            toml::Value::Array(items) => items.push(value),
            _ => {
                return Err(Error::Configuration(format!(
                    "'{}' is both a value and a list",
                    last
                )))
            }
        }
    } else {
        current.insert(last.to_string(), value);
    }

    Ok(())
}
