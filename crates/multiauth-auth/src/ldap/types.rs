//! LDAP provider configuration and templates
//!
//! Supports:
//! - LDAP, LDAPS and STARTTLS connections
//! - Ordered user search filters and bind DN templates
//! - Attribute to profile field mapping
//! - Group membership search

use multiauth_core::config::{string_or_seq, ProviderParams};
use multiauth_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// Raw parameters
// ============================================================================

/// LDAP section as written in the configuration
#[derive(Debug, Clone, Deserialize)]
struct LdapParams {
    #[serde(default)]
    hostname: String,

    #[serde(default = "default_port")]
    port: u16,

    /// "", "none", "ldaps" or "starttls"
    #[serde(default)]
    tls_mode: String,

    /// Skip TLS certificate verification (not recommended for production)
    #[serde(default)]
    skip_tls_verify: bool,

    #[serde(default = "default_protocol_version")]
    protocol_version: u8,

    #[serde(default)]
    admin_user_dn: String,

    #[serde(default)]
    admin_password: String,

    #[serde(default)]
    search_user_base_dn: String,

    /// Use %%LOGIN%% as placeholder
    /// Example: "(&(objectClass=inetOrgPerson)(uid=%%LOGIN%%))"
    #[serde(default, deserialize_with = "string_or_seq")]
    search_user_filter: Vec<String>,

    /// Example: "uid=%%LOGIN%%,ou=people,dc=example,dc=com", "$dn"
    /// or "uid=%?%,ou=people,dc=example,dc=com"
    #[serde(default, deserialize_with = "string_or_seq")]
    bind_user_dn: Vec<String>,

    /// "ldapAttr[:field],..."
    #[serde(default)]
    search_attributes: String,

    /// Use %%USERDN%%, %%LOGIN%% or %%<attribute>%% as placeholders
    /// Example: "(&(objectClass=posixGroup)(memberUid=%%LOGIN%%))"
    #[serde(default)]
    search_group_filter: String,

    #[serde(default)]
    search_group_base_dn: String,

    /// Attribute holding the group name
    #[serde(default)]
    search_group_property: String,

    #[serde(default = "default_true")]
    search_group_keep_user_in_default_groups: bool,

    /// Timeout for each network operation
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
}

fn default_port() -> u16 {
    389
}

fn default_protocol_version() -> u8 {
    3
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

const DEFAULT_ATTRIBUTES: &str = "cn:lastname,name:firstname";

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    #[default]
    None,
    Ldaps,
    StartTls,
}

impl TlsMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(TlsMode::None),
            "ldaps" => Ok(TlsMode::Ldaps),
            "starttls" => Ok(TlsMode::StartTls),
            other => Err(Error::Configuration(format!(
                "Invalid LDAP tls_mode '{}', expected none, ldaps or starttls",
                other
            ))),
        }
    }
}

/// Group search parameters; present only when a group filter is configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSearch {
    pub filter: String,
    pub base_dn: String,
    pub property: String,
    pub keep_default_groups: bool,
}

/// Validated LDAP provider settings
#[derive(Debug, Clone)]
pub struct LdapSettings {
    /// Connection URI (`ldap://host:port` or `ldaps://host:port`)
    pub uri: String,
    pub tls_mode: TlsMode,
    pub skip_tls_verify: bool,
    pub timeout: Duration,
    /// Administrative identity; anonymous bind when absent
    pub admin_dn: Option<String>,
    pub admin_password: String,
    pub user_base_dn: String,
    pub user_filters: Vec<String>,
    pub bind_templates: Vec<BindTemplate>,
    pub attributes: AttributeMapping,
    pub group_search: Option<GroupSearch>,
}

impl LdapSettings {
    pub fn from_params(params: &ProviderParams) -> Result<Self> {
        let raw: LdapParams = toml::Value::Table(params.clone())
            .try_into()
            .map_err(|e| Error::Configuration(format!("Invalid LDAP configuration: {}", e)))?;

        if raw.protocol_version != 3 {
            return Err(Error::Configuration(format!(
                "Unsupported LDAP protocol_version {}, only 3 is supported",
                raw.protocol_version
            )));
        }

        if raw.search_user_base_dn.trim().is_empty() {
            return Err(Error::Configuration(
                "LDAP search_user_base_dn is missing".to_string(),
            ));
        }

        let user_filters = non_empty(raw.search_user_filter);
        if user_filters.is_empty() {
            return Err(Error::Configuration(
                "LDAP search_user_filter is missing".to_string(),
            ));
        }

        let bind_templates: Vec<BindTemplate> = non_empty(raw.bind_user_dn)
            .iter()
            .map(|t| BindTemplate::parse(t))
            .collect();
        if bind_templates.is_empty() {
            return Err(Error::Configuration("LDAP bind_user_dn is missing".to_string()));
        }

        let attributes = if raw.search_attributes.trim().is_empty() {
            AttributeMapping::parse(DEFAULT_ATTRIBUTES)
        } else {
            AttributeMapping::parse(&raw.search_attributes)
        };

        let group_search = if raw.search_group_filter.trim().is_empty() {
            None
        } else {
            if raw.search_group_property.trim().is_empty() {
                return Err(Error::Configuration(
                    "LDAP search_group_property is required with search_group_filter".to_string(),
                ));
            }
            Some(GroupSearch {
                filter: raw.search_group_filter,
                base_dn: raw.search_group_base_dn,
                property: raw.search_group_property.trim().to_string(),
                keep_default_groups: raw.search_group_keep_user_in_default_groups,
            })
        };

        let hostname = match raw.hostname.trim() {
            "" => "localhost",
            h => h,
        };
        let (uri, tls_mode) = connection_uri(hostname, raw.port, TlsMode::parse(&raw.tls_mode)?);

        let admin_dn = match raw.admin_user_dn.trim() {
            "" => None,
            dn => Some(dn.to_string()),
        };

        Ok(Self {
            uri,
            tls_mode,
            skip_tls_verify: raw.skip_tls_verify,
            timeout: Duration::from_secs(raw.timeout_seconds),
            admin_dn,
            admin_password: raw.admin_password,
            user_base_dn: raw.search_user_base_dn,
            user_filters,
            bind_templates,
            attributes,
            group_search,
        })
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter(|v| !v.trim().is_empty()).collect()
}

/// Derive the connection URI and the effective TLS mode
fn connection_uri(hostname: &str, port: u16, tls_mode: TlsMode) -> (String, TlsMode) {
    let address = format!("{}:{}", hostname, port);

    if address.starts_with("ldaps://") {
        return (address, TlsMode::Ldaps);
    }
    if address.starts_with("ldap://") {
        let mode = match tls_mode {
            TlsMode::Ldaps => TlsMode::StartTls,
            other => other,
        };
        return (address, mode);
    }
    if tls_mode == TlsMode::Ldaps || port == 636 {
        return (format!("ldaps://{}", address), TlsMode::Ldaps);
    }
    (format!("ldap://{}", address), tls_mode)
}

// ============================================================================
// Attribute mapping
// ============================================================================

/// Ordered directory attribute -> profile field mapping.
/// An empty field name fetches the attribute without mapping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    entries: Vec<(String, String)>,
}

impl AttributeMapping {
    pub fn parse(mapping: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        for item in mapping.split(',') {
            let (attr, field) = match item.split_once(':') {
                Some((attr, field)) => (attr.trim(), field.trim()),
                None => (item.trim(), item.trim()),
            };
            if attr.is_empty() {
                continue;
            }
            match entries.iter_mut().find(|(a, _)| a == attr) {
                Some(existing) => existing.1 = field.to_string(),
                None => entries.push((attr.to_string(), field.to_string())),
            }
        }
        Self { entries }
    }

    /// Attribute names to request from the directory
    pub fn attribute_names(&self) -> Vec<String> {
        self.entries.iter().map(|(a, _)| a.clone()).collect()
    }

    pub fn field_for(&self, attribute: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a == attribute)
            .map(|(_, f)| f.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, f)| (a.as_str(), f.as_str()))
    }
}

// ============================================================================
// Templates
// ============================================================================

static ATTRIBUTE_DN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$(\w+)$").expect("valid regex"));
static ATTRIBUTE_SUBSTITUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)=%\?%").expect("valid regex"));

const LOGIN_PLACEHOLDERS: [&str; 2] = ["%%LOGIN%%", "%%USERNAME%%"];

/// A user bind DN template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTemplate {
    /// `$attr`: the DN is the value of a fetched attribute
    Attribute(String),
    /// `uid=%?%,ou=people,...`: each `attr=%?%` takes the fetched value
    AttributeSubstitution {
        template: String,
        attributes: Vec<String>,
    },
    /// `uid=%%LOGIN%%,ou=people,...`
    Login(String),
}

impl BindTemplate {
    pub fn parse(template: &str) -> Self {
        let trimmed = template.trim();
        if let Some(caps) = ATTRIBUTE_DN.captures(trimmed) {
            return BindTemplate::Attribute(caps[1].to_string());
        }
        let attributes: Vec<String> = ATTRIBUTE_SUBSTITUTION
            .captures_iter(trimmed)
            .map(|c| c[1].to_string())
            .collect();
        if !attributes.is_empty() {
            return BindTemplate::AttributeSubstitution {
                template: trimmed.to_string(),
                attributes,
            };
        }
        BindTemplate::Login(trimmed.to_string())
    }

    /// Resolve into a DN. `None` when a required attribute was not fetched.
    pub fn resolve(&self, attributes: &BTreeMap<String, String>, login: &str) -> Option<String> {
        match self {
            BindTemplate::Attribute(name) => attributes.get(name).cloned(),
            BindTemplate::AttributeSubstitution {
                template,
                attributes: names,
            } => {
                let mut dn = template.clone();
                for name in names {
                    let value = attributes.get(name)?;
                    dn = dn.replacen(
                        &format!("{}=%?%", name),
                        &format!("{}={}", name, ldap3::dn_escape(value.as_str())),
                        1,
                    );
                }
                Some(dn)
            }
            BindTemplate::Login(template) => {
                Some(replace_login(template, &ldap3::dn_escape(login)))
            }
        }
    }
}

fn replace_login(template: &str, value: &str) -> String {
    LOGIN_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |acc, p| acc.replace(p, value))
}

/// Substitute the login into a user search filter
pub fn user_filter(template: &str, login: &str) -> String {
    replace_login(template, &ldap3::ldap_escape(login))
}

/// Substitute fetched attributes, the bound DN and the login into a group
/// search filter
pub fn group_filter(
    template: &str,
    attributes: &BTreeMap<String, String>,
    user_dn: &str,
    login: &str,
) -> String {
    let mut filter = template.to_string();
    for (name, value) in attributes {
        filter = filter.replace(&format!("%%{}%%", name), &ldap3::ldap_escape(value.as_str()));
    }
    filter = filter.replace("%%USERDN%%", &ldap3::ldap_escape(user_dn));
    replace_login(&filter, &ldap3::ldap_escape(login))
}
