//! Password field codec
//!
//! The local `password` field either carries a real hash, or records which
//! provider owns the credential:
//!
//! - `!!multiauth:<providerKey>!!` tags an external provider
//! - `!!ldapdao password!!` was written by the former LDAP driver
//! - `--no password--`, `no password` and the empty string mean no local
//!   secret is stored

pub const TAG_PREFIX: &str = "!!multiauth:";
pub const TAG_SUFFIX: &str = "!!";

/// Sentinel stored by the predecessor LDAP driver
pub const LEGACY_DIRECTORY_SENTINEL: &str = "!!ldapdao password!!";

/// Sentinel stored by CAS-style drivers
pub const LEGACY_NO_PASSWORD_SENTINEL: &str = "--no password--";

pub const NO_PASSWORD: &str = "no password";

/// Classification of a stored password field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordField<'a> {
    /// Owned by the provider registered under this key
    ProviderTag(&'a str),
    /// Migrated from the former LDAP driver and not yet rewritten
    LegacyDirectory,
    /// No local secret; the owner must be discovered
    NoLocalSecret,
    /// A hash stored in the account table
    Secret(&'a str),
}

impl<'a> PasswordField<'a> {
    pub fn classify(field: &'a str) -> Self {
        if let Some(key) = parse_provider_tag(field) {
            return PasswordField::ProviderTag(key);
        }
        if field == LEGACY_DIRECTORY_SENTINEL {
            return PasswordField::LegacyDirectory;
        }
        if field.is_empty() || field == NO_PASSWORD || has_sentinel_marker(field) {
            return PasswordField::NoLocalSecret;
        }
        PasswordField::Secret(field)
    }
}

/// Build the tag recording `key` as the owning provider
pub fn provider_tag(key: &str) -> String {
    format!("{}{}{}", TAG_PREFIX, key, TAG_SUFFIX)
}

/// Extract the provider key from a tag
pub fn parse_provider_tag(field: &str) -> Option<&str> {
    field.strip_prefix(TAG_PREFIX)?.strip_suffix(TAG_SUFFIX)
}

/// True when the value carries the tag marker anywhere
pub fn looks_like_tag(value: &str) -> bool {
    value.contains(TAG_PREFIX)
}

/// Sentinels of former drivers start with two of `-` or `!`
fn has_sentinel_marker(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('-' | '!'), Some('-' | '!'))
    )
}
