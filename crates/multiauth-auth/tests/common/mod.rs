//! Test fixtures: a scripted directory and a static provider

#![allow(dead_code)]

use async_trait::async_trait;
use multiauth_auth::ldap::{DirectoryConnection, DirectoryConnector, DirectoryEntry, DirectoryError, LdapSettings};
use multiauth_auth::{AuthOutcome, Features, Provider, ProviderKind};
use multiauth_core::config::ProviderParams;
use multiauth_core::{Error, Result, UserRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_PASSWORD: &str = "adminpw";
pub const JOHN_DN: &str = "uid=john,ou=people,dc=example,dc=com";
pub const JOHN_PASSWORD: &str = "secret";

#[derive(Default)]
struct DirectoryState {
    entries: Vec<DirectoryEntry>,
    passwords: HashMap<String, String>,
    allow_anonymous: bool,
    unreachable: bool,
    failing_base: Option<String>,
    binds: Vec<String>,
    searches: Vec<String>,
    connections: usize,
}

/// In-memory directory with a small filter evaluator
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, entry: DirectoryEntry) {
        self.state.lock().entries.push(entry);
    }

    pub fn set_password(&self, dn: &str, password: &str) {
        self.state
            .lock()
            .passwords
            .insert(dn.to_string(), password.to_string());
    }

    pub fn allow_anonymous(&self) {
        self.state.lock().allow_anonymous = true;
    }

    pub fn set_unreachable(&self) {
        self.state.lock().unreachable = true;
    }

    /// Searches under `base` fail
    pub fn fail_searches_under(&self, base: &str) {
        self.state.lock().failing_base = Some(base.to_string());
    }

    /// DNs of every bind, in order; anonymous binds are recorded as ""
    pub fn binds(&self) -> Vec<String> {
        self.state.lock().binds.clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.state.lock().searches.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }
}

/// Admin account, john, jane and the devs and staff groups
pub fn people_directory() -> FakeDirectory {
    let directory = FakeDirectory::new();
    directory.set_password(ADMIN_DN, ADMIN_PASSWORD);

    directory.add_entry(
        DirectoryEntry::new(JOHN_DN)
            .with_attr("objectClass", "inetOrgPerson")
            .with_attr("uid", "john")
            .with_attr("cn", "Doe")
            .with_attr("givenName", "John")
            .with_attr("mail", "john@example.com"),
    );
    directory.set_password(JOHN_DN, JOHN_PASSWORD);

    directory.add_entry(
        DirectoryEntry::new("uid=jane,ou=people,dc=example,dc=com")
            .with_attr("objectClass", "inetOrgPerson")
            .with_attr("uid", "jane")
            .with_attr("cn", "Roe")
            .with_attr("mail", "jane@example.com"),
    );
    directory.set_password("uid=jane,ou=people,dc=example,dc=com", "janepw");

    directory.add_entry(
        DirectoryEntry::new("cn=devs,ou=groups,dc=example,dc=com")
            .with_attr("objectClass", "posixGroup")
            .with_attr("cn", "devs")
            .with_attr("memberUid", "john")
            .with_attr("memberUid", "jane"),
    );
    directory.add_entry(
        DirectoryEntry::new("cn=admins,ou=groups,dc=example,dc=com")
            .with_attr("objectClass", "posixGroup")
            .with_attr("cn", "admins")
            .with_attr("memberUid", "jane"),
    );
    directory
}

#[async_trait]
impl DirectoryConnector for FakeDirectory {
    async fn connect(&self, _settings: &LdapSettings) -> std::result::Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(DirectoryError::Connect("connection refused".to_string()));
        }
        state.connections += 1;
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<DirectoryState>>,
}

#[async_trait]
impl DirectoryConnection for FakeConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> std::result::Result<(), DirectoryError> {
        let mut state = self.state.lock();
        state.binds.push(dn.to_string());

        let accepted = if dn.is_empty() && password.is_empty() {
            state.allow_anonymous
        } else {
            state.passwords.get(dn).map(|p| p == password).unwrap_or(false)
        };

        if accepted {
            Ok(())
        } else {
            Err(DirectoryError::Bind {
                code: 49,
                message: "Invalid credentials".to_string(),
            })
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> std::result::Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut state = self.state.lock();
        state.searches.push(filter.to_string());

        if let Some(failing) = &state.failing_base {
            if base.eq_ignore_ascii_case(failing) {
                return Err(DirectoryError::Search("server busy".to_string()));
            }
        }

        let base = base.to_ascii_lowercase();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.dn.to_ascii_lowercase().ends_with(&base))
            .filter(|e| matches_filter(filter, e))
            .map(|e| project(e, attrs))
            .collect())
    }

    async fn close(&mut self) {}
}

fn project(entry: &DirectoryEntry, attrs: &[String]) -> DirectoryEntry {
    let mut projected = DirectoryEntry::new(entry.dn.clone());
    for (name, values) in &entry.attrs {
        if attrs.is_empty() || attrs.iter().any(|a| a.eq_ignore_ascii_case(name)) {
            projected.attrs.insert(name.clone(), values.clone());
        }
    }
    projected
}

fn matches_filter(filter: &str, entry: &DirectoryEntry) -> bool {
    let filter = filter.trim();
    let inner = filter
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .unwrap_or(filter);

    match inner.chars().next() {
        Some('&') => components(&inner[1..]).iter().all(|c| matches_filter(c, entry)),
        Some('|') => components(&inner[1..]).iter().any(|c| matches_filter(c, entry)),
        Some('!') => !matches_filter(&inner[1..], entry),
        _ => {
            let (attr, value) = match inner.split_once('=') {
                Some(pair) => pair,
                None => return false,
            };
            let values = entry
                .attrs
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(attr))
                .map(|(_, v)| v.as_slice())
                .unwrap_or(&[]);
            if value == "*" {
                return !values.is_empty();
            }
            let value = unescape(value);
            values.iter().any(|v| v.eq_ignore_ascii_case(&value))
        }
    }
}

/// Split `(a)(b)(c)` into its parenthesized components
fn components(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in list.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    parts.push(&list[start..=i]);
                }
            }
            _ => {}
        }
    }
    parts
}

/// Decode `\xx` escapes
fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&value[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Provider with a fixed answer, counting its calls
pub struct StaticProvider {
    key: String,
    kind: ProviderKind,
    features: Features,
    accepts: bool,
    rename_to: Option<String>,
    params: ProviderParams,
    calls: Arc<AtomicUsize>,
}

impl StaticProvider {
    pub fn new(kind: ProviderKind, features: Features, accepts: bool) -> Self {
        Self {
            key: String::new(),
            kind,
            features,
            accepts,
            rename_to: None,
            params: ProviderParams::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Accepts everything, no shared table
    pub fn external() -> Self {
        Self::new(
            ProviderKind::Custom,
            Features::SUPPORT_PASSWORD | Features::CHANGE_PASSWORD,
            true,
        )
    }

    /// Accepts everything and claims the shared table
    pub fn shared_table() -> Self {
        Self::new(
            ProviderKind::Custom,
            Features::SUPPORT_PASSWORD | Features::USES_SHARED_TABLE,
            true,
        )
    }

    /// Set the login of verified records to `login`
    pub fn renaming_to(mut self, login: &str) -> Self {
        self.rename_to = Some(login.to_string());
        self
    }

    pub fn with_param(mut self, key: &str, value: toml::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn label(&self) -> String {
        format!("static {}", self.key)
    }

    fn register_key(&self) -> &str {
        &self.key
    }

    fn set_register_key(&mut self, key: &str) {
        self.key = key.to_string();
    }

    fn configuration(&self) -> &ProviderParams {
        &self.params
    }

    fn features(&self) -> Features {
        self.features
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn change_password(&self, _login: &str, _new_password: &str) -> Result<bool> {
        if self.features.contains(Features::CHANGE_PASSWORD) {
            Ok(true)
        } else {
            Err(Error::UnsupportedOperation("static".to_string()))
        }
    }

    async fn verify_authentication(
        &self,
        user: &mut UserRecord,
        _login: &str,
        _password: &str,
    ) -> Result<AuthOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.accepts {
            return Ok(AuthOutcome::Bad);
        }
        if let Some(login) = &self.rename_to {
            user.login = login.clone();
        }
        Ok(AuthOutcome::Ok)
    }

    async fn user_exists(&self, _login: &str) -> Result<bool> {
        Ok(self.accepts)
    }
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// LDAP section for `people_directory`
pub fn ldap_params(extra: &str) -> ProviderParams {
    toml::from_str(&format!(
        r#"
hostname = "ldap.example.com"
admin_user_dn = "{ADMIN_DN}"
admin_password = "{ADMIN_PASSWORD}"
search_user_base_dn = "ou=people,dc=example,dc=com"
search_user_filter = "(&(objectClass=inetOrgPerson)(uid=%%LOGIN%%))"
search_attributes = "uid:,cn:lastname,givenName:firstname,mail:email"
{extra}
"#
    ))
    .unwrap()
}
