//! Directory connections
//!
//! The LDAP provider talks to the directory through [`DirectoryConnector`],
//! which opens one [`DirectoryConnection`] per use. [`Ldap3Connector`] is
//! the network implementation.

use crate::ldap::types::{LdapSettings, TlsMode};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// LDAP result code for invalid credentials
pub const RC_INVALID_CREDENTIALS: u32 = 49;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Failed to connect to LDAP server: {0}")]
    Connect(String),

    #[error("Bind failed with code {code}: {message}")]
    Bind { code: u32, message: String },

    #[error("Search failed: {0}")]
    Search(String),
}

impl DirectoryError {
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, DirectoryError::Bind { code, .. } if *code == RC_INVALID_CREDENTIALS)
    }
}

/// One entry returned by a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// First value of an attribute
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }
}

#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Open a connection, applying STARTTLS when configured
    async fn connect(&self, settings: &LdapSettings) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind; an empty DN and password is an anonymous bind
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Subtree search under `base`
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    async fn close(&mut self);
}

/// Connector backed by `ldap3`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, settings: &LdapSettings) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(settings.timeout)
            .set_starttls(settings.tls_mode == TlsMode::StartTls)
            .set_no_tls_verify(settings.skip_tls_verify);

        debug!("Connecting to LDAP server: {}", settings.uri);

        let (conn, ldap) = LdapConnAsync::with_settings(conn_settings, &settings.uri)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;

        ldap3::drive!(conn);

        Ok(Box::new(Ldap3Connection {
            ldap,
            timeout: settings.timeout,
        }))
    }
}

pub struct Ldap3Connection {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;

        if result.rc != 0 {
            return Err(DirectoryError::Bind {
                code: result.rc,
                message: result.text,
            });
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let (rs, _res) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attrs.to_vec())
            .await
            .map_err(|e| DirectoryError::Search(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Search(e.to_string()))?;

        Ok(rs
            .into_iter()
            .map(|result| {
                let entry = SearchEntry::construct(result);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs.into_iter().collect(),
                }
            })
            .collect())
    }

    async fn close(&mut self) {
        let _ = self.ldap.unbind().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_first_value() {
        let entry = DirectoryEntry::new("uid=john,ou=people,dc=example,dc=com")
            .with_attr("mail", "john@example.com")
            .with_attr("mail", "jdoe@example.com");

        assert_eq!(entry.first("mail"), Some("john@example.com"));
        assert_eq!(entry.first("cn"), None);
    }

    #[test]
    fn test_invalid_credentials() {
        let err = DirectoryError::Bind {
            code: 49,
            message: "Invalid credentials".into(),
        };
        assert!(err.is_invalid_credentials());
        assert!(!DirectoryError::Search("timeout".into()).is_invalid_credentials());
    }
}
