//! LDAP directory provider
//!
//! Authenticates users against an LDAP or Active Directory server and
//! synchronizes their group membership.

pub mod connection;
pub mod provider;
pub mod types;

pub use connection::{
    DirectoryConnection, DirectoryConnector, DirectoryEntry, DirectoryError, Ldap3Connector,
};
pub use provider::LdapProvider;
pub use types::{AttributeMapping, BindTemplate, GroupSearch, LdapSettings, TlsMode};
