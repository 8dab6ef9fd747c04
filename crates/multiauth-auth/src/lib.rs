//! Multiauth authentication
//!
//! Credential dispatch over pluggable identity providers:
//! - `dbaccounts`: passwords stored in the dispatcher's account table
//! - `dbdao`: passwords stored in an external account table
//! - `ldap`: LDAP directory with group synchronization

pub mod dispatcher;
pub mod groups;
pub mod ldap;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod registry;

pub use dispatcher::CredentialDispatcher;
pub use groups::{GroupDelta, GroupSynchronizer};
pub use ldap::{DirectoryConnector, Ldap3Connector, LdapProvider};
pub use provider::{AuthOutcome, Features, Provider, ProviderContext, ProviderKind};
pub use providers::{DbAccountsProvider, DbDaoProvider};
pub use registry::{ProviderDescriptor, ProviderFactories, ProviderFactory, ProviderRegistry};
