//! Multiauth Core Library
//!
//! Core types, traits, and configuration shared by the credential
//! dispatcher, its providers, and the persistence collaborators.

pub mod config;
pub mod error;
pub mod store;
pub mod tag;
pub mod types;

pub use config::MultiAuthConfig;
pub use error::{Error, Result};
pub use store::{GroupStore, UserStore};
pub use tag::PasswordField;
pub use types::{GroupKind, LocalGroup, UserRecord};

/// Multiauth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registration key of the provider implicitly configured when no
/// provider list is given
pub const DEFAULT_PROVIDER: &str = "dbaccounts";
