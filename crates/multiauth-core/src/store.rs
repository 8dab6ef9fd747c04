//! Persistence collaborator traits
//!
//! The dispatcher and providers only depend on these interfaces.
//! Implementations live in `multiauth-metadata`.

use crate::types::{LocalGroup, UserRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;

/// Account table operations
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_login(&self, login: &str) -> Result<Option<UserRecord>>;

    /// All records, ordered by login
    async fn find_all(&self) -> Result<Vec<UserRecord>>;

    /// Records whose login matches a `%` wildcard pattern
    async fn find_by_login(&self, pattern: &str) -> Result<Vec<UserRecord>>;

    async fn insert(&self, user: &UserRecord) -> Result<()>;
    async fn update(&self, user: &UserRecord) -> Result<()>;
    async fn update_password(&self, login: &str, password: &str) -> Result<()>;
    async fn delete_by_login(&self, login: &str) -> Result<()>;
}

/// Local group membership operations
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_group(&self, name: &str) -> Result<Option<LocalGroup>>;
    async fn default_groups(&self) -> Result<Vec<LocalGroup>>;
    async fn groups_of_user(&self, login: &str) -> Result<Vec<LocalGroup>>;
    async fn add_user_to_group(&self, login: &str, group: &str) -> Result<()>;
    async fn remove_user_from_group(&self, login: &str, group: &str) -> Result<()>;
}

/// Compile a SQL `LIKE` style pattern (`%` any run, `_` one char) into an
/// anchored regex
pub fn like_pattern(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 4);
    source.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| Error::Configuration(format!("Invalid login pattern '{}': {}", pattern, e)))
}
