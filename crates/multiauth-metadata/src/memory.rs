//! In-memory account and group store

use async_trait::async_trait;
use multiauth_core::store::like_pattern;
use multiauth_core::{Error, GroupKind, GroupStore, LocalGroup, Result, UserRecord, UserStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct State {
    users: BTreeMap<String, UserRecord>,
    groups: BTreeMap<String, LocalGroup>,
    memberships: BTreeMap<String, BTreeSet<String>>,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a local group
    pub fn add_group(&self, name: &str, kind: GroupKind) {
        self.state
            .write()
            .groups
            .insert(name.to_string(), LocalGroup::new(name, kind));
    }

    /// Insert a record without going through the trait
    pub fn put_user(&self, user: UserRecord) {
        self.state.write().users.insert(user.login.clone(), user);
    }

    /// Group names `login` belongs to, sorted
    pub fn membership(&self, login: &str) -> Vec<String> {
        self.state
            .read()
            .memberships
            .get(login)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_login(&self, login: &str) -> Result<Option<UserRecord>> {
        Ok(self.state.read().users.get(login).cloned())
    }

    async fn find_all(&self) -> Result<Vec<UserRecord>> {
        Ok(self.state.read().users.values().cloned().collect())
    }

    async fn find_by_login(&self, pattern: &str) -> Result<Vec<UserRecord>> {
        let pattern = like_pattern(pattern)?;
        Ok(self
            .state
            .read()
            .users
            .values()
            .filter(|u| pattern.is_match(&u.login))
            .cloned()
            .collect())
    }

    async fn insert(&self, user: &UserRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.users.contains_key(&user.login) {
            return Err(Error::DatabaseError(format!(
                "UNIQUE constraint failed: login {}",
                user.login
            )));
        }
        state.users.insert(user.login.clone(), user.clone());
        Ok(())
    }

    async fn update(&self, user: &UserRecord) -> Result<()> {
        let mut state = self.state.write();
        match state.users.get_mut(&user.login) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(Error::UserNotFound(user.login.clone())),
        }
    }

    async fn update_password(&self, login: &str, password: &str) -> Result<()> {
        let mut state = self.state.write();
        match state.users.get_mut(login) {
            Some(existing) => {
                existing.password = password.to_string();
                Ok(())
            }
            None => Err(Error::UserNotFound(login.to_string())),
        }
    }

    async fn delete_by_login(&self, login: &str) -> Result<()> {
        let mut state = self.state.write();
        state.users.remove(login);
        state.memberships.remove(login);
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn get_group(&self, name: &str) -> Result<Option<LocalGroup>> {
        Ok(self.state.read().groups.get(name).cloned())
    }

    async fn default_groups(&self) -> Result<Vec<LocalGroup>> {
        Ok(self
            .state
            .read()
            .groups
            .values()
            .filter(|g| g.kind == GroupKind::Default)
            .cloned()
            .collect())
    }

    async fn groups_of_user(&self, login: &str) -> Result<Vec<LocalGroup>> {
        let state = self.state.read();
        Ok(state
            .memberships
            .get(login)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| state.groups.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_user_to_group(&self, login: &str, group: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.groups.contains_key(group) {
            return Err(Error::DatabaseError(format!("Unknown group {}", group)));
        }
        state
            .memberships
            .entry(login.to_string())
            .or_default()
            .insert(group.to_string());
        Ok(())
    }

    async fn remove_user_from_group(&self, login: &str, group: &str) -> Result<()> {
        if let Some(groups) = self.state.write().memberships.get_mut(login) {
            groups.remove(group);
        }
        Ok(())
    }
}
