//! Directory group synchronization
//!
//! Mirrors the groups reported by a directory into the local group store.
//! Private groups are never touched and groups are never created: a
//! directory group without a local counterpart is ignored.

use multiauth_core::{GroupStore, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Membership changes applied by one synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl GroupDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone)]
pub struct GroupSynchronizer {
    groups: Arc<dyn GroupStore>,
    keep_default_groups: bool,
}

impl GroupSynchronizer {
    pub fn new(groups: Arc<dyn GroupStore>, keep_default_groups: bool) -> Self {
        Self {
            groups,
            keep_default_groups,
        }
    }

    /// Make the local membership of `login` match `directory_groups`
    pub async fn synchronize(&self, login: &str, directory_groups: &[String]) -> Result<GroupDelta> {
        let mut wanted: BTreeSet<String> = directory_groups.iter().cloned().collect();

        if self.keep_default_groups {
            for group in self.groups.default_groups().await? {
                wanted.insert(group.name);
            }
        }

        let mut delta = GroupDelta::default();

        for group in self.groups.groups_of_user(login).await? {
            if group.is_private() {
                continue;
            }
            // already held groups need no change
            if !wanted.remove(&group.name) {
                delta.removed.push(group.name);
            }
        }

        for name in &delta.removed {
            self.groups.remove_user_from_group(login, name).await?;
        }

        for name in wanted {
            match self.groups.get_group(&name).await? {
                Some(group) if !group.is_private() => {
                    self.groups.add_user_to_group(login, &name).await?;
                    delta.added.push(name);
                }
                Some(_) => debug!(login = %login, group = %name, "Skipping private group"),
                None => debug!(login = %login, group = %name, "Directory group has no local group"),
            }
        }

        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiauth_core::GroupKind;
    use multiauth_metadata::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_group("A", GroupKind::Default);
        store.add_group("B", GroupKind::Normal);
        store.add_group("C", GroupKind::Normal);
        store.add_group("john", GroupKind::Private);
        store
    }

    #[tokio::test]
    async fn test_directory_groups_with_defaults() {
        let store = store();
        store.add_user_to_group("john", "B").await.unwrap();
        store.add_user_to_group("john", "C").await.unwrap();

        let sync = GroupSynchronizer::new(store.clone(), true);
        let delta = sync
            .synchronize("john", &["A".to_string(), "B".to_string()])
            .await
            .unwrap();

        assert_eq!(store.membership("john"), vec!["A", "B"]);
        assert_eq!(delta.added, vec!["A"]);
        assert_eq!(delta.removed, vec!["C"]);
    }

    #[tokio::test]
    async fn test_private_groups_are_kept() {
        let store = store();
        store.add_user_to_group("john", "john").await.unwrap();
        store.add_user_to_group("john", "C").await.unwrap();

        let sync = GroupSynchronizer::new(store.clone(), false);
        let delta = sync.synchronize("john", &[]).await.unwrap();

        assert_eq!(store.membership("john"), vec!["john"]);
        assert_eq!(delta.removed, vec!["C"]);
        assert!(delta.added.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_groups_are_not_created() {
        let store = store();
        let sync = GroupSynchronizer::new(store.clone(), false);

        let delta = sync
            .synchronize("john", &["B".to_string(), "ghosts".to_string()])
            .await
            .unwrap();

        assert_eq!(store.membership("john"), vec!["B"]);
        assert_eq!(delta.added, vec!["B"]);
        assert!(store.get_group("ghosts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_change_when_in_sync() {
        let store = store();
        store.add_user_to_group("john", "B").await.unwrap();

        let sync = GroupSynchronizer::new(store.clone(), false);
        let delta = sync.synchronize("john", &["B".to_string()]).await.unwrap();

        assert!(delta.is_empty());
    }
}
