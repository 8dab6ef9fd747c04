//! LDAP directory provider
//!
//! A verification runs through these stages, any failure ending in
//! [`AuthOutcome::Bad`]:
//!
//! 1. bind as the administrative identity (or anonymously)
//! 2. search the user with each filter until one matches
//! 3. bind as the user with each DN template until one succeeds
//! 4. when a group filter is configured, search the user's groups and
//!    synchronize the local membership

use crate::groups::GroupSynchronizer;
use crate::ldap::connection::{DirectoryConnection, DirectoryConnector, DirectoryEntry};
use crate::ldap::types::{group_filter, user_filter, GroupSearch, LdapSettings};
use crate::metrics;
use crate::provider::{AuthOutcome, Features, Provider, ProviderContext, ProviderKind};
use crate::providers::ProviderBase;
use async_trait::async_trait;
use multiauth_core::config::ProviderParams;
use multiauth_core::{Error, Result, UserRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Stage of a verification, used as the `stage` metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connect,
    AdminBind,
    UserSearch,
    UserBind,
    GroupSearch,
    GroupSync,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Connect => "connect",
            Stage::AdminBind => "admin_bind",
            Stage::UserSearch => "user_search",
            Stage::UserBind => "user_bind",
            Stage::GroupSearch => "group_search",
            Stage::GroupSync => "group_sync",
        }
    }
}

/// A failed user bind
#[derive(Debug, Clone, PartialEq, Eq)]
struct BindAttempt {
    dn: String,
    diagnostic: String,
}

/// Result of trying the bind DN templates
#[derive(Debug, Clone, Default)]
struct UserBind {
    /// DN that accepted the password
    dn: Option<String>,
    attempts: Vec<BindAttempt>,
}

pub struct LdapProvider {
    base: ProviderBase,
    settings: LdapSettings,
    connector: Arc<dyn DirectoryConnector>,
    groups: Option<GroupSynchronizer>,
}

impl LdapProvider {
    pub fn new(params: &ProviderParams, context: &ProviderContext) -> Result<Self> {
        let settings = LdapSettings::from_params(params)?;
        let groups = settings
            .group_search
            .as_ref()
            .map(|g| GroupSynchronizer::new(context.groups.clone(), g.keep_default_groups));

        Ok(Self {
            base: ProviderBase::new(params.clone(), "LDAP directory"),
            settings,
            connector: context.directory.clone(),
            groups,
        })
    }

    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }

    fn directory_error(&self, stage: Stage, err: impl std::fmt::Display) {
        warn!(
            provider = %self.register_key(),
            stage = stage.as_str(),
            "LDAP error: {}",
            err
        );
        metrics::record_directory_error(self.register_key(), stage.as_str());
    }

    async fn connect(&self) -> Option<Box<dyn DirectoryConnection>> {
        match self.connector.connect(&self.settings).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                self.directory_error(Stage::Connect, e);
                None
            }
        }
    }

    /// Open a connection bound to the administrative identity
    async fn bind_admin(&self) -> Option<Box<dyn DirectoryConnection>> {
        let mut conn = self.connect().await?;

        let (dn, password) = match &self.settings.admin_dn {
            Some(dn) => (dn.as_str(), self.settings.admin_password.as_str()),
            None => ("", ""),
        };

        match conn.bind(dn, password).await {
            Ok(()) => Some(conn),
            Err(e) => {
                if dn.is_empty() {
                    self.directory_error(Stage::AdminBind, format!("anonymous admin bind: {}", e));
                } else {
                    self.directory_error(Stage::AdminBind, format!("admin bind as {}: {}", dn, e));
                }
                conn.close().await;
                None
            }
        }
    }

    /// First entry matched by the user filters, in configured order.
    ///
    /// Fails with [`Error::DirectoryUnavailable`] when no filter produced
    /// an answer, so an unreachable directory is not mistaken for an
    /// unknown user.
    async fn find_user(
        &self,
        conn: &mut dyn DirectoryConnection,
        login: &str,
        attrs: &[String],
    ) -> Result<Option<DirectoryEntry>> {
        let mut last_error = None;
        let mut answered = false;

        for template in &self.settings.user_filters {
            let filter = user_filter(template, login);
            debug!("Searching for user with filter: {}", filter);

            match conn.search(&self.settings.user_base_dn, &filter, attrs).await {
                Ok(entries) => {
                    answered = true;
                    if let Some(entry) = entries.into_iter().next() {
                        return Ok(Some(entry));
                    }
                }
                Err(e) => {
                    self.directory_error(Stage::UserSearch, &e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(Error::DirectoryUnavailable(format!(
                "user search under {} failed: {}",
                self.settings.user_base_dn, e
            ))),
            _ => Ok(None),
        }
    }

    /// Copy the fetched attributes onto `user` and return their first values.
    ///
    /// The entry DN is available as the `dn` attribute. Mapped fields missing
    /// from the entry are set to an empty string when the record lacks them.
    fn read_attributes(&self, entry: &DirectoryEntry, user: &mut UserRecord) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();

        for (name, list) in &entry.attrs {
            let value = match list.first() {
                Some(v) => v.clone(),
                None => continue,
            };
            if let Some(field) = self.settings.attributes.field_for(name) {
                if !field.is_empty() {
                    user.set_field(field, value.as_str());
                }
            }
            values.insert(name.clone(), value);
        }

        for (name, field) in self.settings.attributes.entries() {
            if !field.is_empty() && !values.contains_key(name) && !user.has_field(field) {
                user.set_field(field, "");
            }
        }

        values.entry("dn".to_string()).or_insert_with(|| entry.dn.clone());
        values
    }

    /// Try each bind DN template in order, stopping at the first success
    async fn bind_user(
        &self,
        conn: &mut dyn DirectoryConnection,
        attributes: &BTreeMap<String, String>,
        login: &str,
        password: &str,
    ) -> UserBind {
        let mut result = UserBind::default();

        for template in &self.settings.bind_templates {
            let dn = match template.resolve(attributes, login) {
                Some(dn) => dn,
                None => {
                    debug!("Skipping bind template {:?}: attribute not fetched", template);
                    continue;
                }
            };

            match conn.bind(&dn, password).await {
                Ok(()) => {
                    result.dn = Some(dn);
                    return result;
                }
                Err(e) => {
                    warn!(
                        provider = %self.register_key(),
                        "Error when trying to bind with {}: {}",
                        dn,
                        e
                    );
                    if !e.is_invalid_credentials() {
                        metrics::record_directory_error(self.register_key(), Stage::UserBind.as_str());
                    }
                    result.attempts.push(BindAttempt {
                        dn,
                        diagnostic: e.to_string(),
                    });
                }
            }
        }

        result
    }

    /// Names of the groups the user belongs to. `None` when the search failed.
    async fn search_groups(
        &self,
        conn: &mut dyn DirectoryConnection,
        group: &GroupSearch,
        attributes: &BTreeMap<String, String>,
        user_dn: &str,
        login: &str,
    ) -> Option<Vec<String>> {
        let filter = group_filter(&group.filter, attributes, user_dn, login);
        debug!("Searching groups with filter: {}", filter);

        match conn
            .search(&group.base_dn, &filter, std::slice::from_ref(&group.property))
            .await
        {
            Ok(entries) => {
                let names: Vec<String> = entries
                    .iter()
                    .filter_map(|e| e.first(&group.property).map(str::to_string))
                    .collect();
                debug!("Found {} groups for user", names.len());
                Some(names)
            }
            Err(e) => {
                self.directory_error(Stage::GroupSearch, e);
                None
            }
        }
    }

    async fn sync_groups(
        &self,
        admin: &mut dyn DirectoryConnection,
        attributes: &BTreeMap<String, String>,
        user_dn: &str,
        login: &str,
    ) {
        let (group, sync) = match (&self.settings.group_search, &self.groups) {
            (Some(group), Some(sync)) => (group, sync),
            _ => return,
        };

        let names = match self.search_groups(admin, group, attributes, user_dn, login).await {
            Some(names) => names,
            None => return,
        };

        match sync.synchronize(login, &names).await {
            Ok(delta) => {
                if !delta.is_empty() {
                    info!(
                        login = %login,
                        added = ?delta.added,
                        removed = ?delta.removed,
                        "Synchronized directory groups"
                    );
                }
                metrics::record_group_changes(self.register_key(), "added", delta.added.len());
                metrics::record_group_changes(self.register_key(), "removed", delta.removed.len());
            }
            Err(e) => {
                error!(login = %login, "Group synchronization failed: {}", e);
                metrics::record_directory_error(self.register_key(), Stage::GroupSync.as_str());
            }
        }
    }
}

#[async_trait]
impl Provider for LdapProvider {
    fn label(&self) -> String {
        self.base.label()
    }

    fn register_key(&self) -> &str {
        self.base.key()
    }

    fn set_register_key(&mut self, key: &str) {
        self.base.set_key(key);
    }

    fn configuration(&self) -> &ProviderParams {
        self.base.params()
    }

    fn features(&self) -> Features {
        Features::SUPPORT_PASSWORD
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ldap
    }

    async fn change_password(&self, _login: &str, _new_password: &str) -> Result<bool> {
        Err(Error::UnsupportedOperation(
            "changing a password in the LDAP directory".to_string(),
        ))
    }

    async fn verify_authentication(
        &self,
        user: &mut UserRecord,
        login: &str,
        password: &str,
    ) -> Result<AuthOutcome> {
        // no unauthenticated or anonymous user binds (RFC 4513 5.1)
        if password.trim().is_empty() || login.trim().is_empty() {
            return Ok(AuthOutcome::Bad);
        }

        let mut admin = match self.bind_admin().await {
            Some(conn) => conn,
            None => return Ok(AuthOutcome::Bad),
        };

        let attrs = self.settings.attributes.attribute_names();
        let entry = match self.find_user(&mut *admin, login, &attrs).await {
            Ok(Some(entry)) => entry,
            Err(_) => {
                admin.close().await;
                return Ok(AuthOutcome::Bad);
            }
            Ok(None) => {
                info!(provider = %self.register_key(), login = %login, "User not found in the directory");
                admin.close().await;
                return Ok(AuthOutcome::Bad);
            }
        };
        let attributes = self.read_attributes(&entry, user);

        let mut conn = match self.connect().await {
            Some(conn) => conn,
            None => {
                admin.close().await;
                return Ok(AuthOutcome::Bad);
            }
        };
        let bind = self.bind_user(&mut *conn, &attributes, &user.login, password).await;
        conn.close().await;

        let user_dn = match bind.dn {
            Some(dn) => dn,
            None => {
                warn!(
                    provider = %self.register_key(),
                    login = %login,
                    "Cannot authenticate with the configured bind_user_dn: wrong DN or password"
                );
                for attempt in &bind.attempts {
                    warn!(
                        provider = %self.register_key(),
                        "Tried bind_user_dn={}: {}",
                        attempt.dn,
                        attempt.diagnostic
                    );
                }
                admin.close().await;
                return Ok(AuthOutcome::Bad);
            }
        };

        self.sync_groups(&mut *admin, &attributes, &user_dn, &user.login)
            .await;
        admin.close().await;

        Ok(AuthOutcome::Ok)
    }

    async fn user_exists(&self, login: &str) -> Result<bool> {
        let mut admin = self.bind_admin().await.ok_or_else(|| {
            Error::DirectoryUnavailable(format!("cannot bind to {}", self.settings.uri))
        })?;

        let found = self.find_user(&mut *admin, login, &["dn".to_string()]).await;
        admin.close().await;
        Ok(found?.is_some())
    }
}
