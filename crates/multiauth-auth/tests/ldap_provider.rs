mod common;

use common::{ldap_params, people_directory, FakeDirectory, ADMIN_DN, JOHN_DN, JOHN_PASSWORD};
use multiauth_auth::ldap::TlsMode;
use multiauth_auth::{AuthOutcome, LdapProvider, Provider, ProviderContext};
use multiauth_core::config::ProviderParams;
use multiauth_core::{Error, GroupKind, GroupStore, UserRecord};
use multiauth_metadata::MemoryStore;
use std::sync::Arc;

const BIND_BY_LOGIN: &str = r#"bind_user_dn = "uid=%%LOGIN%%,ou=people,dc=example,dc=com""#;

const GROUPS: &str = r#"
bind_user_dn = "uid=%%LOGIN%%,ou=people,dc=example,dc=com"
search_group_filter = "(&(objectClass=posixGroup)(memberUid=%%LOGIN%%))"
search_group_base_dn = "ou=groups,dc=example,dc=com"
search_group_property = "cn"
"#;

fn provider(directory: &FakeDirectory, store: &Arc<MemoryStore>, extra: &str) -> LdapProvider {
    provider_with(directory, store, ldap_params(extra))
}

fn provider_with(directory: &FakeDirectory, store: &Arc<MemoryStore>, params: ProviderParams) -> LdapProvider {
    let context = ProviderContext::new(store.clone(), store.clone(), Arc::new(directory.clone()));
    let mut provider = LdapProvider::new(&params, &context).unwrap();
    provider.set_register_key("ldap");
    provider
}

async fn verify(provider: &LdapProvider, login: &str, password: &str) -> (AuthOutcome, UserRecord) {
    let mut user = UserRecord::new(login, "");
    let outcome = provider
        .verify_authentication(&mut user, login, password)
        .await
        .unwrap();
    (outcome, user)
}

#[tokio::test]
async fn test_valid_credentials() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, user) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(user.field("lastname"), Some("Doe"));
    assert_eq!(user.field("firstname"), Some("John"));
    assert_eq!(user.field("email"), Some("john@example.com"));
    assert_eq!(directory.binds(), vec![ADMIN_DN.to_string(), JOHN_DN.to_string()]);
}

#[tokio::test]
async fn test_invalid_password() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "john", "wrong").await;
    assert_eq!(outcome, AuthOutcome::Bad);
}

#[tokio::test]
async fn test_blank_password_never_contacts_directory() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "john", "").await;
    assert_eq!(outcome, AuthOutcome::Bad);
    let (outcome, _) = verify(&ldap, "john", "   ").await;
    assert_eq!(outcome, AuthOutcome::Bad);
    assert_eq!(directory.connections(), 0);
}

#[tokio::test]
async fn test_bind_templates_tried_in_order() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(
        &directory,
        &store,
        r#"bind_user_dn = [
    "uid=%%LOGIN%%,ou=nowhere,dc=example,dc=com",
    "$dn",
    "cn=%?%,ou=people,dc=example,dc=com",
]"#,
    );

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(
        directory.binds(),
        vec![
            ADMIN_DN.to_string(),
            "uid=john,ou=nowhere,dc=example,dc=com".to_string(),
            JOHN_DN.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_bind_template_with_attribute_substitution() {
    let directory = people_directory();
    let cn_dn = "cn=Doe,ou=people,dc=example,dc=com";
    directory.set_password(cn_dn, "other");
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(
        &directory,
        &store,
        r#"bind_user_dn = "cn=%?%,ou=people,dc=example,dc=com""#,
    );

    let (outcome, _) = verify(&ldap, "john", "other").await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(directory.binds().last().map(String::as_str), Some(cn_dn));
}

#[tokio::test]
async fn test_admin_bind_failure() {
    let directory = people_directory();
    directory.set_password(ADMIN_DN, "rotated");
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Bad);
    assert!(directory.searches().is_empty());
    assert_eq!(directory.binds(), vec![ADMIN_DN.to_string()]);

    let err = ldap.user_exists("john").await.unwrap_err();
    assert!(matches!(err, Error::DirectoryUnavailable(_)));
}

#[tokio::test]
async fn test_anonymous_search_bind() {
    let directory = people_directory();
    directory.allow_anonymous();
    let store = Arc::new(MemoryStore::new());
    let mut params = ldap_params(BIND_BY_LOGIN);
    params.remove("admin_user_dn");
    params.remove("admin_password");
    let ldap = provider_with(&directory, &store, params);

    assert!(ldap.settings().admin_dn.is_none());
    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(directory.binds(), vec![String::new(), JOHN_DN.to_string()]);
}

#[tokio::test]
async fn test_unreachable_directory() {
    let directory = people_directory();
    directory.set_unreachable();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Bad);
    assert!(ldap.user_exists("john").await.is_err());
}

#[tokio::test]
async fn test_user_filters_tried_in_order() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let mut params = ldap_params(r#"bind_user_dn = "$dn""#);
    params.insert(
        "search_user_filter".to_string(),
        toml::Value::Array(vec![
            toml::Value::String("(uid=%%LOGIN%%)".to_string()),
            toml::Value::String("(mail=%%LOGIN%%)".to_string()),
        ]),
    );
    let ldap = provider_with(&directory, &store, params);

    let (outcome, _) = verify(&ldap, "john@example.com", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(
        directory.searches(),
        vec![
            "(uid=john@example.com)".to_string(),
            "(mail=john@example.com)".to_string(),
        ]
    );
    assert_eq!(directory.binds().last().map(String::as_str), Some(JOHN_DN));
}

#[tokio::test]
async fn test_unknown_user() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "mallory", "pw").await;
    assert_eq!(outcome, AuthOutcome::Bad);
    // only the admin bind happened
    assert_eq!(directory.binds(), vec![ADMIN_DN.to_string()]);

    assert!(ldap.user_exists("john").await.unwrap());
    assert!(!ldap.user_exists("mallory").await.unwrap());
}

#[tokio::test]
async fn test_user_exists() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    assert!(ldap.user_exists("john").await.unwrap());
    assert!(ldap.user_exists("jane").await.unwrap());
    assert!(!ldap.user_exists("nobody").await.unwrap());
    // lookups never bind as the user
    assert!(directory.binds().iter().all(|dn| dn == ADMIN_DN));
}

#[tokio::test]
async fn test_user_search_failure_is_not_an_unknown_user() {
    let directory = people_directory();
    directory.fail_searches_under("ou=people,dc=example,dc=com");
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let err = ldap.user_exists("john").await.unwrap_err();
    assert!(matches!(err, Error::DirectoryUnavailable(_)));

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Bad);
    assert_eq!(directory.binds().last().map(String::as_str), Some(ADMIN_DN));
}

#[tokio::test]
async fn test_filter_values_are_escaped() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "*", "pw").await;
    assert_eq!(outcome, AuthOutcome::Bad);
    assert!(directory.searches().iter().all(|f| !f.contains("uid=*)")));
}

#[tokio::test]
async fn test_attribute_mapping_keeps_reserved_fields() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let mut params = ldap_params(BIND_BY_LOGIN);
    params.insert(
        "search_attributes".to_string(),
        toml::Value::String("mail:login,cn:password,givenName:firstname,title:position".to_string()),
    );
    let ldap = provider_with(&directory, &store, params);

    let mut user = UserRecord::new("john", "!!multiauth:ldap!!");
    let outcome = ldap
        .verify_authentication(&mut user, "john", JOHN_PASSWORD)
        .await
        .unwrap();

    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(user.login, "john");
    assert_eq!(user.password, "!!multiauth:ldap!!");
    assert_eq!(user.field("firstname"), Some("John"));
    // mapped but absent from the entry
    assert_eq!(user.field("position"), Some(""));
}

#[tokio::test]
async fn test_group_synchronization() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    store.add_group("devs", GroupKind::Normal);
    store.add_group("admins", GroupKind::Normal);
    store.add_group("staff", GroupKind::Default);
    store.add_group("former", GroupKind::Normal);
    store.add_group("john", GroupKind::Private);
    store.add_user_to_group("john", "former").await.unwrap();
    store.add_user_to_group("john", "john").await.unwrap();

    let ldap = provider(&directory, &store, GROUPS);
    assert!(ldap.settings().group_search.is_some());

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(
        store.membership("john"),
        vec!["devs".to_string(), "john".to_string(), "staff".to_string()]
    );
}

#[tokio::test]
async fn test_group_search_failure_keeps_membership() {
    let directory = people_directory();
    directory.fail_searches_under("ou=groups,dc=example,dc=com");
    let store = Arc::new(MemoryStore::new());
    store.add_group("former", GroupKind::Normal);
    store.add_user_to_group("john", "former").await.unwrap();

    let ldap = provider(&directory, &store, GROUPS);

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(store.membership("john"), vec!["former".to_string()]);
}

#[tokio::test]
async fn test_groups_untouched_without_group_filter() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    store.add_group("former", GroupKind::Normal);
    store.add_user_to_group("john", "former").await.unwrap();

    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let (outcome, _) = verify(&ldap, "john", JOHN_PASSWORD).await;
    assert_eq!(outcome, AuthOutcome::Ok);
    assert_eq!(store.membership("john"), vec!["former".to_string()]);
    assert!(store.groups_of_user("john").await.unwrap().len() == 1);
}

#[tokio::test]
async fn test_unsupported_password_change() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(&directory, &store, BIND_BY_LOGIN);

    let err = ldap.change_password("john", "new").await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
}

#[test]
fn test_settings_from_params() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let ldap = provider(
        &directory,
        &store,
        &format!("{}\nport = 636\ntimeout_seconds = 3", BIND_BY_LOGIN),
    );

    let settings = ldap.settings();
    assert_eq!(settings.uri, "ldaps://ldap.example.com:636");
    assert_eq!(settings.tls_mode, TlsMode::Ldaps);
    assert_eq!(settings.timeout.as_secs(), 3);
    assert_eq!(settings.user_filters.len(), 1);
    assert_eq!(ldap.label(), "LDAP directory");
}

#[test]
fn test_missing_bind_dn_is_rejected() {
    let directory = people_directory();
    let store = Arc::new(MemoryStore::new());
    let context = ProviderContext::new(store.clone(), store, Arc::new(directory));

    let err = LdapProvider::new(&ldap_params(""), &context).err().unwrap();
    assert!(err.is_configuration());
}
