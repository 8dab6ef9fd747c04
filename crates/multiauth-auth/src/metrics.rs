//! Authentication metrics
//!
//! Counters are emitted through the `metrics` facade; installing an exporter
//! is left to the embedding application.

use metrics::counter;

/// Metric names
pub mod names {
    pub const AUTH_ATTEMPTS_TOTAL: &str = "multiauth_auth_attempts_total";
    pub const DIRECTORY_ERRORS_TOTAL: &str = "multiauth_directory_errors_total";
    pub const ACCOUNTS_CREATED_TOTAL: &str = "multiauth_accounts_created_total";
    pub const PASSWORD_REHASH_TOTAL: &str = "multiauth_password_rehash_total";
    pub const GROUP_CHANGES_TOTAL: &str = "multiauth_group_changes_total";
}

/// Record one provider verification
pub fn record_auth_attempt(provider: &str, outcome: &'static str) {
    counter!(
        names::AUTH_ATTEMPTS_TOTAL,
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a directory failure at `stage` (connect, admin_bind, user_search...)
pub fn record_directory_error(provider: &str, stage: &'static str) {
    counter!(
        names::DIRECTORY_ERRORS_TOTAL,
        "provider" => provider.to_string(),
        "stage" => stage
    )
    .increment(1);
}

pub fn record_account_created(provider: &str) {
    counter!(names::ACCOUNTS_CREATED_TOTAL, "provider" => provider.to_string()).increment(1);
}

pub fn record_password_rehash(provider: &str) {
    counter!(names::PASSWORD_REHASH_TOTAL, "provider" => provider.to_string()).increment(1);
}

/// Record group membership changes; `change` is `added` or `removed`
pub fn record_group_changes(provider: &str, change: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        names::GROUP_CHANGES_TOTAL,
        "provider" => provider.to_string(),
        "change" => change
    )
    .increment(count as u64);
}
