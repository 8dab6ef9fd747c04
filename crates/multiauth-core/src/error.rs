//! Error types for Multiauth

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Section '{section}' to configure the provider '{provider}' is missing")]
    MissingConfigSection { provider: String, section: String },

    #[error("No provider implementation registered for '{0}'")]
    UnknownProviderKind(String),

    #[error("Providers '{first}' and '{second}' both use the account table; only one is allowed")]
    DuplicateSharedTableProvider { first: String, second: String },

    // Provider Errors
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider '{0}' relies on the account table and cannot be assigned to an account")]
    SharedTableProviderNotAssignable(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    // Account Errors
    #[error("The specified user does not exist: {0}")]
    UserNotFound(String),

    #[error("Invalid user record: {0}")]
    InvalidUser(String),

    // Backend Errors
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "ConfigurationError",
            Error::MissingConfigSection { .. } => "MissingConfigSection",
            Error::UnknownProviderKind(_) => "UnknownProviderKind",
            Error::DuplicateSharedTableProvider { .. } => "DuplicateSharedTableProvider",
            Error::UnknownProvider(_) => "UnknownProvider",
            Error::SharedTableProviderNotAssignable(_) => "SharedTableProviderNotAssignable",
            Error::UnsupportedOperation(_) => "UnsupportedOperation",
            Error::UserNotFound(_) => "UserNotFound",
            Error::InvalidUser(_) => "InvalidUser",
            Error::DirectoryUnavailable(_) => "DirectoryUnavailable",
            Error::Hashing(_) => "HashingError",
            Error::DatabaseError(_) => "DatabaseError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    /// Errors that must abort initialization
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::MissingConfigSection { .. }
                | Error::UnknownProviderKind(_)
                | Error::DuplicateSharedTableProvider { .. }
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let err = Error::DuplicateSharedTableProvider {
            first: "dbaccounts".into(),
            second: "other".into(),
        };
        assert!(err.is_configuration());
        assert_eq!(err.code(), "DuplicateSharedTableProvider");

        assert!(!Error::UnsupportedOperation("change password".into()).is_configuration());
        assert!(!Error::DirectoryUnavailable("timeout".into()).is_configuration());
    }

    #[test]
    fn test_missing_section_message() {
        let err = Error::MissingConfigSection {
            provider: "ldap".into(),
            section: "multiauth_ldap".into(),
        };
        assert_eq!(
            err.to_string(),
            "Section 'multiauth_ldap' to configure the provider 'ldap' is missing"
        );
    }
}
