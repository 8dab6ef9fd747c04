//! Legacy digest transforms
//!
//! Accounts created before adaptive hashing stored a plain digest of the
//! password, optionally salted with a static application salt.

use digest::Digest;
use md5::Md5;
use multiauth_core::{Error, Result};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

pub fn md5_hash(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn sha1_hash(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn sha512_hash(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyDigest {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl LegacyDigest {
    fn digest(self, data: &[u8]) -> String {
        match self {
            LegacyDigest::Md5 => md5_hash(data),
            LegacyDigest::Sha1 => sha1_hash(data),
            LegacyDigest::Sha256 => sha256_hash(data),
            LegacyDigest::Sha512 => sha512_hash(data),
        }
    }
}

/// A configured legacy transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyCrypt {
    /// `digest(password)`
    Plain(LegacyDigest),
    /// `digest(salt + ":" + password)`
    Salted { digest: LegacyDigest, salt: String },
}

impl LegacyCrypt {
    /// Parse a `password_crypt_function` value.
    ///
    /// `name` hashes the password alone. `1:name` passes the static salt
    /// too. `2:name` passes the provider configuration, of which the salt is
    /// the only part a digest can use.
    pub fn parse(function: &str, salt: Option<&str>) -> Result<Self> {
        let function = function.trim();
        let (salted, name) = match function.split_once(':') {
            Some(("1", name)) | Some(("2", name)) => (true, name),
            Some((other, _)) => {
                return Err(Error::Configuration(format!(
                    "Unknown password_crypt_function mode '{}'",
                    other
                )))
            }
            None => (false, function),
        };

        let (digest, named_salted) = match name {
            "md5" => (LegacyDigest::Md5, false),
            "sha1" => (LegacyDigest::Sha1, false),
            "sha256" => (LegacyDigest::Sha256, false),
            "sha512" => (LegacyDigest::Sha512, false),
            "md5WithSalt" => (LegacyDigest::Md5, true),
            "sha1WithSalt" => (LegacyDigest::Sha1, true),
            "sha256WithSalt" => (LegacyDigest::Sha256, true),
            _ => {
                return Err(Error::Configuration(format!(
                    "Unknown password_crypt_function '{}'",
                    name
                )))
            }
        };

        if salted || named_salted {
            Ok(LegacyCrypt::Salted {
                digest,
                salt: salt.unwrap_or_default().to_string(),
            })
        } else {
            Ok(LegacyCrypt::Plain(digest))
        }
    }

    pub fn apply(&self, password: &str) -> String {
        match self {
            LegacyCrypt::Plain(digest) => digest.digest(password.as_bytes()),
            LegacyCrypt::Salted { digest, salt } => {
                digest.digest(format!("{}:{}", salt, password).as_bytes())
            }
        }
    }
}
