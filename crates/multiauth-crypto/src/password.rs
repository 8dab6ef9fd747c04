//! Password hashing with Argon2 and legacy digest fallback.
//!
//! Hashes produced by the adaptive algorithm are PHC strings (`$argon2id$...`).
//! Bcrypt hashes (`$2y$...`) written by earlier installations still verify.
//! Anything else stored in the account table is compared against the legacy
//! transform. Both are upgraded to the adaptive algorithm once they verify.

use crate::hash::LegacyCrypt;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use multiauth_core::config::PasswordHashConfig;
use multiauth_core::{Error, Result};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Result of checking a password against a stored hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    Bad,
    Ok,
    /// The password is correct and this hash should replace the stored one
    OkWithNewHash(String),
}

impl HashCheck {
    pub fn is_ok(&self) -> bool {
        !matches!(self, HashCheck::Bad)
    }
}

#[derive(Debug, Clone)]
struct AdaptiveHash {
    algorithm: Algorithm,
    params: Params,
}

impl AdaptiveHash {
    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(self.algorithm, Version::V0x13, self.params.clone())
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    adaptive: Option<AdaptiveHash>,
    legacy: Option<LegacyCrypt>,
}

impl PasswordHasher {
    pub fn from_config(config: &PasswordHashConfig) -> Result<Self> {
        let algorithm = match config.password_hash_method.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "0" => None,
            "argon2id" | "1" | "default" => Some(Algorithm::Argon2id),
            "argon2i" => Some(Algorithm::Argon2i),
            "argon2d" => Some(Algorithm::Argon2d),
            other => {
                return Err(Error::Configuration(format!(
                    "Unsupported password_hash_method '{}'",
                    other
                )))
            }
        };

        let adaptive = match algorithm {
            Some(algorithm) => {
                let options = config.password_hash_options;
                let params = Params::new(
                    options.memory_kib,
                    options.iterations,
                    options.parallelism,
                    None,
                )
                .map_err(|e| Error::Configuration(format!("Invalid password_hash_options: {}", e)))?;
                Some(AdaptiveHash { algorithm, params })
            }
            None => None,
        };

        let legacy = match config.password_crypt_function.as_deref() {
            Some(f) if !f.trim().is_empty() => {
                Some(LegacyCrypt::parse(f, config.password_salt.as_deref())?)
            }
            _ => None,
        };

        let hasher = Self { adaptive, legacy };
        if hasher.is_insecure() {
            warn!("No password hash method configured: passwords are stored in clear text");
        }
        Ok(hasher)
    }

    /// Neither an adaptive algorithm nor a legacy digest is configured
    pub fn is_insecure(&self) -> bool {
        self.adaptive.is_none() && self.legacy.is_none()
    }

    pub fn has_adaptive(&self) -> bool {
        self.adaptive.is_some()
    }

    /// Hash a password with the strongest configured scheme
    pub fn hash(&self, password: &str) -> Result<String> {
        match &self.adaptive {
            Some(adaptive) => {
                let salt = SaltString::generate(&mut OsRng);
                let hash = adaptive
                    .argon2()
                    .hash_password(password.as_bytes(), &salt)
                    .map_err(|e| Error::Hashing(format!("Hashing failed: {e}")))?;
                Ok(hash.to_string())
            }
            None => Ok(self.legacy_hash(password)),
        }
    }

    fn legacy_hash(&self, password: &str) -> String {
        match &self.legacy {
            Some(crypt) => crypt.apply(password),
            None => password.to_string(),
        }
    }

    /// Check `given` against `stored`.
    ///
    /// Adaptive hashes are verified with Argon2 and upgraded when weaker than
    /// the configured parameters. Other values are compared in constant time
    /// with the legacy transform and migrated forward when an adaptive
    /// algorithm is configured.
    pub fn verify(&self, given: &str, stored: &str) -> Result<HashCheck> {
        if is_bcrypt(stored) {
            return self.verify_bcrypt(given, stored);
        }

        if let (true, Some(adaptive)) = (stored.starts_with('$'), &self.adaptive) {
            let parsed = match PasswordHash::new(stored) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Stored hash is not a valid PHC string: {}", e);
                    return Ok(HashCheck::Bad);
                }
            };

            if adaptive.argon2().verify_password(given.as_bytes(), &parsed).is_err() {
                return Ok(HashCheck::Bad);
            }

            if self.is_weaker(&parsed, adaptive) {
                return Ok(HashCheck::OkWithNewHash(self.hash(given)?));
            }
            return Ok(HashCheck::Ok);
        }

        let candidate = self.legacy_hash(given);
        if !bool::from(stored.as_bytes().ct_eq(candidate.as_bytes())) {
            return Ok(HashCheck::Bad);
        }

        if self.adaptive.is_some() {
            return Ok(HashCheck::OkWithNewHash(self.hash(given)?));
        }
        Ok(HashCheck::Ok)
    }

    fn verify_bcrypt(&self, given: &str, stored: &str) -> Result<HashCheck> {
        match bcrypt::verify(given, stored) {
            Ok(true) if self.adaptive.is_some() => Ok(HashCheck::OkWithNewHash(self.hash(given)?)),
            Ok(true) => Ok(HashCheck::Ok),
            Ok(false) => Ok(HashCheck::Bad),
            Err(e) => {
                debug!("Stored bcrypt hash is malformed: {}", e);
                Ok(HashCheck::Bad)
            }
        }
    }

    /// True when `stored` would be replaced on the next successful check
    pub fn needs_rehash(&self, stored: &str) -> bool {
        if is_bcrypt(stored) {
            return self.adaptive.is_some();
        }
        match (&self.adaptive, PasswordHash::new(stored)) {
            (Some(adaptive), Ok(parsed)) => self.is_weaker(&parsed, adaptive),
            (Some(_), Err(_)) => true,
            (None, _) => false,
        }
    }

    fn is_weaker(&self, parsed: &PasswordHash<'_>, adaptive: &AdaptiveHash) -> bool {
        if parsed.algorithm != adaptive.algorithm.ident() {
            return true;
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return true;
        }
        match Params::try_from(parsed) {
            Ok(stored) => {
                stored.m_cost() < adaptive.params.m_cost()
                    || stored.t_cost() < adaptive.params.t_cost()
                    || stored.p_cost() < adaptive.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

fn is_bcrypt(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| stored.starts_with(prefix))
}
