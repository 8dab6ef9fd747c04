//! Password hashing for Multiauth

pub mod hash;
pub mod password;

pub use hash::*;
pub use password::{HashCheck, PasswordHasher};
