//! Core types for Multiauth

mod group;
mod user;

pub use group::*;
pub use user::*;
