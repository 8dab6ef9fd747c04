//! Built-in account table providers

mod common;
pub mod dbaccounts;
pub mod dbdao;

pub use common::*;
pub use dbaccounts::DbAccountsProvider;
pub use dbdao::DbDaoProvider;
