//! User accounts and their persistence.

pub mod store;
pub mod user;

pub use store::{UserResolver, UserStore};
pub use user::{check_password, hash_password, User};
