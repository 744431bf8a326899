//! Database models.

pub mod user;

pub use user::{USER, User, UserResponse};
