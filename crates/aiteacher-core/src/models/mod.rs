//! Data models for the tutoring platform API.
//!
//! - `User`, `NewAccount`: the authenticated parent account
//! - `Child`, `NewChild`: child learning profiles owned by a parent

pub mod child;
pub mod user;

pub use child::{Child, NewChild};
pub use user::{NewAccount, User};
