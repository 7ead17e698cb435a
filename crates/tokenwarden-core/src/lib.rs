//! Tokenwarden core - keeps a bearer credential usable for as long as the
//! user is around.
//!
//! The `auth` module holds the credential lifecycle; `config` loads the
//! client settings shared by every front end.

pub mod auth;
pub mod config;

pub use config::Config;
