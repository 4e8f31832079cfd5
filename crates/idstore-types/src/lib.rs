//! Records, store adapter traits, and shared types for the idstore identity data layer.
//!
//! The storage adapters (SQLite today) implement the traits declared here.
//! Application code depends only on this crate and holds adapters behind
//! `Arc<dyn ConfigurationStore>` / `Arc<dyn UserAccountStore>`.

pub mod config_adapter;
pub mod error;
pub mod options;
pub mod prelude;
pub mod types;
pub mod user_account_adapter;
pub mod utils;

// vim: ts=4
