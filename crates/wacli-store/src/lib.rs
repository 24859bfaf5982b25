//! # wacli-store
//!
//! Chats and messages persisted in SQLite, reconciled by merge-upserts.

pub mod store;

pub use store::Store;
