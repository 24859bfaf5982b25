//! # wacli-core
//!
//! Core types, capability traits, configuration, and error handling shared by
//! the wacli binary, the message store, and the WhatsApp transport.

pub mod config;
pub mod error;
pub mod event;
pub mod jid;
pub mod media;
pub mod models;
pub mod traits;
