//! # Lessonpipe Common Library
//!
//! Shared code for the lessonpipe services including:
//! - Domain models (classes, transcript artifacts, exercise sets)
//! - Store gateways (operational SQL store, analytical row store)
//! - Webhook dispatch client
//! - Configuration loading
//! - Error types and utility functions

pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod stores;
pub mod time;

pub use error::{Error, Result};
