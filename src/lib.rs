//! commentlens: YouTube comment collection and audience portrait system.
//!
//! The pipeline runs in three stages, each persisted per collection run:
//! collect raw comment threads, clean them into normalized comments, and
//! submit the cleaned set to an LLM provider for a structured audience
//! portrait. See the `pipeline` module for the orchestrated operations and
//! `server` for the HTTP dispatch layer.

pub mod clean;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod server;
pub mod youtube;

pub use config::AppConfig;
pub use error::{Error, Result};
