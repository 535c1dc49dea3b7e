//! Shared data model, language table and settings for codegrade.

pub mod config;
pub mod languages;
pub mod types;
