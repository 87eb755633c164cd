//! Core infrastructure for tugsplit.
//!
//! This crate provides language-agnostic infrastructure:
//! - Error types and error codes
//! - Shared declaration and emitted-file types
//! - JSON output envelope for CLI responses
//! - Disposable sandboxes for isolated validation
//! - Line-oriented text utilities

pub mod error;
pub mod output;
pub mod sandbox;
pub mod text;
pub mod types;
