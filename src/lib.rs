//! tugsplit: split one large Python module into a validated package.
//!
//! The work happens in the workspace crates; this facade re-exports them and
//! hosts the CLI front door.

pub use tugsplit_core::error;
pub use tugsplit_core::output;
pub use tugsplit_core::sandbox;
pub use tugsplit_core::text;
pub use tugsplit_core::types;

pub use tugsplit_python::{
    prepare_split, split, split_with_options, ImportCheckMode, PreparedSplit, SplitOptions,
    SplitOutcome, ValidationReport,
};

pub mod cli;
