//! Python module splitting for tugsplit.
//!
//! Breaks one large Python module into a package holding one file per
//! class (or per configured group), a shared functions file, a residual
//! module and a `main` module for leftover statements, plus a re-export
//! module at the original location. The result is then validated.
//!
//! Pipeline, leaf first:
//! - [`extract`]: top-level declarations, imports and docstring
//! - [`analyzer`]: dependency edges between declarations
//! - [`plan`]: which declaration goes where, and the imports each file needs
//! - [`emit`]: rendering and writing the layout
//! - [`verification`]: syntax, isolated import and structural checks
//! - [`split`]: the entry point running all of the above

pub mod analyzer;
pub mod config;
pub mod docgen;
pub mod emit;
pub mod env;
pub mod extract;
pub mod names;
pub mod parse;
pub mod plan;
pub mod split;
pub mod validation;
pub mod verification;

pub use split::{prepare_split, split, split_with_options, PreparedSplit, SplitOptions, SplitOutcome};
pub use verification::{ImportCheckMode, ValidationReport};
