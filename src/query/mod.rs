//! Query evaluation for the embedded engine
//!
//! Evaluates the typed queries produced by `docql`: filters, update
//! operators, aggregation expressions and pipelines, `$text` scoring,
//! spherical distances and collection validators.

pub mod expr;
pub mod filter;
pub mod geo;
pub mod pipeline;
pub mod text;
pub mod update;
pub mod validate;
pub mod value;

pub use pipeline::{LookupSource, Row};
