//! Resolution pipeline for the legal markdown dialect
//!
//! Raw dialect source goes in; resolved text, merged metadata, a field report and a list of
//! diagnostics come out. See [`pipeline`] for the stage order and [`pipeline::resolve`] for the
//! entry point.

pub mod clauses;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod expression;
pub mod fields;
pub mod frontmatter;
pub mod headers;
pub mod helpers;
pub mod imports;
pub mod loader;
pub mod pipeline;
pub mod references;
pub mod template;
pub mod value;
