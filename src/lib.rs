//! # legalmark
//!
//! Resolves legal markdown documents: imports, header numbering, optional clauses,
//! cross-references and template fields.

pub mod legal;
