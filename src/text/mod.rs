//! Text processing: shared word lists, term aggregation, markup sanitization.

pub mod aggregate;
pub mod lexicon;
pub mod sanitize;

pub use aggregate::{aggregate, RankedTermSet, TermRecord};
