//! A small spreadsheet-style formula language: `IF({Sale Price} > 100, "big",
//!  "small")`. Formulas can be evaluated against a row of values, folded, or
//!  translated to SQL.

pub mod ast;
pub mod evaluate;
pub mod formula;
pub mod functions;
pub mod fuzz_helper;
pub mod lex;
pub mod parser;
pub mod simplify;
pub mod translate;

pub use formula::{Error, Formula};
