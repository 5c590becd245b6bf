//! Core domain types and logic.

pub mod error;
pub mod ohlcv;
pub mod source;
pub mod rewrite;
pub mod statement;
pub mod codegen;
pub mod procedure;
pub mod value;
pub mod ir;
pub mod harness;
pub mod interpreter;
pub mod runtime;
pub mod indicator;
pub mod settings;
