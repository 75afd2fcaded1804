//! webgrade CLI
//!
//! Command-line interface for grading web application submissions
//! against scenario fixtures.

pub mod commands;
pub mod output;
