//! Command-line support for the `netloc-trapd` binary.

pub mod args;
