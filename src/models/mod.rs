//! Serde models of the documents this crate reads and writes.

pub mod sarif;
