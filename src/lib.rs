pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use errors::FingerprintError;
pub use services::fingerprinting::{
    add_fingerprints, add_fingerprints_concurrently, add_fingerprints_with, FileErrorPolicy,
    FingerprintOptions, FingerprintSummary,
};
pub use services::line_hash::{hash, LineHash, LineHashes};
pub use services::location_resolver::{resolve_uri_to_file, Unresolvable};
