//! Fingerprinting services.

pub mod annotator;
pub mod fingerprinting;
pub mod line_hash;
pub mod location_resolver;
