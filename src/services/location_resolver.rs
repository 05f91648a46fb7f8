//! Maps a SARIF artifact location to a file under the source root.
//!
//! Relative URIs are assumed to be relative to the source root. Tools do not
//! always follow that convention, but accepting them fingerprints far more
//! results than rejecting them would.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::models::sarif::{is_truthy, ArtifactLocation};

const FILE_SCHEME: &str = "file://";

/// Why a location could not be mapped to a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unresolvable {
    #[error("artifact index {0} is invalid")]
    InvalidIndex(String),

    #[error("URI {0} is not a string")]
    InvalidUri(String),

    #[error("URI {0:?} is not valid percent-encoded UTF-8")]
    MalformedEncoding(String),

    #[error("scheme of URI {0:?} is not recognised")]
    UnsupportedScheme(String),

    #[error("URI {0:?} is outside of the source root")]
    OutsideSourceRoot(String),

    #[error("file {0:?} does not exist")]
    NotFound(String),

    #[error("{0:?} is a directory")]
    Directory(String),
}

/// Resolve `location` to an existing file under `source_root`.
///
/// A location whose `uri` is missing, `null` or empty but which carries an
/// `index` is looked up in the run's `artifacts` table first.
pub fn resolve_uri_to_file(
    location: ArtifactLocation<'_>,
    artifacts: &[Value],
    source_root: &Path,
) -> Result<PathBuf, Unresolvable> {
    let location = match (location.uri(), location.index()) {
        (uri, Some(index)) if !uri.is_some_and(is_truthy) => {
            artifact_location(index, artifacts)?
        }
        _ => location,
    };

    let raw_uri = match location.uri() {
        Some(Value::String(uri)) => uri,
        Some(other) => return Err(Unresolvable::InvalidUri(other.to_string())),
        None => return Err(Unresolvable::InvalidUri("undefined".to_string())),
    };
    let decoded = decode_uri_component(raw_uri)
        .ok_or_else(|| Unresolvable::MalformedEncoding(raw_uri.clone()))?;

    let uri = decoded.strip_prefix(FILE_SCHEME).unwrap_or(&decoded);
    if uri.contains("://") {
        return Err(Unresolvable::UnsupportedScheme(uri.to_string()));
    }

    let root = source_root.to_string_lossy();
    let root_prefix = format!("{}/", root.trim_end_matches('/'));
    let resolved = if uri.starts_with('/') {
        if !uri.starts_with(&root_prefix) {
            return Err(Unresolvable::OutsideSourceRoot(uri.to_string()));
        }
        uri.to_string()
    } else {
        format!("{root_prefix}{uri}")
    };

    let path = PathBuf::from(&resolved);
    match std::fs::metadata(&path) {
        Err(_) => Err(Unresolvable::NotFound(resolved)),
        Ok(meta) if meta.is_dir() => Err(Unresolvable::Directory(resolved)),
        Ok(_) => Ok(path),
    }
}

fn artifact_location<'a>(
    index: &Value,
    artifacts: &'a [Value],
) -> Result<ArtifactLocation<'a>, Unresolvable> {
    index
        .as_u64()
        .and_then(|i| usize::try_from(i).ok())
        .and_then(|i| artifacts.get(i))
        .and_then(|artifact| artifact.get("location"))
        .and_then(ArtifactLocation::from_value)
        .ok_or_else(|| Unresolvable::InvalidIndex(index.to_string()))
}

/// Percent-decode like `decodeURIComponent`: malformed escapes and escapes
/// decoding to invalid UTF-8 are rejected rather than passed through.
fn decode_uri_component(uri: &str) -> Option<String> {
    let bytes = uri.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(uri)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
