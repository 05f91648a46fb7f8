use std::env;
use std::path::PathBuf;

use crate::errors::FingerprintError;
use crate::services::fingerprinting::{FileErrorPolicy, FingerprintOptions};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sarif_input: PathBuf,
    /// `None` writes the annotated document to stdout.
    pub sarif_output: Option<PathBuf>,
    pub source_root: PathBuf,
    pub max_concurrency: usize,
    pub on_file_error: FileErrorPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, FingerprintError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FingerprintError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sarif_input = lookup("SARIF_INPUT")
            .map(PathBuf::from)
            .ok_or_else(|| FingerprintError::Config("SARIF_INPUT is required".to_string()))?;

        let source_root = match lookup("SOURCE_ROOT") {
            Some(root) => PathBuf::from(root),
            None => env::current_dir()
                .map_err(|e| FingerprintError::Config(format!("no working directory: {e}")))?,
        };

        Ok(Self {
            sarif_input,
            sarif_output: lookup("SARIF_OUTPUT").map(PathBuf::from),
            source_root,
            max_concurrency: lookup("FINGERPRINT_MAX_CONCURRENCY")
                .unwrap_or_else(|| "4".to_string())
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .unwrap_or(4),
            on_file_error: lookup("FINGERPRINT_ON_FILE_ERROR")
                .map(|policy| policy.parse::<FileErrorPolicy>())
                .transpose()?
                .unwrap_or_default(),
        })
    }

    pub fn fingerprint_options(&self) -> FingerprintOptions {
        FingerprintOptions {
            max_concurrency: self.max_concurrency,
            on_file_error: self.on_file_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, FingerprintError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn requires_input() {
        let err = config(&[("SOURCE_ROOT", "/src")]).unwrap_err();
        assert!(matches!(err, FingerprintError::Config(_)));
    }

    #[test]
    fn defaults() {
        let config = config(&[("SARIF_INPUT", "results.sarif"), ("SOURCE_ROOT", "/src")]).unwrap();
        assert_eq!(config.sarif_input, PathBuf::from("results.sarif"));
        assert_eq!(config.source_root, PathBuf::from("/src"));
        assert_eq!(config.sarif_output, None);
        assert_eq!(config.fingerprint_options(), FingerprintOptions::default());
    }

    #[test]
    fn bad_concurrency_falls_back() {
        for value in ["zero", "0", "-3"] {
            let config = config(&[
                ("SARIF_INPUT", "results.sarif"),
                ("SOURCE_ROOT", "/src"),
                ("FINGERPRINT_MAX_CONCURRENCY", value),
            ])
            .unwrap();
            assert_eq!(config.max_concurrency, 4);
        }
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("SARIF_INPUT", "in.sarif"),
            ("SARIF_OUTPUT", "out.sarif"),
            ("SOURCE_ROOT", "/checkout"),
            ("FINGERPRINT_MAX_CONCURRENCY", "16"),
            ("FINGERPRINT_ON_FILE_ERROR", "skip"),
        ])
        .unwrap();
        assert_eq!(config.sarif_output, Some(PathBuf::from("out.sarif")));
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.on_file_error, FileErrorPolicy::SkipFile);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = config(&[
            ("SARIF_INPUT", "in.sarif"),
            ("FINGERPRINT_ON_FILE_ERROR", "ignore"),
        ])
        .unwrap_err();
        assert!(matches!(err, FingerprintError::Config(_)));
    }
}
