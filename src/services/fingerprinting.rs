//! Fingerprinting pipeline for a whole results document.
//!
//! Resolves every result's primary location, groups results by file so each
//! file is hashed exactly once, distributes the file's line hashes to every
//! result waiting on it, and re-serializes the document.
//!
//! Results that cannot be fingerprinted are left untouched. Only an invalid
//! document, or (under `FileErrorPolicy::Abort`) an unreadable source file,
//! fails the run.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::errors::FingerprintError;
use crate::models::sarif::SarifLog;
use crate::services::annotator::{Annotation, ResultAnnotator};
use crate::services::line_hash::{self, LineHash};
use crate::services::location_resolver::resolve_uri_to_file;

/// What to do when a source file fails to read while being hashed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileErrorPolicy {
    /// Fail the whole document.
    #[default]
    Abort,
    /// Log a warning and leave that file's results without fingerprints.
    SkipFile,
}

impl FromStr for FileErrorPolicy {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip_file" => Ok(Self::SkipFile),
            other => Err(FingerprintError::Config(format!(
                "unknown file error policy {other:?} (expected \"abort\" or \"skip\")"
            ))),
        }
    }
}

/// Tuning for a fingerprinting run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintOptions {
    /// Maximum number of files hashed at once by the concurrent driver.
    pub max_concurrency: usize,
    pub on_file_error: FileErrorPolicy,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            on_file_error: FileErrorPolicy::Abort,
        }
    }
}

/// Counters describing one fingerprinting run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintSummary {
    pub results: usize,
    /// Results that received a new fingerprint.
    pub fingerprinted: usize,
    /// Results whose existing fingerprint matched the computed one.
    pub unchanged: usize,
    pub conflicts: usize,
    /// Results without a usable location.
    pub skipped: usize,
    pub files_hashed: usize,
    pub files_failed: usize,
}

/// Results waiting on the hashes of one file.
#[derive(Debug)]
struct FilePlan {
    path: PathBuf,
    annotators: Vec<ResultAnnotator>,
}

impl FilePlan {
    fn wanted_lines(&self) -> HashSet<usize> {
        self.annotators
            .iter()
            .filter_map(|a| usize::try_from(a.target_line).ok())
            .collect()
    }
}

/// Compute fingerprints for `document_text` and return the updated document.
pub fn add_fingerprints(
    document_text: &str,
    source_root: &Path,
) -> Result<String, FingerprintError> {
    add_fingerprints_with(document_text, source_root, &FingerprintOptions::default())
}

/// [`add_fingerprints`] with explicit options, hashing files one at a time.
pub fn add_fingerprints_with(
    document_text: &str,
    source_root: &Path,
    options: &FingerprintOptions,
) -> Result<String, FingerprintError> {
    let mut log = parse_document(document_text)?;
    annotate_document(&mut log, source_root, options)?;
    serde_json::to_string(&log).map_err(FingerprintError::Serialize)
}

/// [`add_fingerprints`] hashing up to `options.max_concurrency` files at once.
///
/// Output is identical to the sequential driver: hashes are applied in the
/// same file order once the workers are done. Under `FileErrorPolicy::Abort`
/// the first failed file ends the run and hashing still queued is cancelled.
pub async fn add_fingerprints_concurrently(
    document_text: &str,
    source_root: &Path,
    options: &FingerprintOptions,
) -> Result<String, FingerprintError> {
    let mut log = parse_document(document_text)?;
    annotate_document_concurrently(&mut log, source_root, options).await?;
    serde_json::to_string(&log).map_err(FingerprintError::Serialize)
}

pub fn parse_document(document_text: &str) -> Result<SarifLog, FingerprintError> {
    serde_json::from_str(document_text).map_err(FingerprintError::Parse)
}

/// Fingerprint every result of `log` in place, one file at a time.
pub fn annotate_document(
    log: &mut SarifLog,
    source_root: &Path,
    options: &FingerprintOptions,
) -> Result<FingerprintSummary, FingerprintError> {
    tracing::info!(source_root = %source_root.display(), "Adding fingerprints to results document");
    let mut summary = FingerprintSummary::default();
    let plans = plan_files(log, source_root, &mut summary);

    for plan in &plans {
        let outcome = collect_line_hashes(&plan.path, &plan.wanted_lines());
        apply_file(log, plan, outcome, options.on_file_error, &mut summary)?;
    }

    log_summary(&summary);
    Ok(summary)
}

/// Fingerprint every result of `log` in place, hashing files on the blocking
/// thread pool.
pub async fn annotate_document_concurrently(
    log: &mut SarifLog,
    source_root: &Path,
    options: &FingerprintOptions,
) -> Result<FingerprintSummary, FingerprintError> {
    tracing::info!(
        source_root = %source_root.display(),
        max_concurrency = options.max_concurrency,
        "Adding fingerprints to results document"
    );
    let mut summary = FingerprintSummary::default();
    let plans = plan_files(log, source_root, &mut summary);

    // Dropping the set on an early return aborts every task still waiting
    // for a permit.
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let mut workers = JoinSet::new();
    for (plan_index, plan) in plans.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let path = plan.path.clone();
        let wanted = plan.wanted_lines();
        workers.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(permit) => tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    collect_line_hashes(&path, &wanted)
                })
                .await
                .unwrap_or_else(|e| Err(FingerprintError::Task(e.to_string()))),
                Err(e) => Err(FingerprintError::Task(e.to_string())),
            };
            (plan_index, outcome)
        });
    }

    let mut outcomes: Vec<Option<Result<Vec<LineHash>, FingerprintError>>> =
        plans.iter().map(|_| None).collect();
    while let Some(joined) = workers.join_next().await {
        let (plan_index, outcome) = joined.map_err(|e| FingerprintError::Task(e.to_string()))?;
        outcomes[plan_index] = Some(match outcome {
            Err(err) if options.on_file_error == FileErrorPolicy::Abort => return Err(err),
            outcome => outcome,
        });
    }

    for (plan, outcome) in plans.iter().zip(outcomes) {
        let outcome = outcome.unwrap_or_else(|| {
            Err(FingerprintError::Task("hashing task did not report".to_string()))
        });
        apply_file(log, plan, outcome, options.on_file_error, &mut summary)?;
    }

    log_summary(&summary);
    Ok(summary)
}

/// Group fingerprintable results by the file their primary location names.
///
/// Files are ordered by path so runs are reproducible.
fn plan_files(
    log: &SarifLog,
    source_root: &Path,
    summary: &mut FingerprintSummary,
) -> Vec<FilePlan> {
    let mut by_file: BTreeMap<PathBuf, Vec<ResultAnnotator>> = BTreeMap::new();

    for (run_index, run) in log.runs().enumerate() {
        let artifacts = run.artifacts();

        for (result_index, result) in run.results().enumerate() {
            summary.results += 1;

            let Some(primary) = result.primary_location() else {
                tracing::debug!(
                    run_index,
                    result_index,
                    "Unable to compute fingerprint for result without locations"
                );
                summary.skipped += 1;
                continue;
            };
            let Some(artifact_location) = primary.artifact_location() else {
                tracing::debug!(
                    location = %primary.raw(),
                    "Unable to compute fingerprint for invalid location"
                );
                summary.skipped += 1;
                continue;
            };
            if primary.start_line().is_none() {
                // Locations without a line number are unlikely to be source files
                tracing::debug!(
                    uri = %artifact_location.describe(),
                    "Skipping location without a start line"
                );
                summary.skipped += 1;
                continue;
            }

            match resolve_uri_to_file(artifact_location, artifacts, source_root) {
                Ok(path) => by_file
                    .entry(path)
                    .or_default()
                    .push(ResultAnnotator::new(run_index, result_index, primary)),
                Err(reason) => {
                    tracing::debug!(
                        uri = %artifact_location.describe(),
                        %reason,
                        "Unable to compute fingerprint for location"
                    );
                    summary.skipped += 1;
                }
            }
        }
    }

    by_file
        .into_iter()
        .map(|(path, annotators)| FilePlan { path, annotators })
        .collect()
}

/// Hash one file, keeping only the lines some result is waiting for.
fn collect_line_hashes(
    path: &Path,
    wanted: &HashSet<usize>,
) -> Result<Vec<LineHash>, FingerprintError> {
    let mut hashes = Vec::new();
    line_hash::hash(path, |line, token| {
        if wanted.contains(&line) {
            hashes.push(LineHash {
                line,
                token: token.to_string(),
            });
        }
    })?;
    Ok(hashes)
}

/// Fan a file's hashes out to every result waiting on that file.
fn apply_file(
    log: &mut SarifLog,
    plan: &FilePlan,
    outcome: Result<Vec<LineHash>, FingerprintError>,
    policy: FileErrorPolicy,
    summary: &mut FingerprintSummary,
) -> Result<(), FingerprintError> {
    let hashes = match outcome {
        Ok(hashes) => hashes,
        Err(err) if policy == FileErrorPolicy::SkipFile => {
            tracing::warn!(
                file = %plan.path.display(),
                error = %err,
                results = plan.annotators.len(),
                "Skipping fingerprints for unreadable file"
            );
            summary.files_failed += 1;
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    summary.files_hashed += 1;
    for line_hash in &hashes {
        for annotator in &plan.annotators {
            let Some(result) = log.result_mut(annotator.run_index, annotator.result_index)
            else {
                continue;
            };
            match annotator.apply(result, line_hash.line, &line_hash.token) {
                Annotation::Recorded => summary.fingerprinted += 1,
                Annotation::Unchanged => summary.unchanged += 1,
                Annotation::Conflict { .. } => summary.conflicts += 1,
                Annotation::Ignored | Annotation::Unwritable => {}
            }
        }
    }
    Ok(())
}

fn log_summary(summary: &FingerprintSummary) {
    tracing::info!(
        results = summary.results,
        fingerprinted = summary.fingerprinted,
        unchanged = summary.unchanged,
        conflicts = summary.conflicts,
        skipped = summary.skipped,
        files_hashed = summary.files_hashed,
        files_failed = summary.files_failed,
        "Finished adding fingerprints"
    );
}
