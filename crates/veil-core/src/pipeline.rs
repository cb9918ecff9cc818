//! Protection pipeline
//!
//! Drives one end-to-end run: every configured target is checked, read,
//! transformed and overwritten independently. A failure on one file is recorded
//! and the run moves on; only configuration errors (raised before this module is
//! reached) stop a run.
//!
//! ```text
//! ┌─────────┐     ┌─────────┐     ┌───────────┐     ┌─────────┐
//! │ resolve │────▶│  read   │────▶│ transform │────▶│  write  │
//! │ + exist │     │         │     │ (engine)  │     │ (atomic)│
//! └─────────┘     └─────────┘     └───────────┘     └─────────┘
//!      │               │                │                │
//!      └───────────────┴────────────────┴────────────────┴──▶ FileReport
//! ```

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ProtectionConfig;
use crate::engine::TransformationEngine;
use crate::error::{FileError, IoStage};

/// Severity of a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Progress
    Info,
    /// Suspicious configuration, not a failure
    Warning,
    /// A file could not be protected
    Error,
}

/// One line of the run's diagnostic stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Target the line is about, for per-file lines
    pub target: Option<String>,
    /// Human-readable text
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{tag}: {}", self.message)
    }
}

/// What happened to one target
#[derive(Debug)]
pub enum FileOutcome {
    /// Transformed and overwritten
    Succeeded,
    /// The target did not exist; nothing was touched
    SkippedMissing,
    /// Reading, transforming or writing failed; the file was left as it was
    Failed(FileError),
}

impl FileOutcome {
    /// Whether this is [`FileOutcome::Succeeded`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// SHA-256 of a file's content before and after protection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    /// Hex digest of the original content
    pub before: String,
    /// Hex digest of the written content
    pub after: String,
}

/// Per-target result
#[derive(Debug)]
pub struct FileReport {
    /// Target as written in the configuration
    pub target: String,
    /// Resolved location
    pub path: PathBuf,
    /// Outcome
    pub outcome: FileOutcome,
    /// Content digests, present on success
    pub digest: Option<ContentDigest>,
}

/// Aggregate result of a run, returned by [`ProtectionPipeline::run`]
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One report per target, in target order
    pub files: Vec<FileReport>,
    /// Every diagnostic emitted, in emission order
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    /// Number of targets transformed and written
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Succeeded))
    }

    /// Number of targets skipped because they do not exist
    pub fn skipped_missing(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::SkippedMissing))
    }

    /// Number of targets that failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    /// Number of targets processed
    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// Whether any target failed
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Report for a target, if it was processed
    pub fn report(&self, target: &str) -> Option<&FileReport> {
        self.files.iter().find(|r| r.target == target)
    }

    /// Diagnostics of one severity
    pub fn diagnostics_of(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|r| pred(&r.outcome)).count()
    }

    fn emit(&mut self, severity: Severity, target: Option<&str>, message: String) {
        match severity {
            Severity::Info => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
        self.diagnostics.push(Diagnostic {
            severity,
            target: target.map(str::to_string),
            message,
        });
    }

    fn record(&mut self, report: FileReport) {
        match &report.outcome {
            FileOutcome::Succeeded => {
                self.emit(
                    Severity::Info,
                    Some(&report.target),
                    format!("protected {}", report.target),
                );
            }
            FileOutcome::SkippedMissing => {
                self.emit(
                    Severity::Error,
                    Some(&report.target),
                    format!(
                        "skipped {}: file not found at {}",
                        report.target,
                        report.path.display()
                    ),
                );
            }
            FileOutcome::Failed(cause) => {
                self.emit(
                    Severity::Error,
                    Some(&report.target),
                    format!("failed {}: {}", report.target, cause),
                );
            }
        }
        self.files.push(report);
    }
}

/// Runs a [`TransformationEngine`] over every target of a [`ProtectionConfig`]
pub struct ProtectionPipeline<E> {
    engine: E,
    concurrency: Option<usize>,
    timeout: Option<Duration>,
}

impl<E: TransformationEngine> ProtectionPipeline<E> {
    /// Create a pipeline around an engine
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            concurrency: None,
            timeout: None,
        }
    }

    /// Override the configured number of files processed at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency.max(1));
        self
    }

    /// Override the configured per-file timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The wrapped engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Protect every target of `config`
    ///
    /// Never fails: per-file problems are reported in the returned summary.
    pub async fn run(&self, config: &ProtectionConfig) -> RunSummary {
        let mut summary = RunSummary::default();

        if config.targets.is_empty() {
            summary.emit(
                Severity::Warning,
                None,
                "no targets configured; nothing to protect".to_string(),
            );
            return summary;
        }

        for option in self.engine.unsupported_options(&config.active_profile) {
            summary.emit(
                Severity::Warning,
                None,
                format!(
                    "engine '{}' does not support {}; option ignored",
                    self.engine.name(),
                    option
                ),
            );
        }

        let timeout = self
            .timeout
            .or(config.timeout_secs.map(Duration::from_secs));
        let concurrency = self.effective_concurrency(config);

        tracing::debug!(
            "Protecting {} target(s) under {} with engine '{}' ({} at a time)",
            config.targets.len(),
            config.root.display(),
            self.engine.name(),
            concurrency
        );

        let mut reports = futures::stream::iter(config.targets.iter())
            .map(|target| self.process(config, target, timeout))
            .buffered(concurrency);

        while let Some(report) = reports.next().await {
            summary.record(report);
        }

        summary.emit(
            Severity::Info,
            None,
            format!(
                "protection finished: {} succeeded, {} skipped (missing), {} failed",
                summary.succeeded(),
                summary.skipped_missing(),
                summary.failed()
            ),
        );
        summary
    }

    fn effective_concurrency(&self, config: &ProtectionConfig) -> usize {
        let requested = self.concurrency.unwrap_or(config.concurrency).max(1);
        if requested == 1 {
            return 1;
        }

        let mut seen = HashSet::new();
        let unique = config
            .targets
            .iter()
            .all(|t| seen.insert(config.resolve(t)));
        if !unique {
            tracing::debug!("Duplicate targets configured; processing sequentially");
            return 1;
        }
        requested
    }

    async fn process(
        &self,
        config: &ProtectionConfig,
        target: &str,
        timeout: Option<Duration>,
    ) -> FileReport {
        let path = config.resolve(target);
        let (outcome, digest) = match self
            .protect_file(&path, &config.active_profile, timeout)
            .await
        {
            Ok(digest) => (FileOutcome::Succeeded, Some(digest)),
            Err(FileError::Missing { .. }) => (FileOutcome::SkippedMissing, None),
            Err(err) => (FileOutcome::Failed(err), None),
        };

        FileReport {
            target: target.to_string(),
            path,
            outcome,
            digest,
        }
    }

    async fn protect_file(
        &self,
        path: &Path,
        profile: &crate::profile::TransformProfile,
        timeout: Option<Duration>,
    ) -> Result<ContentDigest, FileError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Err(FileError::Missing {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::Missing {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => return Err(io_error(IoStage::Read, path, source)),
        };

        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(IoStage::Read, path, e))?;
        tracing::debug!("Transforming {} ({} bytes)", path.display(), source.len());

        let transformed = match timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.engine.transform(&source, profile))
                    .await
                    .map_err(|_| FileError::Timeout {
                        secs: limit.as_secs(),
                    })??
            }
            None => self.engine.transform(&source, profile).await?,
        };

        write_atomic(path, &transformed, metadata.permissions()).await?;

        Ok(ContentDigest {
            before: sha256_hex(&source),
            after: sha256_hex(&transformed),
        })
    }
}

/// Replace `path`'s content without ever leaving it half-written
///
/// Symlinks are followed so the file they point at is the one updated. When
/// the directory does not allow a temporary file next to the target, the
/// content is written in place instead.
async fn write_atomic(
    path: &Path,
    content: &str,
    permissions: std::fs::Permissions,
) -> Result<(), FileError> {
    let real = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| io_error(IoStage::Write, path, e))?;
    let file_name = real
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = real.with_file_name(format!(".{file_name}.veil-tmp"));

    if let Err(source) = tokio::fs::write(&tmp, content).await {
        if source.kind() != std::io::ErrorKind::PermissionDenied {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(IoStage::Write, path, source));
        }
        tracing::debug!("Cannot create {}; writing in place", tmp.display());
        return tokio::fs::write(&real, content)
            .await
            .map_err(|e| io_error(IoStage::Write, path, e));
    }

    let result = async {
        tokio::fs::set_permissions(&tmp, permissions).await?;
        tokio::fs::rename(&tmp, &real).await
    }
    .await;

    if let Err(source) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error(IoStage::Write, path, source));
    }
    Ok(())
}

fn io_error(stage: IoStage, path: &Path, source: std::io::Error) -> FileError {
    FileError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    }
}

fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::profile::TransformProfile;
    use async_trait::async_trait;

    struct Upper;

    #[async_trait]
    impl TransformationEngine for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn transform(
            &self,
            source: &str,
            _profile: &TransformProfile,
        ) -> Result<String, TransformError> {
            Ok(source.to_uppercase())
        }
    }

    struct Slow;

    #[async_trait]
    impl TransformationEngine for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn transform(
            &self,
            source: &str,
            _profile: &TransformProfile,
        ) -> Result<String, TransformError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(source.to_string())
        }
    }

    fn config(root: &Path, targets: &[&str]) -> ProtectionConfig {
        ProtectionConfig::new(
            targets.iter().map(|t| t.to_string()).collect(),
            TransformProfile::default(),
            root,
        )
        .unwrap()
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic {
            severity: Severity::Warning,
            target: None,
            message: "no targets configured; nothing to protect".to_string(),
        };
        assert_eq!(
            diag.to_string(),
            "warning: no targets configured; nothing to protect"
        );
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_directory_target_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();

        let summary = ProtectionPipeline::new(Upper)
            .run(&config(dir.path(), &["dist"]))
            .await;
        assert_eq!(summary.skipped_missing(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_target_updates_link_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        std::fs::write(dir.path().join("build/real.js"), "let a = 1;").unwrap();
        std::os::unix::fs::symlink("build/real.js", dir.path().join("dist.js")).unwrap();

        let summary = ProtectionPipeline::new(Upper)
            .run(&config(dir.path(), &["dist.js"]))
            .await;
        assert_eq!(summary.succeeded(), 1);

        let link = std::fs::symlink_metadata(dir.path().join("dist.js")).unwrap();
        assert!(link.file_type().is_symlink());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("build/real.js")).unwrap(),
            "LET A = 1;"
        );
        assert!(!dir.path().join("build/.real.js.veil-tmp").exists());
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "let a = 1;").unwrap();

        let summary = ProtectionPipeline::new(Upper)
            .run(&config(dir.path(), &["a.js"]))
            .await;
        assert_eq!(summary.succeeded(), 1);

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.js"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.js")).unwrap(),
            "LET A = 1;"
        );
    }

    #[tokio::test]
    async fn test_digest_reported_on_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "").unwrap();

        let summary = ProtectionPipeline::new(Upper)
            .run(&config(dir.path(), &["a.js"]))
            .await;
        let digest = summary.report("a.js").unwrap().digest.as_ref().unwrap();
        assert_eq!(digest.before, digest.after);
        assert_eq!(digest.before, sha256_hex(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_file_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "let a = 1;").unwrap();

        let summary = ProtectionPipeline::new(Slow)
            .with_timeout(Duration::from_secs(5))
            .run(&config(dir.path(), &["a.js"]))
            .await;

        assert_eq!(summary.failed(), 1);
        assert!(matches!(
            summary.files[0].outcome,
            FileOutcome::Failed(FileError::Timeout { secs: 5 })
        ));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.js")).unwrap(),
            "let a = 1;"
        );
    }

    #[test]
    fn test_duplicate_targets_force_sequential() {
        let cfg = config(Path::new("/p"), &["a.js", "b.js", "a.js"]);
        let pipeline = ProtectionPipeline::new(Upper).with_concurrency(4);
        assert_eq!(pipeline.effective_concurrency(&cfg), 1);

        let cfg = config(Path::new("/p"), &["a.js", "b.js"]);
        assert_eq!(pipeline.effective_concurrency(&cfg), 4);
    }
}
