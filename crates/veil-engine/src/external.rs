//! Engine backed by an external command
//!
//! The command receives the source on stdin and the active profile as JSON in
//! the `VEIL_PROFILE_JSON` environment variable. Whatever it prints to stdout
//! is the protected output. A non-zero exit status, output that is not UTF-8,
//! or empty output all count as a rejected file.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use veil_core::{TransformError, TransformProfile, TransformationEngine};

/// Environment variable carrying the serialized profile
pub const PROFILE_ENV: &str = "VEIL_PROFILE_JSON";

/// Runs a user-supplied obfuscator once per file
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    command: String,
    args: Vec<String>,
}

impl ExternalEngine {
    /// Engine invoking `command args...`
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    fn error(&self, message: impl Into<String>) -> TransformError {
        TransformError::new(self.name(), message)
    }
}

#[async_trait]
impl TransformationEngine for ExternalEngine {
    fn name(&self) -> &str {
        &self.command
    }

    async fn transform(
        &self,
        source: &str,
        profile: &TransformProfile,
    ) -> Result<String, TransformError> {
        let profile_json = serde_json::to_string(profile)
            .map_err(|e| self.error(format!("failed to serialize profile: {e}")))?;

        debug!(command = %self.command, args = ?self.args, "Spawning external engine");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env(PROFILE_ENV, profile_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.error(format!("failed to start: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.error("stdin not captured"))?;
        let input = source.as_bytes();
        let feed = async move {
            let result = stdin.write_all(input).await;
            drop(stdin);
            match result {
                // the command may exit without reading everything
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| self.error(format!("failed to collect output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(if stderr.is_empty() {
                self.error(format!("exited with {}", output.status))
            } else {
                self.error(format!("exited with {}: {stderr}", output.status))
            });
        }
        fed.map_err(|e| self.error(format!("failed to write source: {e}")))?;

        let text = String::from_utf8(output.stdout)
            .map_err(|_| self.error("output is not valid UTF-8"))?;
        if text.trim().is_empty() {
            return Err(self.error("produced no output"));
        }
        Ok(text)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ExternalEngine {
        ExternalEngine::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_stdout_becomes_output() {
        let engine = sh("cat; printf ';/*x*/'");
        let out = engine
            .transform("var a = 1;", &TransformProfile::default())
            .await
            .unwrap();
        assert_eq!(out, "var a = 1;;/*x*/");
    }

    #[tokio::test]
    async fn test_profile_passed_in_environment() {
        let engine = sh("cat >/dev/null; printf '%s' \"$VEIL_PROFILE_JSON\"");
        let profile = TransformProfile {
            compact: true,
            ..Default::default()
        };
        let out = engine.transform("x", &profile).await.unwrap();
        let parsed: TransformProfile = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, profile);
    }

    #[tokio::test]
    async fn test_non_zero_exit_includes_stderr() {
        let engine = sh("echo 'SyntaxError: line 3' >&2; exit 3");
        let err = engine
            .transform("x", &TransformProfile::default())
            .await
            .unwrap_err();
        assert_eq!(err.engine, "sh");
        assert!(err.message.contains("SyntaxError: line 3"), "{err}");
    }

    #[tokio::test]
    async fn test_empty_output_rejected() {
        let err = sh("cat >/dev/null")
            .transform("x", &TransformProfile::default())
            .await
            .unwrap_err();
        assert!(err.message.contains("no output"));
    }

    #[tokio::test]
    async fn test_non_utf8_output_rejected() {
        let err = sh("cat >/dev/null; printf '\\377\\376'")
            .transform("x", &TransformProfile::default())
            .await
            .unwrap_err();
        assert!(err.message.contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let err = ExternalEngine::new("veil-no-such-obfuscator", vec![])
            .transform("x", &TransformProfile::default())
            .await
            .unwrap_err();
        assert!(err.message.contains("failed to start"));
    }

    #[tokio::test]
    async fn test_command_ignoring_stdin() {
        let big = "x".repeat(1 << 20);
        let out = sh("echo done")
            .transform(&big, &TransformProfile::default())
            .await
            .unwrap();
        assert_eq!(out, "done\n");
    }
}
