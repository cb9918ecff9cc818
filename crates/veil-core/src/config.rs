//! Configuration parsing and validation
//!
//! This module turns a `veil.yaml` document into a validated
//! [`ProtectionConfig`]. Construction is pure: nothing here touches the target
//! files, so every configuration error surfaces before a run starts.
//!
//! # Document shape
//!
//! ```yaml
//! targets:
//!   - dist/app.min.js
//!
//! # optional base preset, then field-by-field overrides
//! profile: conservative
//! stringEncoding: [base64]
//!
//! # optional user presets, selectable with --profile / VEIL_PROFILE
//! profiles:
//!   ci:
//!     compact: true
//!
//! engine:
//!   type: builtin
//! concurrency: 4
//! timeoutSecs: 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::profile::{ProfileOverrides, TransformProfile, builtin_presets};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "veil.yaml";

/// Which transformation engine a run uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineConfig {
    /// The engine bundled with veil
    #[default]
    Builtin,

    /// An external program reading source on stdin and writing output on stdout
    External {
        /// Program to execute
        command: String,
        /// Extra arguments
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Raw document as written by the user
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    /// Kept untyped so non-string entries get a precise error
    #[serde(default)]
    targets: Vec<serde_yaml::Value>,

    #[serde(default)]
    profile: Option<String>,

    #[serde(default)]
    profiles: BTreeMap<String, ProfileOverrides>,

    #[serde(default)]
    engine: EngineConfig,

    #[serde(default)]
    root: Option<PathBuf>,

    #[serde(default = "default_concurrency")]
    concurrency: usize,

    #[serde(default)]
    timeout_secs: Option<u64>,

    #[serde(flatten)]
    overrides: ProfileOverrides,
}

fn default_concurrency() -> usize {
    1
}

/// Validated, immutable configuration for one protection run
#[derive(Debug, Clone)]
pub struct ProtectionConfig {
    /// Project-root-relative target paths, in processing order
    pub targets: Vec<String>,

    /// The single profile applied to every target
    pub active_profile: TransformProfile,

    /// Name of the preset the profile was built on, if any
    pub profile_name: Option<String>,

    /// Engine selection
    pub engine: EngineConfig,

    /// Directory targets are resolved against
    pub root: PathBuf,

    /// Maximum number of files processed at once
    pub concurrency: usize,

    /// Per-file timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl ProtectionConfig {
    /// Build a configuration directly, applying the same validation as the loader
    pub fn new(
        targets: Vec<String>,
        active_profile: TransformProfile,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        validate_targets(&targets)?;
        active_profile.validate()?;
        Ok(Self {
            targets,
            active_profile,
            profile_name: None,
            engine: EngineConfig::default(),
            root: root.into(),
            concurrency: default_concurrency(),
            timeout_secs: None,
        })
    }

    /// Load configuration from a directory or a `veil.yaml` file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = ProtectionConfig::load("./my-lib")?;
    /// println!("{} targets", config.targets.len());
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_profile(path, None)
    }

    /// Load configuration, selecting `profile` as the base preset
    ///
    /// A `Some` profile takes precedence over the document's `profile:` field.
    pub fn load_with_profile<P: AsRef<Path>>(path: P, profile: Option<&str>) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_dir) = if path.is_dir() {
            (path.join(CONFIG_FILE_NAME), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        tracing::debug!("Reading configuration from {}", config_path.display());
        let contents = std::fs::read_to_string(&config_path)?;
        Self::from_yaml_str(&contents, base_dir, profile)
    }

    /// Parse and validate a configuration document
    ///
    /// `base_dir` is the directory the document lives in; the project root is
    /// that directory unless the document sets `root:`.
    pub fn from_yaml_str(
        yaml: &str,
        base_dir: impl Into<PathBuf>,
        profile: Option<&str>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        // An empty document is a valid no-op configuration
        let raw: RawConfig = if yaml.trim().is_empty() {
            serde_yaml::from_str("{}")?
        } else {
            serde_yaml::from_str(yaml)?
        };

        let targets = raw
            .targets
            .iter()
            .enumerate()
            .map(|(idx, value)| match value {
                serde_yaml::Value::String(s) => Ok(s.clone()),
                other => Err(Error::invalid(format!(
                    "targets[{idx}] must be a string, got {}",
                    describe_value(other)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        validate_targets(&targets)?;

        let profile_name = profile.map(str::to_string).or(raw.profile);
        let mut active_profile = match &profile_name {
            Some(name) => resolve_profile(name, &raw.profiles)?,
            None => TransformProfile::default(),
        };
        raw.overrides.apply_to(&mut active_profile);
        active_profile.validate()?;

        if raw.concurrency == 0 {
            return Err(Error::invalid("concurrency must be at least 1"));
        }

        if let EngineConfig::External { command, .. } = &raw.engine
            && command.trim().is_empty()
        {
            return Err(Error::invalid("engine.command must not be empty"));
        }

        let root = match raw.root {
            Some(root) if root.is_absolute() => root,
            Some(root) => base_dir.join(root),
            None => base_dir,
        };

        Ok(Self {
            targets,
            active_profile,
            profile_name,
            engine: raw.engine,
            root,
            concurrency: raw.concurrency,
            timeout_secs: raw.timeout_secs,
        })
    }

    /// Absolute location of a target
    pub fn resolve(&self, target: &str) -> PathBuf {
        self.root.join(target)
    }
}

/// Look a profile name up among user presets first, then built-ins
pub fn resolve_profile(
    name: &str,
    user_presets: &BTreeMap<String, ProfileOverrides>,
) -> Result<TransformProfile> {
    if let Some(overrides) = user_presets.get(name) {
        let profile = overrides.to_profile();
        profile.validate().map_err(|e| {
            Error::invalid(format!("profile '{name}': {e}"))
        })?;
        return Ok(profile);
    }

    let builtins = builtin_presets()?;
    if let Some(preset) = builtins.get(name) {
        return Ok(preset.profile());
    }

    let available = user_presets
        .keys()
        .chain(builtins.keys())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::UnknownProfile {
        name: name.to_string(),
        available,
    })
}

fn validate_targets(targets: &[String]) -> Result<()> {
    if let Some(idx) = targets.iter().position(|t| t.trim().is_empty()) {
        return Err(Error::invalid(format!("targets[{idx}] must not be empty")));
    }
    Ok(())
}

fn describe_value(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}
