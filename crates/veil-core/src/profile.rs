//! Transform profiles and presets
//!
//! A [`TransformProfile`] is the full, immutable set of options handed to a
//! transformation engine for one run. Profiles are assembled by layering
//! [`ProfileOverrides`] (every field optional) over a base: first a named
//! preset, then whatever the configuration document sets at top level.
//!
//! # Example
//!
//! ```yaml
//! profile: conservative
//! stringEncoding: [base64]
//! deadCodeInjection: true
//! deadCodeInjectionThreshold: 0.2
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

const BUILTIN_PRESETS: &str = include_str!("presets.yaml");

/// How generated and rewritten identifiers are named
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierStrategy {
    /// Readable, prefixed names
    Plain,
    /// `_0x` followed by hex digits
    #[default]
    Hexadecimal,
    /// Short names built from `$` and `_` runs
    Mangled,
}

/// Encoding applied to pooled strings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StringEncoding {
    /// Stored verbatim
    None,
    /// Stored base64-encoded and decoded at runtime
    Base64,
}

/// Immutable set of transformation options for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformProfile {
    /// Remove non-essential whitespace and comments
    pub compact: bool,

    /// Naming scheme for identifiers the engine introduces or rewrites
    pub identifier_strategy: IdentifierStrategy,

    /// Move string literals into a shared pool
    pub string_pooling: bool,

    /// Encodings applied to pooled strings
    pub string_encoding: BTreeSet<StringEncoding>,

    /// Fraction of eligible strings pooled, in `[0, 1]`
    pub string_pool_threshold: f64,

    /// Store the pool rotated by a content-derived offset
    pub string_pool_rotate: bool,

    /// Store the pool in permuted order
    pub string_pool_shuffle: bool,

    /// Break string literals into concatenated fragments
    pub string_splitting: bool,

    /// Fragment length used by string splitting
    pub string_split_chunk_length: usize,

    /// Rewrite structured control flow into dispatch-table form
    pub control_flow_flattening: bool,

    /// Fraction of eligible control structures flattened, in `[0, 1]`
    pub control_flow_flattening_threshold: f64,

    /// Insert unreachable decoy code
    pub dead_code_injection: bool,

    /// Amount of decoy code relative to the maximum, in `[0, 1]`
    pub dead_code_injection_threshold: f64,

    /// Rewrite `obj.key` into `obj["key"]`
    pub object_key_transform: bool,

    /// Output breaks itself if it is reformatted
    pub self_defending: bool,

    /// Detect attached debuggers at runtime
    pub debug_protection: bool,

    /// Period of repeated debugger checks; `0` leaves only the one-shot check
    pub debug_protection_interval_ms: u64,

    /// Replace the artifact's console methods with no-ops
    pub console_output_disabled: bool,

    /// Also rename global bindings. Dangerous: may break host-visible names.
    pub rename_globals: bool,
}

impl Default for TransformProfile {
    fn default() -> Self {
        Self {
            compact: false,
            identifier_strategy: IdentifierStrategy::default(),
            string_pooling: false,
            string_encoding: BTreeSet::new(),
            string_pool_threshold: 0.0,
            string_pool_rotate: false,
            string_pool_shuffle: false,
            string_splitting: false,
            string_split_chunk_length: default_chunk_length(),
            control_flow_flattening: false,
            control_flow_flattening_threshold: 0.0,
            dead_code_injection: false,
            dead_code_injection_threshold: 0.0,
            object_key_transform: false,
            self_defending: false,
            debug_protection: false,
            debug_protection_interval_ms: 0,
            console_output_disabled: false,
            rename_globals: false,
        }
    }
}

fn default_chunk_length() -> usize {
    10
}

impl TransformProfile {
    /// Check the invariants every profile must satisfy before a run starts
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("stringPoolThreshold", self.string_pool_threshold),
            (
                "controlFlowFlatteningThreshold",
                self.control_flow_flattening_threshold,
            ),
            (
                "deadCodeInjectionThreshold",
                self.dead_code_injection_threshold,
            ),
        ];
        for (field, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid(format!(
                    "{field} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.string_split_chunk_length == 0 {
            return Err(Error::invalid(
                "stringSplitChunkLength must be a positive integer",
            ));
        }

        Ok(())
    }

    /// Whether pooled strings are stored base64-encoded
    pub fn encodes_base64(&self) -> bool {
        self.string_encoding.contains(&StringEncoding::Base64)
    }

    /// Names of the transform options this profile turns on
    ///
    /// `identifierStrategy` is a naming choice rather than a transform and is
    /// not listed.
    pub fn enabled_options(&self) -> Vec<&'static str> {
        let flags = [
            ("compact", self.compact),
            ("stringPooling", self.string_pooling),
            ("stringSplitting", self.string_splitting),
            ("controlFlowFlattening", self.control_flow_flattening),
            ("deadCodeInjection", self.dead_code_injection),
            ("objectKeyTransform", self.object_key_transform),
            ("selfDefending", self.self_defending),
            ("debugProtection", self.debug_protection),
            ("consoleOutputDisabled", self.console_output_disabled),
            ("renameGlobals", self.rename_globals),
        ];
        flags
            .into_iter()
            .filter_map(|(name, on)| on.then_some(name))
            .collect()
    }
}

/// Partial profile: every field optional, applied field by field over a base
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compact: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identifier_strategy: Option<IdentifierStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_pooling: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_encoding: Option<BTreeSet<StringEncoding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_pool_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_pool_rotate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_pool_shuffle: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_splitting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_split_chunk_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control_flow_flattening: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control_flow_flattening_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dead_code_injection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dead_code_injection_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_key_transform: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    self_defending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    debug_protection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    debug_protection_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    console_output_disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rename_globals: Option<bool>,
}

impl ProfileOverrides {
    /// Apply every set field onto `base`
    pub fn apply_to(&self, base: &mut TransformProfile) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut base.compact, &self.compact);
        set(&mut base.identifier_strategy, &self.identifier_strategy);
        set(&mut base.string_pooling, &self.string_pooling);
        set(&mut base.string_encoding, &self.string_encoding);
        set(&mut base.string_pool_threshold, &self.string_pool_threshold);
        set(&mut base.string_pool_rotate, &self.string_pool_rotate);
        set(&mut base.string_pool_shuffle, &self.string_pool_shuffle);
        set(&mut base.string_splitting, &self.string_splitting);
        set(
            &mut base.string_split_chunk_length,
            &self.string_split_chunk_length,
        );
        set(
            &mut base.control_flow_flattening,
            &self.control_flow_flattening,
        );
        set(
            &mut base.control_flow_flattening_threshold,
            &self.control_flow_flattening_threshold,
        );
        set(&mut base.dead_code_injection, &self.dead_code_injection);
        set(
            &mut base.dead_code_injection_threshold,
            &self.dead_code_injection_threshold,
        );
        set(&mut base.object_key_transform, &self.object_key_transform);
        set(&mut base.self_defending, &self.self_defending);
        set(&mut base.debug_protection, &self.debug_protection);
        set(
            &mut base.debug_protection_interval_ms,
            &self.debug_protection_interval_ms,
        );
        set(
            &mut base.console_output_disabled,
            &self.console_output_disabled,
        );
        set(&mut base.rename_globals, &self.rename_globals);
    }

    /// Build a full profile from the defaults plus these overrides
    pub fn to_profile(&self) -> TransformProfile {
        let mut profile = TransformProfile::default();
        self.apply_to(&mut profile);
        profile
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A named profile shipped with veil
#[derive(Debug, Clone, Deserialize)]
pub struct Preset {
    /// One-line summary shown by `veil presets`
    #[serde(default)]
    pub description: String,

    /// Settings layered over the default profile
    #[serde(flatten)]
    pub overrides: ProfileOverrides,
}

impl Preset {
    /// Resolve to a full profile
    pub fn profile(&self) -> TransformProfile {
        self.overrides.to_profile()
    }
}

/// Load the built-in preset table
pub fn builtin_presets() -> Result<BTreeMap<String, Preset>> {
    Ok(serde_yaml::from_str(BUILTIN_PRESETS)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_profile_is_all_off() {
        let profile = TransformProfile::default();
        assert!(profile.enabled_options().is_empty());
        assert!(!profile.rename_globals);
        assert_eq!(profile.debug_protection_interval_ms, 0);
        assert!(profile.string_encoding.is_empty());
        assert_eq!(profile.string_pool_threshold, 0.0);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_builtin_presets_parse() {
        let presets = builtin_presets().unwrap();
        assert!(presets.contains_key("conservative"));
        assert!(presets.contains_key("extreme"));

        let conservative = presets["conservative"].profile();
        assert!(conservative.self_defending);
        assert_eq!(conservative.debug_protection_interval_ms, 4000);
        assert_eq!(conservative.string_pool_threshold, 0.75);
        assert_eq!(
            conservative.identifier_strategy,
            IdentifierStrategy::Hexadecimal
        );
        assert!(!conservative.rename_globals);

        let extreme = presets["extreme"].profile();
        assert!(extreme.encodes_base64());
        assert_eq!(extreme.string_pool_threshold, 1.0);
    }

    #[test]
    fn test_all_builtin_presets_validate() {
        for (name, preset) in builtin_presets().unwrap() {
            assert!(preset.profile().validate().is_ok(), "preset {name} invalid");
        }
    }

    #[test]
    fn test_overrides_apply_field_by_field() {
        let yaml = r#"
compact: true
stringPoolThreshold: 0.3
identifierStrategy: mangled
"#;
        let overrides: ProfileOverrides = serde_yaml::from_str(yaml).unwrap();
        let mut base = builtin_presets().unwrap()["conservative"].profile();
        overrides.apply_to(&mut base);

        assert_eq!(base.string_pool_threshold, 0.3);
        assert_eq!(base.identifier_strategy, IdentifierStrategy::Mangled);
        // untouched fields keep the preset value
        assert!(base.self_defending);
    }

    #[test]
    fn test_unknown_identifier_strategy_rejected() {
        let result: std::result::Result<ProfileOverrides, _> =
            serde_yaml::from_str("identifierStrategy: rot13\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_string_encoding_set_deduplicates() {
        let overrides: ProfileOverrides =
            serde_yaml::from_str("stringEncoding: [base64, none, base64]\n").unwrap();
        let profile = overrides.to_profile();
        assert_eq!(profile.string_encoding.len(), 2);
        assert!(profile.encodes_base64());
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(0.5)]
    fn test_threshold_boundaries_accepted(#[case] value: f64) {
        let profile = TransformProfile {
            string_pool_threshold: value,
            control_flow_flattening_threshold: value,
            dead_code_injection_threshold: value,
            ..Default::default()
        };
        assert!(profile.validate().is_ok());
    }

    #[rstest]
    #[case(1.0001)]
    #[case(-0.0001)]
    #[case(f64::NAN)]
    fn test_threshold_out_of_range_rejected(#[case] value: f64) {
        let profile = TransformProfile {
            dead_code_injection_threshold: value,
            ..Default::default()
        };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("deadCodeInjectionThreshold"));
    }

    #[test]
    fn test_zero_chunk_length_rejected() {
        let profile = TransformProfile {
            string_split_chunk_length: 0,
            ..Default::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let json = serde_json::to_value(TransformProfile::default()).unwrap();
        assert!(json.get("identifierStrategy").is_some());
        assert!(json.get("debugProtectionIntervalMs").is_some());
        assert_eq!(json["identifierStrategy"], "hexadecimal");
    }
}
