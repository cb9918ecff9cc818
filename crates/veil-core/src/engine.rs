//! Transformation engine contract
//!
//! The pipeline never transforms code itself. It hands each file's content to a
//! [`TransformationEngine`] together with the active profile and either writes
//! back the returned text or records the error.

use async_trait::async_trait;

use crate::error::TransformError;
use crate::profile::TransformProfile;

/// Something that can obfuscate source text according to a profile
///
/// Implementations must not retain or mutate the input, must return the whole
/// output at once, and must accept their own output as valid input on a later
/// run.
#[async_trait]
pub trait TransformationEngine: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Enabled options in `profile` that this engine ignores
    fn unsupported_options(&self, _profile: &TransformProfile) -> Vec<&'static str> {
        Vec::new()
    }

    /// Transform one file's content
    async fn transform(
        &self,
        source: &str,
        profile: &TransformProfile,
    ) -> Result<String, TransformError>;
}

#[async_trait]
impl<E: TransformationEngine + ?Sized> TransformationEngine for std::sync::Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn unsupported_options(&self, profile: &TransformProfile) -> Vec<&'static str> {
        (**self).unsupported_options(profile)
    }

    async fn transform(
        &self,
        source: &str,
        profile: &TransformProfile,
    ) -> Result<String, TransformError> {
        (**self).transform(source, profile).await
    }
}

#[async_trait]
impl<E: TransformationEngine + ?Sized> TransformationEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn unsupported_options(&self, profile: &TransformProfile) -> Vec<&'static str> {
        (**self).unsupported_options(profile)
    }

    async fn transform(
        &self,
        source: &str,
        profile: &TransformProfile,
    ) -> Result<String, TransformError> {
        (**self).transform(source, profile).await
    }
}
