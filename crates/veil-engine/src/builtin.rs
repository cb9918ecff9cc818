//! The built-in JavaScript engine
//!
//! Runs the enabled stages in a fixed order, then inserts the collected
//! prelude (guards, string pool, decoys) after any hashbang and directive
//! prologue so `"use strict"` keeps applying to the whole file.

use async_trait::async_trait;
use tracing::debug;
use veil_core::{IdentifierStrategy, TransformError, TransformProfile, TransformationEngine};

use crate::error::Result;
use crate::lexer::{SegmentKind, is_ident_char, tokenize};
use crate::names::{NameGenerator, seeded_rng};
use crate::stages::{
    Compact, DeadCode, PropertyAccess, RuntimeGuards, Stage, StageContext, StringPool,
    StringSplit,
};

/// Engine name reported in diagnostics
pub const BUILTIN_ENGINE_NAME: &str = "builtin";

/// Reported when a non-plain `identifierStrategy` asks for source names to be rewritten
const IDENTIFIER_RENAMING: &str = "identifierStrategy (renaming source identifiers)";

/// In-process engine covering every option except control flow flattening
/// and identifier renaming
///
/// `identifierStrategy` only shapes the names of the helpers this engine
/// adds; identifiers already in the source keep their names.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngine;

impl BuiltinEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }

    /// Transform `source` synchronously
    pub fn protect(&self, source: &str, profile: &TransformProfile) -> Result<String> {
        // Reject malformed input before any stage runs
        tokenize(source)?;

        let stages: [&dyn Stage; 6] = [
            &PropertyAccess,
            &StringSplit,
            &StringPool,
            &DeadCode,
            &Compact,
            &RuntimeGuards,
        ];

        let names = NameGenerator::new(
            profile.identifier_strategy,
            source,
            seeded_rng(source, BUILTIN_ENGINE_NAME),
        );
        let mut ctx = StageContext::new(profile, names);
        let mut text = source.to_string();
        for stage in stages.iter().filter(|s| s.enabled(profile)) {
            debug!(stage = stage.name(), bytes = text.len(), "Applying stage");
            text = stage.apply(&text, &mut ctx)?;
        }

        let prelude = ctx.take_prelude();
        if prelude.is_empty() {
            return Ok(text);
        }
        let separator = if profile.compact { "" } else { "\n" };
        let prelude = prelude.join(separator);

        let prologue = prologue_end(&text)?;
        let (head, tail) = text.split_at(prologue.end);
        // A directive closed only by a line break would otherwise be
        // called by a prelude that starts with `(`
        let terminator = if prologue.unterminated { ";" } else { "" };
        let output = if head.is_empty() {
            format!("{prelude}{separator}{tail}")
        } else {
            format!("{head}{terminator}\n{prelude}{separator}{tail}")
        };

        // The result must stay valid input for a later run
        tokenize(&output)?;
        Ok(output)
    }
}

#[async_trait]
impl TransformationEngine for BuiltinEngine {
    fn name(&self) -> &str {
        BUILTIN_ENGINE_NAME
    }

    fn unsupported_options(&self, profile: &TransformProfile) -> Vec<&'static str> {
        let mut unsupported = Vec::new();
        if profile.control_flow_flattening {
            unsupported.push("controlFlowFlattening");
        }
        if profile.rename_globals {
            unsupported.push("renameGlobals");
        }
        if profile.identifier_strategy != IdentifierStrategy::Plain {
            unsupported.push(IDENTIFIER_RENAMING);
        }
        unsupported
    }

    async fn transform(
        &self,
        source: &str,
        profile: &TransformProfile,
    ) -> std::result::Result<String, TransformError> {
        let engine = *self;
        let source = source.to_owned();
        let profile = profile.clone();
        tokio::task::spawn_blocking(move || engine.protect(&source, &profile))
            .await
            .map_err(|e| TransformError::new(BUILTIN_ENGINE_NAME, format!("engine task failed: {e}")))?
            .map_err(|e| TransformError::new(BUILTIN_ENGINE_NAME, e.to_string()))
    }
}

/// Extent of a leading hashbang and directive prologue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Prologue {
    /// Byte offset just past the prologue
    end: usize,
    /// The last directive has no `;` of its own
    unterminated: bool,
}

/// Locate the hashbang and directive prologue
///
/// Directives count only when they are clearly terminated, by `;` or by a
/// line break followed by the start of a new statement.
fn prologue_end(src: &str) -> Result<Prologue> {
    let segments = tokenize(src)?;
    let mut end = 0;
    let mut unterminated = false;
    let mut offset = 0;
    let mut idx = 0;

    while let Some(seg) = segments.get(idx) {
        let seg_end = offset + seg.text.len();
        match seg.kind {
            SegmentKind::LineComment if idx == 0 && seg.text.starts_with("#!") => end = seg_end,
            SegmentKind::LineComment | SegmentKind::BlockComment => {}
            SegmentKind::Code if seg.text.trim().is_empty() => {}
            SegmentKind::Str => {
                let Some(next) = segments.get(idx + 1) else {
                    return Ok(Prologue {
                        end: seg_end,
                        unterminated: true,
                    });
                };
                if next.kind != SegmentKind::Code {
                    break;
                }
                let rest = next.text.trim_start();
                let gap = next.text.len() - rest.len();
                if let Some(after) = rest.strip_prefix(';') {
                    end = seg_end + gap + 1;
                    unterminated = false;
                    if !after.trim().is_empty() {
                        break;
                    }
                } else if rest.is_empty() {
                    end = seg_end;
                    unterminated = true;
                } else if next.text[..gap].contains('\n')
                    && rest.chars().next().is_some_and(is_ident_char)
                {
                    end = seg_end;
                    unterminated = true;
                    break;
                } else {
                    break;
                }
                offset = seg_end + next.text.len();
                idx += 2;
                continue;
            }
            _ => break,
        }
        offset = seg_end;
        idx += 1;
    }
    Ok(Prologue { end, unterminated })
}
