//! Generated identifier names
//!
//! Every name the engine introduces is derived from a hash of the input, so
//! the same input always produces the same output, and a second run over
//! already protected output draws from a different seed. Names that already
//! occur anywhere in the source are skipped.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use veil_core::IdentifierStrategy;

/// Generator every stage draws from
pub type SeededRng = StdRng;

/// Seed from the SHA-256 of `source` mixed with a stage tag
pub fn seeded_rng(source: &str, tag: &str) -> SeededRng {
    let digest = Sha256::new()
        .chain_update(tag.as_bytes())
        .chain_update([0u8])
        .chain_update(source.as_bytes())
        .finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

const MANGLE_ALPHABET: &[u8] = b"$_lI1O0";

/// Hands out fresh identifiers in the configured style
pub struct NameGenerator<'a> {
    strategy: IdentifierStrategy,
    source: &'a str,
    rng: SeededRng,
    issued: HashSet<String>,
}

impl<'a> NameGenerator<'a> {
    /// Names that must not collide with anything in `source`
    pub fn new(strategy: IdentifierStrategy, source: &'a str, rng: SeededRng) -> Self {
        Self {
            strategy,
            source,
            rng,
            issued: HashSet::new(),
        }
    }

    /// A new identifier; `role` only shows up in plain names
    pub fn fresh(&mut self, role: &str) -> String {
        loop {
            let candidate = match self.strategy {
                IdentifierStrategy::Plain => {
                    format!("__veil_{role}_{:04x}", self.rng.gen_range(0..0x1_0000u32))
                }
                IdentifierStrategy::Hexadecimal => {
                    format!("_0x{:06x}", self.rng.gen_range(0..0x100_0000u32))
                }
                IdentifierStrategy::Mangled => {
                    let len = self.rng.gen_range(4..7);
                    let mut name = String::from("$");
                    for _ in 0..len {
                        let c = MANGLE_ALPHABET[self.rng.gen_range(0..MANGLE_ALPHABET.len())];
                        name.push(c as char);
                    }
                    name
                }
            };
            if !self.source.contains(&candidate) && self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Access to the underlying generator
    pub fn rng(&mut self) -> &mut SeededRng {
        &mut self.rng
    }
}
