//! Resolution of pass patterns into reproducible byte streams
//!
//! Random passes draw a 32-byte seed from the OS CSPRNG and expand it with
//! `StdRng`, so the same pass can be regenerated for readback verification
//! and for a following complement pass. The seed never leaves the engine.

use rand::{rngs::OsRng, rngs::StdRng, RngCore, SeedableRng};

use super::plan::PassPattern;
use crate::error::{Error, Result};

/// A pass pattern bound to concrete bytes for one run
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum ResolvedPattern {
    Repeating(Vec<u8>),
    Random { seed: [u8; 32] },
    InvertedRandom { seed: [u8; 32] },
}

impl std::fmt::Debug for ResolvedPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedPattern::Repeating(bytes) => write!(f, "Repeating({})", hex::encode(bytes)),
            ResolvedPattern::Random { .. } => f.write_str("Random"),
            ResolvedPattern::InvertedRandom { .. } => f.write_str("InvertedRandom"),
        }
    }
}

impl ResolvedPattern {
    /// Binds `pattern`, using `previous` for complement passes
    pub(crate) fn resolve(pattern: &PassPattern, previous: Option<&ResolvedPattern>) -> Result<Self> {
        let resolved = match pattern {
            PassPattern::Zeros => ResolvedPattern::Repeating(vec![0x00]),
            PassPattern::Ones => ResolvedPattern::Repeating(vec![0xFF]),
            PassPattern::Fixed(bytes) if bytes.is_empty() => {
                return Err(Error::InvalidPlan("empty fixed pattern".into()))
            }
            PassPattern::Fixed(bytes) => ResolvedPattern::Repeating(bytes.clone()),
            PassPattern::Random => {
                let mut seed = [0u8; 32];
                OsRng.fill_bytes(&mut seed);
                ResolvedPattern::Random { seed }
            }
            PassPattern::Complement => previous
                .map(ResolvedPattern::complement)
                .ok_or_else(|| Error::InvalidPlan("complement pass has no previous pass".into()))?,
        };
        Ok(resolved)
    }

    fn complement(&self) -> Self {
        match self {
            ResolvedPattern::Repeating(bytes) => {
                ResolvedPattern::Repeating(bytes.iter().map(|b| !b).collect())
            }
            ResolvedPattern::Random { seed } => ResolvedPattern::InvertedRandom { seed: *seed },
            ResolvedPattern::InvertedRandom { seed } => ResolvedPattern::Random { seed: *seed },
        }
    }

    /// Fresh stream positioned at offset zero
    pub(crate) fn stream(&self) -> PatternStream {
        match self {
            ResolvedPattern::Repeating(bytes) => PatternStream::Repeating {
                pattern: bytes.clone(),
                position: 0,
            },
            ResolvedPattern::Random { seed } => PatternStream::Random {
                rng: StdRng::from_seed(*seed),
                invert: false,
            },
            ResolvedPattern::InvertedRandom { seed } => PatternStream::Random {
                rng: StdRng::from_seed(*seed),
                invert: true,
            },
        }
    }

    /// Short label for logs and pass outcomes
    pub(crate) fn label(&self) -> String {
        match self {
            ResolvedPattern::Repeating(bytes) => format!("fixed:{}", hex::encode(bytes)),
            ResolvedPattern::Random { .. } => "random".to_string(),
            ResolvedPattern::InvertedRandom { .. } => "complement:random".to_string(),
        }
    }
}

/// Sequential generator over a resolved pattern.
///
/// Random streams must be consumed with the same sequence of buffer
/// lengths to reproduce the same bytes.
pub(crate) enum PatternStream {
    Repeating { pattern: Vec<u8>, position: usize },
    Random { rng: StdRng, invert: bool },
}

impl PatternStream {
    pub(crate) fn fill(&mut self, buf: &mut [u8]) {
        match self {
            PatternStream::Repeating { pattern, position } => {
                let len = pattern.len();
                if len == 1 {
                    buf.fill(pattern[0]);
                } else {
                    for (i, byte) in buf.iter_mut().enumerate() {
                        *byte = pattern[(*position + i) % len];
                    }
                    *position = (*position + buf.len()) % len;
                }
            }
            PatternStream::Random { rng, invert } => {
                rng.fill_bytes(buf);
                if *invert {
                    buf.iter_mut().for_each(|b| *b = !*b);
                }
            }
        }
    }
}
