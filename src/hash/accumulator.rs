//! Multi-algorithm digest accumulator
//!
//! Every configured algorithm keeps its own independent state. One
//! `update` call feeds the same chunk to all of them, so the file is read
//! once no matter how many digests are requested.

use std::{collections::BTreeMap, fmt};

use blake3::Hasher as Blake3;
use md5::Context as Md5;
use rayon::prelude::*;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use sha1::Sha1;
use sha2::{Digest as ShaDigest, Sha256, Sha512};
use tracing::debug;

use crate::error::{Error, Result};

/// Chunks at least this large update the algorithm states in parallel
const PARALLEL_UPDATE_THRESHOLD: usize = 256 * 1024;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

/// Whether a digest family may back security claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestStrength {
    /// Known collision attacks; identification and compatibility only
    Legacy,
    Current,
}

impl HashAlgorithm {
    /// MD5 + SHA-1 for identification, SHA-256 for integrity
    pub const DEFAULT_SET: [HashAlgorithm; 3] =
        [HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256];

    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }

    /// Digest length in bytes
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 | HashAlgorithm::Blake3 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn strength(&self) -> DigestStrength {
        match self {
            HashAlgorithm::Md5 | HashAlgorithm::Sha1 => DigestStrength::Legacy,
            _ => DigestStrength::Current,
        }
    }

    /// Parses a user-supplied name such as `sha256`, `SHA-256` or `blake3`
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "md5" => Some(HashAlgorithm::Md5),
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One finished digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub algorithm: HashAlgorithm,
    pub strength: DigestStrength,
    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
}

impl Digest {
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Finished digests keyed by algorithm, in a stable order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digests(BTreeMap<HashAlgorithm, Digest>);

impl Digests {
    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&Digest> {
        self.0.get(&algorithm)
    }

    pub fn hex(&self, algorithm: HashAlgorithm) -> Option<String> {
        self.get(algorithm).map(Digest::hex)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Digest> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Digests {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for digest in self.0.values() {
            map.serialize_entry(digest.algorithm.name(), digest)?;
        }
        map.end()
    }
}

enum HasherState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<Blake3>),
}

impl HasherState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => HasherState::Blake3(Box::new(Blake3::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            HasherState::Md5(h) => h.consume(chunk),
            HasherState::Sha1(h) => h.update(chunk),
            HasherState::Sha256(h) => h.update(chunk),
            HasherState::Sha512(h) => h.update(chunk),
            HasherState::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    fn finish(self) -> Vec<u8> {
        match self {
            HasherState::Md5(h) => h.compute().0.to_vec(),
            HasherState::Sha1(h) => h.finalize().to_vec(),
            HasherState::Sha256(h) => h.finalize().to_vec(),
            HasherState::Sha512(h) => h.finalize().to_vec(),
            HasherState::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

/// Fan-out accumulator over several digest algorithms
pub struct DigestAccumulator {
    states: Vec<(HashAlgorithm, HasherState)>,
    bytes: u64,
    finalized: bool,
}

impl fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field(
                "algorithms",
                &self.states.iter().map(|(a, _)| *a).collect::<Vec<_>>(),
            )
            .field("bytes", &self.bytes)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl DigestAccumulator {
    /// Creates an accumulator; duplicate algorithms are collapsed
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        let mut unique: Vec<HashAlgorithm> = algorithms.to_vec();
        unique.sort();
        unique.dedup();

        Self {
            states: unique
                .into_iter()
                .map(|a| (a, HasherState::new(a)))
                .collect(),
            bytes: 0,
            finalized: false,
        }
    }

    pub fn algorithms(&self) -> Vec<HashAlgorithm> {
        self.states.iter().map(|(a, _)| *a).collect()
    }

    /// Feeds `chunk` to every algorithm
    pub fn update(&mut self, chunk: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::InvalidState(
                "digest accumulator updated after finalize".into(),
            ));
        }

        if chunk.len() >= PARALLEL_UPDATE_THRESHOLD && self.states.len() > 1 {
            self.states
                .par_iter_mut()
                .for_each(|(_, state)| state.update(chunk));
        } else {
            for (_, state) in &mut self.states {
                state.update(chunk);
            }
        }

        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Bytes fed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes
    }

    /// Produces all digests. May be called once.
    pub fn finalize(&mut self) -> Result<Digests> {
        if self.finalized {
            return Err(Error::InvalidState(
                "digest accumulator finalized twice".into(),
            ));
        }
        self.finalized = true;

        let digests = std::mem::take(&mut self.states)
            .into_iter()
            .map(|(algorithm, state)| {
                let digest = Digest {
                    algorithm,
                    strength: algorithm.strength(),
                    bytes: state.finish(),
                };
                (algorithm, digest)
            })
            .collect::<BTreeMap<_, _>>();

        debug!(bytes = self.bytes, count = digests.len(), "digests finalized");
        Ok(Digests(digests))
    }
}
