//! Shannon entropy over a byte stream

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Entropy at or above this value is flagged as compressed or encrypted
pub const HIGH_ENTROPY_THRESHOLD: f64 = 7.5;
/// Entropy below this value suggests plain text or repetitive data
pub const LOW_ENTROPY_THRESHOLD: f64 = 4.0;

/// Coarse interpretation of an entropy value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntropyClass {
    /// No bytes were seen
    Empty,
    Low,
    Medium,
    High,
}

impl EntropyClass {
    pub fn classify(entropy: f64, total_bytes: u64) -> Self {
        if total_bytes == 0 {
            EntropyClass::Empty
        } else if entropy >= HIGH_ENTROPY_THRESHOLD {
            EntropyClass::High
        } else if entropy < LOW_ENTROPY_THRESHOLD {
            EntropyClass::Low
        } else {
            EntropyClass::Medium
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            EntropyClass::Empty => "trivial (empty input)",
            EntropyClass::Low => "low entropy - likely plain text or repetitive data",
            EntropyClass::Medium => "medium entropy - typical binary data",
            EntropyClass::High => "high entropy - possibly encrypted or compressed",
        }
    }
}

/// Entropy statistics over fixed-size blocks of the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntropyProfile {
    pub block_size: usize,
    pub blocks: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Blocks at or above `HIGH_ENTROPY_THRESHOLD`
    pub high_entropy_blocks: u64,
}

/// Final entropy figures for one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropySummary {
    /// Bits per byte, in [0, 8]
    pub bits_per_byte: f64,
    pub total_bytes: u64,
    /// Number of distinct byte values observed
    pub distinct_values: u16,
    /// Set for empty input; entropy is then defined as 0.0
    pub trivial: bool,
    pub high_entropy: bool,
    pub class: EntropyClass,
    pub blocks: Option<BlockEntropyProfile>,
}

/// H = -sum(p_i * log2 p_i) with zero-count bins skipped
pub fn shannon_entropy(counts: &[u64; 256], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let len = total as f64;
    let mut entropy = 0.0f64;
    for &count in counts.iter().filter(|&&c| c > 0) {
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    entropy.clamp(0.0, 8.0)
}

#[derive(Debug)]
struct BlockTracker {
    block_size: usize,
    counts: [u64; 256],
    filled: usize,
    blocks: u64,
    min: f64,
    max: f64,
    sum: f64,
    high: u64,
}

impl BlockTracker {
    fn new(block_size: usize) -> Self {
        Self {
            block_size,
            counts: [0; 256],
            filled: 0,
            blocks: 0,
            min: f64::MAX,
            max: 0.0,
            sum: 0.0,
            high: 0,
        }
    }

    fn update(&mut self, mut chunk: &[u8]) {
        while !chunk.is_empty() {
            let take = (self.block_size - self.filled).min(chunk.len());
            for &byte in &chunk[..take] {
                self.counts[byte as usize] += 1;
            }
            self.filled += take;
            chunk = &chunk[take..];

            if self.filled == self.block_size {
                self.close_block();
            }
        }
    }

    fn close_block(&mut self) {
        let entropy = shannon_entropy(&self.counts, self.filled as u64);
        self.blocks += 1;
        self.min = self.min.min(entropy);
        self.max = self.max.max(entropy);
        self.sum += entropy;
        if entropy >= HIGH_ENTROPY_THRESHOLD {
            self.high += 1;
        }
        self.counts = [0; 256];
        self.filled = 0;
    }

    fn finish(mut self) -> Option<BlockEntropyProfile> {
        // The trailing partial block counts as a block of its own
        if self.filled > 0 {
            self.close_block();
        }
        if self.blocks == 0 {
            return None;
        }
        Some(BlockEntropyProfile {
            block_size: self.block_size,
            blocks: self.blocks,
            min: self.min,
            max: self.max,
            mean: self.sum / self.blocks as f64,
            high_entropy_blocks: self.high,
        })
    }
}

/// 256-bin histogram accumulator
#[derive(Debug)]
pub struct EntropyAccumulator {
    counts: [u64; 256],
    total: u64,
    blocks: Option<BlockTracker>,
    finalized: bool,
}

impl EntropyAccumulator {
    pub fn new() -> Self {
        Self {
            counts: [0; 256],
            total: 0,
            blocks: None,
            finalized: false,
        }
    }

    /// Also tracks per-block entropy over blocks of `block_size` bytes
    pub fn with_block_size(block_size: usize) -> Self {
        let mut acc = Self::new();
        if block_size > 0 {
            acc.blocks = Some(BlockTracker::new(block_size));
        }
        acc
    }

    pub fn update(&mut self, chunk: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::InvalidState(
                "entropy accumulator updated after finalize".into(),
            ));
        }

        for &byte in chunk {
            self.counts[byte as usize] += 1;
        }
        self.total += chunk.len() as u64;

        if let Some(blocks) = self.blocks.as_mut() {
            blocks.update(chunk);
        }
        Ok(())
    }

    pub fn bytes_processed(&self) -> u64 {
        self.total
    }

    pub fn finalize(&mut self) -> Result<EntropySummary> {
        if self.finalized {
            return Err(Error::InvalidState(
                "entropy accumulator finalized twice".into(),
            ));
        }
        self.finalized = true;

        let bits_per_byte = shannon_entropy(&self.counts, self.total);
        let class = EntropyClass::classify(bits_per_byte, self.total);
        let distinct_values = self.counts.iter().filter(|&&c| c > 0).count() as u16;

        debug!(entropy = bits_per_byte, bytes = self.total, ?class, "entropy finalized");

        Ok(EntropySummary {
            bits_per_byte,
            total_bytes: self.total,
            distinct_values,
            trivial: self.total == 0,
            high_entropy: self.total > 0 && bits_per_byte >= HIGH_ENTROPY_THRESHOLD,
            class,
            blocks: self.blocks.take().and_then(BlockTracker::finish),
        })
    }
}

impl Default for EntropyAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    fn summarize(data: &[u8]) -> EntropySummary {
        let mut acc = EntropyAccumulator::new();
        for chunk in data.chunks(4096) {
            acc.update(chunk).unwrap();
        }
        acc.finalize().unwrap()
    }

    #[test]
    fn test_empty_is_trivial_zero() {
        let summary = summarize(b"");
        assert_eq!(summary.bits_per_byte, 0.0);
        assert!(summary.trivial);
        assert!(!summary.high_entropy);
        assert_eq!(summary.class, EntropyClass::Empty);
    }

    #[test]
    fn test_single_value_is_zero() {
        let summary = summarize(&[0x41; 10_000]);
        assert_eq!(summary.bits_per_byte, 0.0);
        assert_eq!(summary.distinct_values, 1);
        assert_eq!(summary.class, EntropyClass::Low);
    }

    #[test]
    fn test_two_values_is_one_bit() {
        let data: Vec<u8> = (0..1000).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();
        assert!((summarize(&data).bits_per_byte - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_values_once_is_eight_bits() {
        let data: Vec<u8> = (0..=255u8).collect();
        let summary = summarize(&data);
        assert!((summary.bits_per_byte - 8.0).abs() < 1e-12);
        assert!(summary.high_entropy);
    }

    #[test]
    fn test_random_megabyte_approaches_eight() {
        let mut data = vec![0u8; 1024 * 1024];
        StdRng::seed_from_u64(0x5eed).fill_bytes(&mut data);
        let summary = summarize(&data);
        assert!((summary.bits_per_byte - 8.0).abs() < 0.05);
        assert_eq!(summary.class, EntropyClass::High);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(EntropyClass::classify(7.5, 10), EntropyClass::High);
        assert_eq!(EntropyClass::classify(7.49, 10), EntropyClass::Medium);
        assert_eq!(EntropyClass::classify(3.99, 10), EntropyClass::Low);
    }

    #[test]
    fn test_block_profile_spans_chunk_boundaries() {
        let mut random = vec![0u8; 1024];
        StdRng::seed_from_u64(7).fill_bytes(&mut random);
        let mut data = vec![0u8; 1024];
        data.extend_from_slice(&random);

        let mut acc = EntropyAccumulator::with_block_size(1024);
        for chunk in data.chunks(300) {
            acc.update(chunk).unwrap();
        }
        let profile = acc.finalize().unwrap().blocks.unwrap();

        assert_eq!(profile.blocks, 2);
        assert_eq!(profile.min, 0.0);
        assert!(profile.max > 7.5);
        assert_eq!(profile.high_entropy_blocks, 1);
    }

    #[test]
    fn test_update_after_finalize_is_invalid() {
        let mut acc = EntropyAccumulator::new();
        acc.finalize().unwrap();
        assert!(matches!(acc.update(b"x"), Err(Error::InvalidState(_))));
    }
}
