//! Hashing subsystem: parallel digest states fed from one byte stream

pub mod accumulator;

pub use accumulator::{Digest, DigestAccumulator, DigestStrength, Digests, HashAlgorithm};
