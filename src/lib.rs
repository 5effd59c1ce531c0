//! rattlescan: forensic file analysis and verified secure wiping
//!
//! Two independent operations share one file-access substrate:
//!
//! * [`AnalysisPipeline`] reads a file once and produces an
//!   [`AnalysisReport`] with digests, Shannon entropy, a signature-based
//!   type detection and extracted metadata.
//! * [`SecureWipeEngine`] overwrites a file in place following a
//!   [`WipePlan`], verifies passes by readback and only then removes the
//!   directory entry.

pub mod analyzer;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod hash;
pub mod io;
pub mod metadata;
pub mod utils;

pub use analyzer::{
    AnalysisPipeline, AnalysisReport, EntropyClass, EntropySummary, FileKind, ReportWarning,
    TypeClassifier, TypeDetection,
};
pub use cleaner::{
    Disposition, PassPattern, PassSpec, SecureWipeEngine, VerificationOutcome, WipePlan,
    WipeProgress, WipeResult, WipeState, WriteInterceptor,
};
pub use config::{AnalysisConfig, Settings, WipeConfig};
pub use error::{Error, ExtractionError, Phase, Result, VerificationFailure};
pub use hash::{Digest, DigestAccumulator, Digests, HashAlgorithm};
pub use metadata::{FilesystemExtractor, Metadata, MetadataExtractor, MetadataValue};
pub use utils::{init_logging, CancellationToken, LogLevel};
