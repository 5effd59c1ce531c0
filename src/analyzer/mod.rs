//! Streaming file analysis: digests, entropy, type signatures and metadata

pub mod entropy;
pub mod pipeline;
pub mod report;
pub mod signatures;

pub use entropy::{
    BlockEntropyProfile, EntropyAccumulator, EntropyClass, EntropySummary, HIGH_ENTROPY_THRESHOLD,
    LOW_ENTROPY_THRESHOLD,
};
pub use pipeline::AnalysisPipeline;
pub use report::{AnalysisReport, ExtractionWarning, ReportWarning};
pub use signatures::{
    FileKind, Signature, Trailer, TrailerCheck, TypeClassifier, TypeDetection, MISMATCH_CONFIDENCE,
};
