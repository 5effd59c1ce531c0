//! Single-pass analysis pipeline
//!
//! Opens the file once, streams it chunk by chunk into the digest and
//! entropy accumulators while capturing the leading window for type
//! detection, optionally re-reads a short tail to confirm a trailer, then
//! hands the path to the registered metadata extractors.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::{
    analyzer::{
        entropy::EntropyAccumulator,
        report::{AnalysisReport, ExtractionWarning, ReportWarning},
        signatures::{TrailerCheck, TypeClassifier, TypeDetection},
    },
    config::AnalysisConfig,
    error::{Error, Phase, Result},
    hash::DigestAccumulator,
    io::{ByteStreamReader, FileHandle},
    metadata::{Metadata, MetadataExtractor},
    utils::CancellationToken,
};

/// Orchestrates one read-only scan per call
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    classifier: TypeClassifier,
    extractors: Vec<Arc<dyn MetadataExtractor>>,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("config", &self.config)
            .field(
                "extractors",
                &self.extractors.iter().map(|e| e.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AnalysisPipeline {
    /// Pipeline with the built-in signature table and no extractors
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let classifier = TypeClassifier::with_default_signatures(config.leading_window)?;
        Ok(Self {
            config,
            classifier,
            extractors: Vec::new(),
        })
    }

    pub fn with_classifier(mut self, classifier: TypeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Registers an extractor; extractors run in registration order and
    /// later keys overwrite earlier ones
    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn classifier(&self) -> &TypeClassifier {
        &self.classifier
    }

    /// Analyzes `path`, taking the declared type from its extension
    pub fn analyze(&self, path: &Path) -> Result<AnalysisReport> {
        self.analyze_declared(path, None, &CancellationToken::new())
    }

    /// Analyzes `path`. `declared` overrides the extension taken from the
    /// file name. Cancellation is checked before every chunk.
    #[instrument(skip(self, cancel), fields(path = %path.display()))]
    pub fn analyze_declared(
        &self,
        path: &Path,
        declared: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport> {
        info!("starting analysis");

        let handle = FileHandle::open_read(path)?;
        let declared_size = handle.declared_size();
        let mut reader = ByteStreamReader::new(handle, self.config.chunk_size)?;

        let mut digests = DigestAccumulator::new(&self.config.algorithms);
        let mut entropy = match self.config.entropy_block_size {
            Some(block) => EntropyAccumulator::with_block_size(block),
            None => EntropyAccumulator::new(),
        };

        let window = self.classifier.leading_window();
        let mut leading = Vec::with_capacity(window);

        loop {
            if cancel.is_cancelled() {
                warn!(offset = reader.bytes_consumed(), "analysis cancelled");
                return Err(Error::Cancelled {
                    phase: Phase::Read,
                    offset: reader.bytes_consumed(),
                });
            }

            let Some(chunk) = reader.next_chunk()? else {
                break;
            };

            if leading.len() < window {
                let take = (window - leading.len()).min(chunk.len());
                leading.extend_from_slice(&chunk[..take]);
            }

            self.fan_out(&mut digests, &mut entropy, chunk)?;
        }

        let bytes_processed = reader.bytes_consumed();
        if digests.bytes_processed() != bytes_processed || entropy.bytes_processed() != bytes_processed {
            return Err(Error::InvalidState(format!(
                "accumulators diverged: read {}, digested {}, entropy {}",
                bytes_processed,
                digests.bytes_processed(),
                entropy.bytes_processed()
            )));
        }

        let mut warnings = Vec::new();
        let detection = self.detect_type(&mut reader, &leading, &mut warnings)?;

        // Extractors open the file themselves; release ours first
        drop(reader);

        let declared_extension = match declared {
            Some(ext) => Some(ext.trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty()),
            None => extension_of(path),
        };

        let type_mismatch = self
            .classifier
            .is_mismatch(&detection, declared_extension.as_deref());
        match &declared_extension {
            Some(ext) if type_mismatch => warnings.push(ReportWarning::ExtensionMismatch {
                declared: ext.clone(),
                detected: detection.kind,
            }),
            None if detection.is_confident() => warnings.push(ReportWarning::NoExtension {
                detected: detection.kind,
            }),
            _ => {}
        }

        if bytes_processed != declared_size {
            warnings.push(ReportWarning::SizeChanged {
                declared: declared_size,
                processed: bytes_processed,
            });
        }

        let metadata = self.extract_metadata(path, &detection, &mut warnings);

        let report = AnalysisReport {
            path: path.to_path_buf(),
            analyzed_at: Utc::now(),
            declared_size,
            bytes_processed,
            digests: digests.finalize()?,
            entropy: entropy.finalize()?,
            file_type: detection,
            declared_extension,
            type_mismatch,
            metadata,
            warnings,
        };

        info!(
            bytes = report.bytes_processed,
            kind = %report.file_type.kind,
            entropy = report.entropy.bits_per_byte,
            warnings = report.warnings.len(),
            "analysis complete"
        );
        Ok(report)
    }

    /// Runs the analysis on tokio's blocking pool
    pub async fn analyze_async(
        self: Arc<Self>,
        path: PathBuf,
        cancel: CancellationToken,
    ) -> Result<AnalysisReport> {
        tokio::task::spawn_blocking(move || self.analyze_declared(&path, None, &cancel))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Feeds one chunk to both accumulators; both finish before returning
    fn fan_out(
        &self,
        digests: &mut DigestAccumulator,
        entropy: &mut EntropyAccumulator,
        chunk: &[u8],
    ) -> Result<()> {
        if self.config.parallel_fanout {
            let (digested, counted) = rayon::join(|| digests.update(chunk), || entropy.update(chunk));
            digested?;
            counted
        } else {
            digests.update(chunk)?;
            entropy.update(chunk)
        }
    }

    fn detect_type(
        &self,
        reader: &mut ByteStreamReader,
        leading: &[u8],
        warnings: &mut Vec<ReportWarning>,
    ) -> Result<TypeDetection> {
        let mut detection = self.classifier.classify(leading);

        if !self.config.confirm_trailers {
            return Ok(detection);
        }

        // Only signatures that declare a trailer pay for the extra read
        if let Some(search_window) = self.classifier.trailer_for(&detection).map(|t| t.search_window) {
            let tail = reader.read_tail(search_window)?;
            self.classifier.confirm_trailer(&mut detection, &tail);
            debug!(trailer = ?detection.trailer, "trailer check");

            if detection.trailer == TrailerCheck::Missing {
                warnings.push(ReportWarning::TrailerMissing {
                    detected: detection.kind,
                });
            }
        }

        Ok(detection)
    }

    fn extract_metadata(
        &self,
        path: &Path,
        detection: &TypeDetection,
        warnings: &mut Vec<ReportWarning>,
    ) -> Metadata {
        let mut merged = Metadata::new();

        for extractor in self.extractors.iter().filter(|e| e.supports(detection.kind)) {
            match extractor.extract(path, detection.kind) {
                Ok(values) => {
                    debug!(extractor = extractor.name(), keys = values.len(), "metadata extracted");
                    merged.extend(values);
                }
                Err(e) => {
                    warn!(extractor = extractor.name(), error = %e, "metadata extraction failed");
                    warnings.push(ReportWarning::Extraction(ExtractionWarning {
                        extractor: extractor.name().to_string(),
                        message: e.to_string(),
                    }));
                }
            }
        }

        merged
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyzer::signatures::FileKind, error::ExtractionError, metadata::MetadataValue};
    use std::io::Write;
    use tempfile::Builder;

    struct Failing;

    impl MetadataExtractor for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn extract(&self, _: &Path, _: FileKind) -> std::result::Result<Metadata, ExtractionError> {
            Err(ExtractionError::Failed("corrupt structure".into()))
        }
    }

    struct PdfOnly;

    impl MetadataExtractor for PdfOnly {
        fn name(&self) -> &str {
            "pdf-only"
        }

        fn supports(&self, kind: FileKind) -> bool {
            kind == FileKind::Pdf
        }

        fn extract(&self, _: &Path, _: FileKind) -> std::result::Result<Metadata, ExtractionError> {
            let mut m = Metadata::new();
            m.insert("pdf.pages".into(), MetadataValue::Integer(1));
            Ok(m)
        }
    }

    fn file_with(suffix: &str, data: &[u8]) -> tempfile::NamedTempFile {
        let mut temp = Builder::new().suffix(suffix).tempfile().unwrap();
        temp.write_all(data).unwrap();
        temp.flush().unwrap();
        temp
    }

    fn small_config() -> AnalysisConfig {
        AnalysisConfig {
            chunk_size: 512,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_extractor_failure_becomes_warning() {
        let temp = file_with(".pdf", b"%PDF-1.4\n%%EOF\n");
        let pipeline = AnalysisPipeline::new(small_config())
            .unwrap()
            .with_extractor(Arc::new(Failing))
            .with_extractor(Arc::new(PdfOnly));

        let report = pipeline.analyze(temp.path()).unwrap();
        assert_eq!(report.extraction_warnings().count(), 1);
        assert_eq!(report.metadata["pdf.pages"], MetadataValue::Integer(1));
        assert_eq!(report.file_type.trailer, TrailerCheck::Confirmed);
    }

    #[test]
    fn test_unsupported_extractor_is_skipped() {
        let temp = file_with(".bin", &[0u8; 100]);
        let pipeline = AnalysisPipeline::new(small_config())
            .unwrap()
            .with_extractor(Arc::new(PdfOnly));

        let report = pipeline.analyze(temp.path()).unwrap();
        assert!(report.metadata.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_leading_window_spans_small_chunks() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(b"ftypM4A ");
        data.extend_from_slice(&[0u8; 2000]);
        let temp = file_with(".m4a", &data);

        let report = AnalysisPipeline::new(small_config())
            .unwrap()
            .analyze(temp.path())
            .unwrap();
        assert_eq!(report.file_type.kind, FileKind::M4a);
        assert!(!report.type_mismatch);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let temp = file_with(".dat", &data);

        let parallel = AnalysisPipeline::new(small_config()).unwrap();
        let sequential = AnalysisPipeline::new(AnalysisConfig {
            parallel_fanout: false,
            ..small_config()
        })
        .unwrap();

        let a = parallel.analyze(temp.path()).unwrap();
        let b = sequential.analyze(temp.path()).unwrap();
        assert_eq!(a.digests, b.digests);
        assert_eq!(a.entropy, b.entropy);
    }

    #[test]
    fn test_cancelled_before_start() {
        let temp = file_with(".txt", b"hello");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = AnalysisPipeline::new(small_config())
            .unwrap()
            .analyze_declared(temp.path(), None, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { phase: Phase::Read, offset: 0 }));
    }

    #[test]
    fn test_declared_override() {
        let temp = file_with(".pdf", b"%PDF-1.7\n%%EOF");
        let report = AnalysisPipeline::new(small_config())
            .unwrap()
            .analyze_declared(temp.path(), Some(".JPG"), &CancellationToken::new())
            .unwrap();
        assert_eq!(report.declared_extension.as_deref(), Some("jpg"));
        assert!(report.type_mismatch);
    }

    #[test]
    fn test_empty_declared_extension_means_none() {
        let temp = file_with(".pdf", b"%PDF-1.7\n%%EOF");
        let report = AnalysisPipeline::new(small_config())
            .unwrap()
            .analyze_declared(temp.path(), Some("."), &CancellationToken::new())
            .unwrap();
        assert_eq!(report.declared_extension, None);
        assert!(!report.type_mismatch);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, ReportWarning::NoExtension { detected: FileKind::Pdf })));
    }
}
