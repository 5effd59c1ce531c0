//! Analysis report produced by one pipeline run

use std::{fmt::Write as _, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    analyzer::{entropy::EntropySummary, signatures::{FileKind, TypeDetection}},
    hash::Digests,
    metadata::Metadata,
    utils::human_readable_size,
};

const RULE_WIDTH: usize = 70;

/// Non-fatal metadata extractor failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionWarning {
    pub extractor: String,
    pub message: String,
}

/// Annotations attached to a report instead of failing the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportWarning {
    Extraction(ExtractionWarning),
    ExtensionMismatch { declared: String, detected: FileKind },
    NoExtension { detected: FileKind },
    TrailerMissing { detected: FileKind },
    SizeChanged { declared: u64, processed: u64 },
}

impl ReportWarning {
    pub fn message(&self) -> String {
        match self {
            ReportWarning::Extraction(w) => {
                format!("metadata extractor '{}' failed: {}", w.extractor, w.message)
            }
            ReportWarning::ExtensionMismatch { declared, detected } => {
                format!("file is {} but has .{} extension", detected.mime(), declared)
            }
            ReportWarning::NoExtension { detected } => {
                format!("file is {} but has no extension", detected.mime())
            }
            ReportWarning::TrailerMissing { detected } => {
                format!("{} trailer not found; file may be truncated or padded", detected)
            }
            ReportWarning::SizeChanged { declared, processed } => format!(
                "file size changed during analysis ({} bytes at open, {} bytes read)",
                declared, processed
            ),
        }
    }
}

/// Immutable result of one analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub path: PathBuf,
    pub analyzed_at: DateTime<Utc>,
    /// Size observed when the file was opened
    pub declared_size: u64,
    /// Bytes fed to every accumulator
    pub bytes_processed: u64,
    pub digests: Digests,
    pub entropy: EntropySummary,
    pub file_type: TypeDetection,
    pub declared_extension: Option<String>,
    pub type_mismatch: bool,
    pub metadata: Metadata,
    pub warnings: Vec<ReportWarning>,
}

impl AnalysisReport {
    pub fn extraction_warnings(&self) -> impl Iterator<Item = &ExtractionWarning> {
        self.warnings.iter().filter_map(|w| match w {
            ReportWarning::Extraction(e) => Some(e),
            _ => None,
        })
    }

    pub fn is_empty_file(&self) -> bool {
        self.bytes_processed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable rendering grouped into titled sections
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(RULE_WIDTH);
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());

        let _ = writeln!(out, "{rule}\n  FORENSIC FILE ANALYSIS\n  File: {name}");
        let _ = writeln!(
            out,
            "  Analysis Time: {}\n{rule}\n",
            self.analyzed_at.format("%Y-%m-%d %H:%M:%S")
        );

        let mut rows = vec![
            ("Detected Type".to_string(), self.file_type.description.clone()),
            ("MIME Type".to_string(), self.file_type.mime.clone()),
            (
                "Confidence".to_string(),
                format!("{:.0}%", self.file_type.confidence * 100.0),
            ),
            (
                "Declared Extension".to_string(),
                self.declared_extension
                    .as_deref()
                    .map(|e| format!(".{e}"))
                    .unwrap_or_else(|| "(none)".into()),
            ),
        ];
        if self.type_mismatch {
            rows.push(("Type Mismatch".into(), "YES".into()));
        }
        section(&mut out, "File Type Identification", &rows);

        let rows: Vec<_> = self
            .digests
            .iter()
            .map(|d| (d.algorithm.name().to_string(), d.hex()))
            .collect();
        section(&mut out, "Cryptographic Hashes", &rows);

        let mut rows = vec![
            (
                "Shannon Entropy".to_string(),
                format!("{:.4} bits/byte", self.entropy.bits_per_byte),
            ),
            ("Assessment".to_string(), self.entropy.class.describe().to_string()),
            (
                "Bytes Analyzed".to_string(),
                human_readable_size(self.bytes_processed),
            ),
            (
                "Distinct Byte Values".to_string(),
                self.entropy.distinct_values.to_string(),
            ),
        ];
        if let Some(blocks) = &self.entropy.blocks {
            rows.push((
                "Block Entropy".to_string(),
                format!(
                    "min {:.2} / mean {:.2} / max {:.2} over {} blocks",
                    blocks.min, blocks.mean, blocks.max, blocks.blocks
                ),
            ));
        }
        section(&mut out, "Entropy Analysis", &rows);

        if !self.metadata.is_empty() {
            let rows: Vec<_> = self
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect();
            section(&mut out, "Metadata", &rows);
        }

        if !self.warnings.is_empty() {
            let rows: Vec<_> = self
                .warnings
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("[{}]", i + 1), w.message()))
                .collect();
            section(&mut out, "Warnings", &rows);
        }

        out.push_str(&rule);
        out.push('\n');
        out
    }
}

fn section(out: &mut String, title: &str, rows: &[(String, String)]) {
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{rule}\n  {}\n{rule}", title.to_uppercase());
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        let _ = writeln!(out, "{key:<width$} : {value}");
    }
    out.push('\n');
}
