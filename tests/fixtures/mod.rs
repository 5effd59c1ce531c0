//! Sample payloads and temp-file helpers shared by the integration tests

#![allow(dead_code)]

use std::{fs, path::PathBuf};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use tempfile::TempDir;

pub struct TestFixtures;

impl TestFixtures {
    pub fn minimal_pdf() -> Vec<u8> {
        b"%PDF-1.4
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj
2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj
3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>
endobj
trailer
<< /Size 4 /Root 1 0 R >>
startxref
189
%%EOF
"
        .to_vec()
    }

    /// PDF header with the trailer cut off
    pub fn truncated_pdf() -> Vec<u8> {
        let mut pdf = Self::minimal_pdf();
        pdf.truncate(60);
        pdf
    }

    pub fn minimal_png() -> Vec<u8> {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(b"\x00\x00\x00\x0dIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00\x1f\x15\xc4\x89");
        png.extend_from_slice(b"\x00\x00\x00\x00IEND\xae\x42\x60\x82");
        png
    }

    /// Low-entropy text made of three symbols
    pub fn repetitive_text(len: usize) -> Vec<u8> {
        b"aaaa bbbb "
            .iter()
            .copied()
            .cycle()
            .take(len)
            .collect()
    }

    /// Deterministic high-entropy bytes
    pub fn random(len: usize, seed: u64) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut data);
        data
    }
}

/// Writes `data` to `name` inside a fresh temp directory
pub fn write_temp(name: &str, data: &[u8]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    fs::write(&path, data).expect("write fixture");
    (dir, path)
}
