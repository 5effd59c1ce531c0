//! Magic-byte type classification
//!
//! Signatures are evaluated top-down and the first match wins, so the
//! table order is the tie-break: more specific entries come first.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default leading window inspected for signatures
pub const DEFAULT_LEADING_WINDOW: usize = 64;
/// Minimum confidence for a detection to contradict a declared extension
pub const MISMATCH_CONFIDENCE: f64 = 0.8;
/// Confidence multiplier when a declared trailer is absent
pub const TRAILER_MISSING_PENALTY: f64 = 0.9;

/// Detected file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Unknown,
    Pdf,
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Zip,
    Gzip,
    Bzip2,
    Xz,
    #[serde(rename = "7z")]
    SevenZip,
    Rar,
    Elf,
    Pe,
    Macho,
    Wav,
    Avi,
    Mp3,
    Flac,
    Ogg,
    M4a,
    Mp4,
    Mkv,
    Sqlite,
    Wasm,
}

impl FileKind {
    pub fn name(&self) -> &'static str {
        match self {
            FileKind::Unknown => "unknown",
            FileKind::Pdf => "pdf",
            FileKind::Png => "png",
            FileKind::Jpeg => "jpeg",
            FileKind::Gif => "gif",
            FileKind::Bmp => "bmp",
            FileKind::Tiff => "tiff",
            FileKind::Webp => "webp",
            FileKind::Zip => "zip",
            FileKind::Gzip => "gzip",
            FileKind::Bzip2 => "bzip2",
            FileKind::Xz => "xz",
            FileKind::SevenZip => "7z",
            FileKind::Rar => "rar",
            FileKind::Elf => "elf",
            FileKind::Pe => "pe",
            FileKind::Macho => "macho",
            FileKind::Wav => "wav",
            FileKind::Avi => "avi",
            FileKind::Mp3 => "mp3",
            FileKind::Flac => "flac",
            FileKind::Ogg => "ogg",
            FileKind::M4a => "m4a",
            FileKind::Mp4 => "mp4",
            FileKind::Mkv => "mkv",
            FileKind::Sqlite => "sqlite",
            FileKind::Wasm => "wasm",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FileKind::Unknown => "application/octet-stream",
            FileKind::Pdf => "application/pdf",
            FileKind::Png => "image/png",
            FileKind::Jpeg => "image/jpeg",
            FileKind::Gif => "image/gif",
            FileKind::Bmp => "image/bmp",
            FileKind::Tiff => "image/tiff",
            FileKind::Webp => "image/webp",
            FileKind::Zip => "application/zip",
            FileKind::Gzip => "application/gzip",
            FileKind::Bzip2 => "application/x-bzip2",
            FileKind::Xz => "application/x-xz",
            FileKind::SevenZip => "application/x-7z-compressed",
            FileKind::Rar => "application/vnd.rar",
            FileKind::Elf => "application/x-elf",
            FileKind::Pe => "application/vnd.microsoft.portable-executable",
            FileKind::Macho => "application/x-mach-binary",
            FileKind::Wav => "audio/wav",
            FileKind::Avi => "video/x-msvideo",
            FileKind::Mp3 => "audio/mpeg",
            FileKind::Flac => "audio/flac",
            FileKind::Ogg => "application/ogg",
            FileKind::M4a => "audio/mp4",
            FileKind::Mp4 => "video/mp4",
            FileKind::Mkv => "video/x-matroska",
            FileKind::Sqlite => "application/vnd.sqlite3",
            FileKind::Wasm => "application/wasm",
        }
    }

    /// Extensions (lowercase, without dot) this format legitimately uses
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FileKind::Unknown => &[],
            FileKind::Pdf => &["pdf"],
            FileKind::Png => &["png"],
            FileKind::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            FileKind::Gif => &["gif"],
            FileKind::Bmp => &["bmp", "dib"],
            FileKind::Tiff => &["tif", "tiff", "dng", "nef", "cr2", "arw"],
            FileKind::Webp => &["webp"],
            FileKind::Zip => &[
                "zip", "jar", "apk", "docx", "xlsx", "pptx", "odt", "ods", "odp", "epub", "xpi",
            ],
            FileKind::Gzip => &["gz", "tgz"],
            FileKind::Bzip2 => &["bz2", "tbz2"],
            FileKind::Xz => &["xz", "txz"],
            FileKind::SevenZip => &["7z"],
            FileKind::Rar => &["rar"],
            FileKind::Elf => &["elf", "so", "o", "ko", "bin", "axf"],
            FileKind::Pe => &["exe", "dll", "sys", "scr", "ocx", "efi", "cpl", "drv"],
            FileKind::Macho => &["dylib", "bundle", "o"],
            FileKind::Wav => &["wav"],
            FileKind::Avi => &["avi"],
            FileKind::Mp3 => &["mp3"],
            FileKind::Flac => &["flac"],
            FileKind::Ogg => &["ogg", "oga", "ogv", "opus", "spx"],
            FileKind::M4a => &["m4a", "m4b", "m4p"],
            FileKind::Mp4 => &["mp4", "m4v", "mov", "3gp", "3g2", "heic", "heif", "avif"],
            FileKind::Mkv => &["mkv", "webm", "mka", "mks"],
            FileKind::Sqlite => &["sqlite", "sqlite3", "db", "db3"],
            FileKind::Wasm => &["wasm"],
        }
    }

    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.extensions().contains(&ext.as_str())
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte pattern expected near the end of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub magic: Vec<u8>,
    /// How many trailing bytes are searched for `magic`
    pub search_window: usize,
}

/// One entry of the signature table
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub kind: FileKind,
    pub offset: usize,
    pub magic: Vec<u8>,
    /// Additional anchors that must all match
    pub also: Vec<(usize, Vec<u8>)>,
    pub confidence: f64,
    pub description: String,
    pub trailer: Option<Trailer>,
}

impl Signature {
    pub fn new(kind: FileKind, offset: usize, magic: &[u8], confidence: f64, description: &str) -> Self {
        Self {
            kind,
            offset,
            magic: magic.to_vec(),
            also: Vec::new(),
            confidence,
            description: description.to_string(),
            trailer: None,
        }
    }

    pub fn also(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.also.push((offset, bytes.to_vec()));
        self
    }

    pub fn with_trailer(mut self, magic: &[u8], search_window: usize) -> Self {
        self.trailer = Some(Trailer {
            magic: magic.to_vec(),
            search_window,
        });
        self
    }

    /// Bytes of the leading window needed to evaluate this entry
    pub fn span(&self) -> usize {
        self.also
            .iter()
            .map(|(off, bytes)| off + bytes.len())
            .chain(std::iter::once(self.offset + self.magic.len()))
            .max()
            .unwrap_or(0)
    }

    fn matches(&self, window: &[u8]) -> bool {
        anchor_matches(window, self.offset, &self.magic)
            && self
                .also
                .iter()
                .all(|(off, bytes)| anchor_matches(window, *off, bytes))
    }

    /// True when every input this entry accepts is also accepted by `other`
    fn is_shadowed_by(&self, other: &Signature) -> bool {
        other.offset == self.offset
            && self.magic.starts_with(&other.magic)
            && other.also.iter().all(|anchor| self.also.contains(anchor))
    }
}

fn anchor_matches(window: &[u8], offset: usize, bytes: &[u8]) -> bool {
    window
        .get(offset..offset + bytes.len())
        .is_some_and(|slice| slice == bytes)
}

/// Outcome of the optional trailing-signature check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailerCheck {
    /// The matched signature declares no trailer
    NotApplicable,
    /// A trailer exists but confirmation was not run
    Skipped,
    Confirmed,
    Missing,
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDetection {
    pub kind: FileKind,
    pub mime: String,
    /// 0.0 for unknown, up to 1.0
    pub confidence: f64,
    pub description: String,
    pub matched_offset: Option<usize>,
    pub trailer: TrailerCheck,
    #[serde(skip)]
    signature_index: Option<usize>,
}

impl TypeDetection {
    pub fn unknown() -> Self {
        Self {
            kind: FileKind::Unknown,
            mime: FileKind::Unknown.mime().to_string(),
            confidence: 0.0,
            description: "no signature matched".to_string(),
            matched_offset: None,
            trailer: TrailerCheck::NotApplicable,
            signature_index: None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.kind != FileKind::Unknown
    }

    pub fn is_confident(&self) -> bool {
        self.is_known() && self.confidence >= MISMATCH_CONFIDENCE
    }
}

/// Priority-ordered signature matcher
#[derive(Debug, Clone)]
pub struct TypeClassifier {
    signatures: Vec<Signature>,
    leading_window: usize,
}

impl TypeClassifier {
    /// Builds a classifier over `signatures` in the given order.
    ///
    /// Rejects tables where an entry can never match because an earlier,
    /// less specific entry at the same offset always wins.
    pub fn new(signatures: Vec<Signature>, leading_window: usize) -> Result<Self> {
        for (i, later) in signatures.iter().enumerate() {
            if later.magic.is_empty() {
                return Err(Error::Config(format!(
                    "signature '{}' has empty magic bytes",
                    later.description
                )));
            }
            if later.trailer.as_ref().is_some_and(|t| t.magic.is_empty()) {
                return Err(Error::Config(format!(
                    "signature '{}' has an empty trailer",
                    later.description
                )));
            }
            if later.span() > leading_window {
                return Err(Error::Config(format!(
                    "signature '{}' extends past the {}-byte leading window",
                    later.description, leading_window
                )));
            }
            if let Some(earlier) = signatures[..i].iter().find(|e| later.is_shadowed_by(e)) {
                return Err(Error::Config(format!(
                    "signature '{}' is unreachable behind '{}'",
                    later.description, earlier.description
                )));
            }
        }

        Ok(Self {
            signatures,
            leading_window,
        })
    }

    pub fn with_default_signatures(leading_window: usize) -> Result<Self> {
        Self::new(default_signatures(), leading_window)
    }

    pub fn leading_window(&self) -> usize {
        self.leading_window
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// First table entry matching the leading window, or unknown
    pub fn classify(&self, leading: &[u8]) -> TypeDetection {
        let window = &leading[..leading.len().min(self.leading_window)];

        let Some((index, sig)) = self
            .signatures
            .iter()
            .enumerate()
            .find(|(_, sig)| sig.matches(window))
        else {
            return TypeDetection::unknown();
        };

        debug!(kind = %sig.kind, description = %sig.description, "signature matched");

        TypeDetection {
            kind: sig.kind,
            mime: sig.kind.mime().to_string(),
            confidence: sig.confidence,
            description: sig.description.clone(),
            matched_offset: Some(sig.offset),
            trailer: if sig.trailer.is_some() {
                TrailerCheck::Skipped
            } else {
                TrailerCheck::NotApplicable
            },
            signature_index: Some(index),
        }
    }

    /// Trailer declared by the signature behind `detection`, if any
    pub fn trailer_for(&self, detection: &TypeDetection) -> Option<&Trailer> {
        detection
            .signature_index
            .and_then(|i| self.signatures.get(i))
            .and_then(|sig| sig.trailer.as_ref())
    }

    /// Updates `detection` with the result of searching `tail` for its trailer
    pub fn confirm_trailer(&self, detection: &mut TypeDetection, tail: &[u8]) {
        let Some(trailer) = self.trailer_for(detection) else {
            return;
        };

        let start = tail.len().saturating_sub(trailer.search_window);
        let found = tail[start..]
            .windows(trailer.magic.len())
            .any(|w| w == trailer.magic.as_slice());

        if found {
            detection.trailer = TrailerCheck::Confirmed;
        } else {
            detection.trailer = TrailerCheck::Missing;
            detection.confidence *= TRAILER_MISSING_PENALTY;
        }
    }

    /// True when a confident detection contradicts the declared extension
    pub fn is_mismatch(&self, detection: &TypeDetection, declared_ext: Option<&str>) -> bool {
        match declared_ext {
            Some(ext) => detection.is_confident() && !detection.kind.matches_extension(ext),
            None => false,
        }
    }
}

/// Built-in table, most specific entries first
pub fn default_signatures() -> Vec<Signature> {
    vec![
        Signature::new(FileKind::Pdf, 0, b"%PDF-", 1.0, "PDF document").with_trailer(b"%%EOF", 1024),
        Signature::new(FileKind::Png, 0, b"\x89PNG\r\n\x1a\n", 1.0, "PNG image")
            .with_trailer(b"IEND\xae\x42\x60\x82", 64),
        Signature::new(FileKind::Jpeg, 0, b"\xff\xd8\xff", 0.95, "JPEG image").with_trailer(b"\xff\xd9", 64),
        Signature::new(FileKind::Gif, 0, b"GIF89a", 1.0, "GIF image (89a)").with_trailer(b"\x3b", 16),
        Signature::new(FileKind::Gif, 0, b"GIF87a", 1.0, "GIF image (87a)").with_trailer(b"\x3b", 16),
        Signature::new(FileKind::Webp, 0, b"RIFF", 1.0, "WebP image").also(8, b"WEBP"),
        Signature::new(FileKind::Wav, 0, b"RIFF", 1.0, "WAVE audio").also(8, b"WAVE"),
        Signature::new(FileKind::Avi, 0, b"RIFF", 1.0, "AVI video").also(8, b"AVI "),
        Signature::new(FileKind::Tiff, 0, b"II*\x00", 0.9, "TIFF image (little-endian)"),
        Signature::new(FileKind::Tiff, 0, b"MM\x00*", 0.9, "TIFF image (big-endian)"),
        Signature::new(FileKind::Zip, 0, b"PK\x03\x04", 0.95, "ZIP archive")
            .with_trailer(b"PK\x05\x06", 65_557),
        Signature::new(FileKind::Zip, 0, b"PK\x05\x06", 0.9, "ZIP archive (empty)"),
        Signature::new(FileKind::SevenZip, 0, b"7z\xbc\xaf\x27\x1c", 1.0, "7-Zip archive"),
        Signature::new(FileKind::Rar, 0, b"Rar!\x1a\x07\x01\x00", 1.0, "RAR archive (v5)"),
        Signature::new(FileKind::Rar, 0, b"Rar!\x1a\x07\x00", 1.0, "RAR archive (v4)"),
        Signature::new(FileKind::Xz, 0, b"\xfd7zXZ\x00", 1.0, "XZ compressed data"),
        Signature::new(FileKind::Gzip, 0, b"\x1f\x8b\x08", 0.95, "gzip compressed data"),
        Signature::new(FileKind::Bzip2, 0, b"BZh", 0.85, "bzip2 compressed data"),
        Signature::new(FileKind::Sqlite, 0, b"SQLite format 3\x00", 1.0, "SQLite 3 database"),
        Signature::new(FileKind::Elf, 0, b"\x7fELF", 1.0, "ELF executable"),
        Signature::new(FileKind::Macho, 0, b"\xcf\xfa\xed\xfe", 1.0, "Mach-O executable (64-bit)"),
        Signature::new(FileKind::Macho, 0, b"\xce\xfa\xed\xfe", 1.0, "Mach-O executable (32-bit)"),
        Signature::new(FileKind::Wasm, 0, b"\x00asm", 1.0, "WebAssembly module"),
        Signature::new(FileKind::Flac, 0, b"fLaC", 1.0, "FLAC audio"),
        Signature::new(FileKind::Ogg, 0, b"OggS", 1.0, "Ogg container"),
        Signature::new(FileKind::Mkv, 0, b"\x1a\x45\xdf\xa3", 0.9, "Matroska / WebM container"),
        Signature::new(FileKind::M4a, 4, b"ftypM4A ", 1.0, "MPEG-4 audio"),
        Signature::new(FileKind::Mp4, 4, b"ftyp", 0.9, "ISO base media file (MP4 family)"),
        Signature::new(FileKind::Mp3, 0, b"ID3", 0.9, "MP3 audio with ID3 tag"),
        Signature::new(FileKind::Mp3, 0, b"\xff\xfb", 0.5, "MPEG audio frame"),
        Signature::new(FileKind::Pe, 0, b"MZ", 0.6, "DOS/Windows executable"),
        Signature::new(FileKind::Bmp, 0, b"BM", 0.5, "BMP image"),
    ]
}
