//! File-system level metadata: names, sizes, permissions and timestamps

use std::{
    fs,
    path::Path,
    time::SystemTime,
};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    analyzer::signatures::FileKind,
    error::ExtractionError,
    metadata::{Metadata, MetadataExtractor},
    utils::format::human_readable_size,
};

/// Access and modification times closer than this are flagged
const NEAR_IDENTICAL_SECS: f64 = 1.0;

/// Extracts stat-level metadata for any file type
#[derive(Debug, Clone, Default)]
pub struct FilesystemExtractor {
    /// Reference time for age and future-timestamp checks; `None` uses now
    now: Option<DateTime<Utc>>,
}

impl FilesystemExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the reference time, mostly for deterministic output
    pub fn with_reference_time(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    format!(
        "{} (Unix: {})",
        time.to_rfc3339_opts(SecondsFormat::Millis, true),
        time.timestamp()
    )
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

impl MetadataExtractor for FilesystemExtractor {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn extract(&self, path: &Path, _kind: FileKind) -> Result<Metadata, ExtractionError> {
        let meta = fs::metadata(path)?;
        let now = self.now.unwrap_or_else(Utc::now);
        let mut out = Metadata::new();

        if let Some(name) = path.file_name() {
            out.insert("file.name".into(), name.to_string_lossy().into_owned().into());
        }
        let full = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        out.insert("file.path".into(), full.display().to_string().into());
        out.insert("file.size".into(), meta.len().into());
        out.insert("file.size_human".into(), human_readable_size(meta.len()).into());
        out.insert(
            "file.readonly".into(),
            meta.permissions().readonly().to_string().into(),
        );

        #[cfg(unix)]
        {
            use crate::utils::format::mode_to_string;
            use std::os::unix::fs::MetadataExt;

            out.insert(
                "file.permissions_octal".into(),
                format!("{:04o}", meta.mode() & 0o7777).into(),
            );
            out.insert("file.permissions".into(), mode_to_string(meta.mode()).into());
            out.insert("file.inode".into(), meta.ino().into());
            out.insert("file.device".into(), meta.dev().into());
            out.insert("file.hard_links".into(), meta.nlink().into());
            out.insert("file.uid".into(), u64::from(meta.uid()).into());
            out.insert("file.gid".into(), u64::from(meta.gid()).into());

            if let Some(changed) = DateTime::<Utc>::from_timestamp(meta.ctime(), meta.ctime_nsec() as u32) {
                out.insert("time.changed".into(), format_time(changed).into());
            }
        }

        if let Ok(created) = meta.created() {
            out.insert("time.created".into(), format_time(to_utc(created)).into());
        }

        let modified = meta.modified().ok().map(to_utc);
        let accessed = meta.accessed().ok().map(to_utc);

        if let Some(modified) = modified {
            out.insert("time.modified".into(), format_time(modified).into());
            let age_days = (now - modified).num_milliseconds() as f64 / 86_400_000.0;
            out.insert("time.age_days".into(), age_days.into());

            if modified > now {
                out.insert(
                    "warning.future_timestamp".into(),
                    "Modification time is in the future".into(),
                );
            }
        }
        if let Some(accessed) = accessed {
            out.insert("time.accessed".into(), format_time(accessed).into());
        }
        if let (Some(m), Some(a)) = (modified, accessed) {
            let gap = (m - a).num_milliseconds().abs() as f64 / 1000.0;
            if gap < NEAR_IDENTICAL_SECS {
                out.insert(
                    "warning.timestamps".into(),
                    "Access and modification times are nearly identical".into(),
                );
            }
        }

        Ok(out)
    }
}
