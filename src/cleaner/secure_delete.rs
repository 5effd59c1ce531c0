//! Verified multi-pass overwrite followed by removal of the directory entry
//!
//! Every pass rewrites the file in place from offset zero, in chunks, and is
//! forced to stable storage before the next one starts. A pass marked for
//! verification is read back and compared byte for byte against a
//! regenerated copy of its pattern. Any failure stops the run, keeps the
//! directory entry and reports the failing pass.

use std::{
    fmt, fs,
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::{
    pattern::ResolvedPattern,
    plan::WipePlan,
    result::{PassOutcome, VerificationOutcome, WipeRecorder, WipeResult, WipeState},
};
use crate::{
    config::WipeConfig,
    error::{Error, Phase, Result, VerificationFailure},
    io::FileHandle,
    utils::CancellationToken,
};

/// Hook invoked on every chunk right before it is written.
///
/// Implementations may alter the chunk or fail the write; both are seen by
/// the engine exactly as a misbehaving device would be.
pub trait WriteInterceptor: Send + Sync {
    fn before_write(&self, pass_index: usize, offset: u64, chunk: &mut [u8]) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeStage {
    Writing,
    Verifying,
    Removing,
}

impl fmt::Display for WipeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WipeStage::Writing => write!(f, "Writing"),
            WipeStage::Verifying => write!(f, "Verifying"),
            WipeStage::Removing => write!(f, "Removing"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WipeProgress {
    pub pass_index: usize,
    pub total_passes: usize,
    pub stage: WipeStage,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

impl WipeProgress {
    /// Fraction of the current pass stage, in [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            1.0
        } else {
            self.bytes_done as f64 / self.bytes_total as f64
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(&WipeProgress) + Send + Sync>;

/// Executes wipe plans against single files
pub struct SecureWipeEngine {
    config: WipeConfig,
    interceptor: Option<Arc<dyn WriteInterceptor>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for SecureWipeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureWipeEngine")
            .field("config", &self.config)
            .field("interceptor", &self.interceptor.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

struct Buffers {
    pattern: Vec<u8>,
    readback: Vec<u8>,
}

impl SecureWipeEngine {
    pub fn new(config: WipeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            interceptor: None,
            progress: None,
        })
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn WriteInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &WipeConfig {
        &self.config
    }

    pub fn execute(&self, path: &Path, plan: &WipePlan) -> Result<WipeResult> {
        self.execute_with_cancel(path, plan, &CancellationToken::new())
    }

    /// Runs `plan` against `path`.
    ///
    /// Returns `Err` only when the run cannot start (invalid plan, missing
    /// file, no permission, not a regular file). Once the first pass has
    /// been attempted the outcome is always an `Ok(WipeResult)`; use
    /// [`WipeResult::check`] to turn a failed run into its error.
    #[instrument(skip(self, plan, cancel), fields(path = %path.display(), plan = %plan.name))]
    pub fn execute_with_cancel(
        &self,
        path: &Path,
        plan: &WipePlan,
        cancel: &CancellationToken,
    ) -> Result<WipeResult> {
        plan.validate()?;
        let mut handle = FileHandle::open_write(path)?;
        let file_size = handle.declared_size();

        if !plan.is_verified() {
            warn!("plan has no verified pass, the overwrite will not be confirmed");
        }
        info!(size = file_size, passes = plan.len(), "starting wipe");

        let mut recorder =
            WipeRecorder::new(path, &plan.name, plan.is_verified(), file_size, plan.len());

        if let Err(err) = self.run_passes(&mut handle, plan, cancel, &mut recorder) {
            drop(handle);
            return Ok(abort(recorder, err));
        }

        if cancel.is_cancelled() {
            let err = Error::Cancelled {
                phase: Phase::Truncate,
                offset: file_size,
            };
            drop(handle);
            return Ok(abort(recorder, err));
        }

        if let Err(err) = self.release(handle) {
            return Ok(abort(recorder, err));
        }
        if let Err(err) = self.remove_entry(&mut recorder, plan.len()) {
            return Ok(abort(recorder, err));
        }

        let result = recorder.complete()?;
        info!(
            passes = result.passes_completed,
            duration_ms = result.duration_ms,
            "wipe completed, entry removed"
        );
        Ok(result)
    }

    /// Runs the wipe on tokio's blocking pool
    pub async fn execute_async(
        self: Arc<Self>,
        path: PathBuf,
        plan: WipePlan,
        cancel: CancellationToken,
    ) -> Result<WipeResult> {
        tokio::task::spawn_blocking(move || self.execute_with_cancel(&path, &plan, &cancel))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    fn run_passes(
        &self,
        handle: &mut FileHandle,
        plan: &WipePlan,
        cancel: &CancellationToken,
        recorder: &mut WipeRecorder,
    ) -> Result<()> {
        let file_size = handle.declared_size();
        let chunk = usize::try_from(file_size)
            .unwrap_or(usize::MAX)
            .clamp(1, self.config.chunk_size);
        let mut buffers = Buffers {
            pattern: vec![0u8; chunk],
            readback: vec![0u8; chunk],
        };
        let mut previous: Option<ResolvedPattern> = None;

        for (index, spec) in plan.passes.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    phase: Phase::Write,
                    offset: 0,
                });
            }
            recorder.transition(WipeState::PassRunning(index))?;

            let current = handle.current_size()?;
            if current != file_size {
                return Err(Error::InvalidState(format!(
                    "file size changed from {} to {} before pass {}",
                    file_size,
                    current,
                    index + 1
                )));
            }

            let pattern = ResolvedPattern::resolve(&spec.pattern, previous.as_ref())?;
            let started = Instant::now();
            debug!(pass = index + 1, pattern = %pattern.label(), "writing pass");

            let written =
                self.write_pass(handle, index, plan.len(), &pattern, &mut buffers.pattern, cancel)?;
            handle.sync(written)?;

            let verification = if spec.verify {
                recorder.transition(WipeState::PassVerifying(index))?;
                match self.verify_pass(handle, index, plan.len(), &pattern, &mut buffers, cancel) {
                    Ok(()) => VerificationOutcome::Passed,
                    Err(Error::Verification(failure)) => {
                        recorder.record_pass(PassOutcome {
                            index,
                            pattern: pattern.label(),
                            bytes_written: written,
                            verification: VerificationOutcome::Failed(failure.clone()),
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                        return Err(Error::Verification(failure));
                    }
                    Err(other) => return Err(other),
                }
            } else {
                VerificationOutcome::NotRequested
            };

            recorder.record_pass(PassOutcome {
                index,
                pattern: pattern.label(),
                bytes_written: written,
                verification,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            previous = Some(pattern);
        }

        Ok(())
    }

    fn write_pass(
        &self,
        handle: &mut FileHandle,
        index: usize,
        total: usize,
        pattern: &ResolvedPattern,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let path = handle.path().to_path_buf();
        let size = handle.declared_size();
        let file = handle.file_mut();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::from_io(&path, Phase::Seek, 0, e))?;

        let mut stream = pattern.stream();
        let mut offset = 0u64;
        while offset < size {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    phase: Phase::Write,
                    offset,
                });
            }
            let len = (size - offset).min(buffer.len() as u64) as usize;
            let chunk = &mut buffer[..len];
            stream.fill(chunk);

            if let Some(interceptor) = &self.interceptor {
                interceptor
                    .before_write(index, offset, chunk)
                    .map_err(|e| Error::from_io(&path, Phase::Write, offset, e))?;
            }
            file.write_all(chunk)
                .map_err(|e| Error::from_io(&path, Phase::Write, offset, e))?;

            offset += len as u64;
            self.report(index, total, WipeStage::Writing, offset, size);
        }

        file.flush()
            .map_err(|e| Error::from_io(&path, Phase::Flush, offset, e))?;
        Ok(offset)
    }

    fn verify_pass(
        &self,
        handle: &mut FileHandle,
        index: usize,
        total: usize,
        pattern: &ResolvedPattern,
        buffers: &mut Buffers,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = handle.path().to_path_buf();
        let size = handle.declared_size();
        let file = handle.file_mut();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::from_io(&path, Phase::Seek, 0, e))?;

        let mut stream = pattern.stream();
        let mut offset = 0u64;
        while offset < size {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    phase: Phase::Verify,
                    offset,
                });
            }
            let len = (size - offset).min(buffers.pattern.len() as u64) as usize;
            let expected = &mut buffers.pattern[..len];
            let observed = &mut buffers.readback[..len];
            stream.fill(expected);
            file.read_exact(observed)
                .map_err(|e| Error::from_io(&path, Phase::Verify, offset, e))?;

            if expected != observed {
                let failure = describe_mismatch(index, offset, expected, observed);
                error!(%failure, "readback verification failed");
                return Err(Error::Verification(failure));
            }

            offset += len as u64;
            self.report(index, total, WipeStage::Verifying, offset, size);
        }

        debug!(pass = index + 1, "pass verified");
        Ok(())
    }

    /// Optionally truncates, then closes the handle
    fn release(&self, handle: FileHandle) -> Result<()> {
        if self.config.truncate_before_remove {
            let size = handle.declared_size();
            handle
                .file()
                .set_len(0)
                .map_err(|e| Error::from_io(handle.path(), Phase::Truncate, size, e))?;
            handle.sync(0)?;
        }
        Ok(())
    }

    fn remove_entry(&self, recorder: &mut WipeRecorder, total: usize) -> Result<()> {
        self.report(total.saturating_sub(1), total, WipeStage::Removing, 0, 0);

        let mut target = recorder.current_path().to_path_buf();
        if self.config.obscure_name {
            let obscured = obscured_name(&target)?;
            fs::rename(&target, &obscured)
                .map_err(|e| Error::from_io(&target, Phase::Rename, 0, e))?;
            debug!(to = %obscured.display(), "renamed before removal");
            recorder.moved_to(obscured.clone());
            target = obscured;
        }

        fs::remove_file(&target).map_err(|e| Error::from_io(&target, Phase::Remove, 0, e))?;
        recorder.directory_synced(sync_parent(&target));
        Ok(())
    }

    fn report(&self, pass_index: usize, total: usize, stage: WipeStage, done: u64, size: u64) {
        if let Some(callback) = &self.progress {
            callback(&WipeProgress {
                pass_index,
                total_passes: total,
                stage,
                bytes_done: done,
                bytes_total: size,
            });
        }
    }
}

fn abort(recorder: WipeRecorder, err: Error) -> WipeResult {
    let path = recorder.current_path().to_path_buf();
    let result = recorder.fail(err);
    error!(
        path = %path.display(),
        passes_completed = result.passes_completed,
        reason = %result.failure.as_ref().map(|f| f.message.as_str()).unwrap_or("unknown"),
        "WIPE FAILED: file retained, its content is neither intact nor guaranteed unrecoverable"
    );
    result
}

fn describe_mismatch(
    pass_index: usize,
    base: u64,
    expected: &[u8],
    observed: &[u8],
) -> VerificationFailure {
    let differs = |(a, b): (&u8, &u8)| a != b;
    let first = expected.iter().zip(observed).position(differs).unwrap_or(0);
    let last = expected
        .iter()
        .zip(observed)
        .rposition(differs)
        .unwrap_or(first);
    let mismatched = expected.iter().zip(observed).filter(|(a, b)| a != b).count();

    VerificationFailure {
        pass_index,
        offset_start: base + first as u64,
        offset_end: base + last as u64 + 1,
        expected: expected[first],
        observed: observed[first],
        mismatched_bytes: mismatched as u64,
    }
}

/// Random alphanumeric sibling name with the same length as the original
fn obscured_name(path: &Path) -> Result<PathBuf> {
    let len = path
        .file_name()
        .map(|n| n.len())
        .unwrap_or(8)
        .max(1);
    let mut rng = rand::thread_rng();
    for _ in 0..16 {
        let name: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        let candidate = path.with_file_name(name);
        if fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }
    Err(Error::InvalidState(format!(
        "no free name to obscure {}",
        path.display()
    )))
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> bool {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        Ok(()) => true,
        Err(e) => {
            warn!(dir = %parent.display(), error = %e, "could not sync parent directory");
            false
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> bool {
    false
}
