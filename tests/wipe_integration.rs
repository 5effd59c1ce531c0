mod fixtures;

use std::{
    fs, io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use fixtures::{write_temp, TestFixtures};
use rattlescan::{
    CancellationToken, Disposition, Error, PassPattern, PassSpec, Phase, SecureWipeEngine,
    VerificationOutcome, WipeConfig, WipePlan, WipeState, WriteInterceptor,
};

fn three_pass_plan() -> WipePlan {
    WipePlan::new(
        "zero-one-random",
        vec![
            PassSpec::verified(PassPattern::Zeros),
            PassSpec::verified(PassPattern::Ones),
            PassSpec::verified(PassPattern::Random),
        ],
    )
    .unwrap()
}

fn engine() -> SecureWipeEngine {
    SecureWipeEngine::new(WipeConfig::default()).unwrap()
}

/// Flips the low bit of one byte while a given pass is written
struct FlipByte {
    pass: usize,
    offset: u64,
}

impl WriteInterceptor for FlipByte {
    fn before_write(&self, pass: usize, offset: u64, chunk: &mut [u8]) -> io::Result<()> {
        let end = offset + chunk.len() as u64;
        if pass == self.pass && (offset..end).contains(&self.offset) {
            chunk[(self.offset - offset) as usize] ^= 0x01;
        }
        Ok(())
    }
}

/// Fails every write of one pass and counts calls for later passes
struct FailPass {
    pass: usize,
    later_calls: AtomicUsize,
}

impl WriteInterceptor for FailPass {
    fn before_write(&self, pass: usize, _offset: u64, _chunk: &mut [u8]) -> io::Result<()> {
        if pass > self.pass {
            self.later_calls.fetch_add(1, Ordering::SeqCst);
        }
        if pass == self.pass {
            return Err(io::Error::new(io::ErrorKind::Other, "device error"));
        }
        Ok(())
    }
}

#[test]
fn test_ten_megabyte_three_pass_wipe() {
    let (dir, path) = write_temp("disk-image.bin", &TestFixtures::random(10 * 1024 * 1024, 1));

    let result = engine().execute(&path, &three_pass_plan()).unwrap();

    assert!(result.is_success());
    assert_eq!(result.state, WipeState::Completed);
    assert_eq!(result.disposition, Disposition::EntryRemoved);
    assert_eq!(result.file_size, 10 * 1024 * 1024);
    assert_eq!(result.passes_completed, 3);
    for pass in &result.passes {
        assert_eq!(pass.bytes_written, 10 * 1024 * 1024);
        assert_eq!(pass.verification, VerificationOutcome::Passed);
    }
    assert!(result.failure.is_none());
    assert!(result.retained_path.is_none());
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_bit_flip_in_second_pass_fails_verification() {
    let size = 256 * 1024;
    let (_dir, path) = write_temp("evidence.doc", &TestFixtures::random(size, 2));
    let target = 100_003u64;
    let engine = SecureWipeEngine::new(WipeConfig {
        chunk_size: 64 * 1024,
        ..WipeConfig::default()
    })
    .unwrap()
    .with_interceptor(Arc::new(FlipByte {
        pass: 1,
        offset: target,
    }));

    let result = engine.execute(&path, &three_pass_plan()).unwrap();

    assert_eq!(result.state, WipeState::Failed);
    assert_eq!(result.disposition, Disposition::EntryRetainedDueToFailure);
    assert_eq!(result.passes_completed, 1);
    assert_eq!(result.retained_path.as_deref(), Some(path.as_path()));

    let failed = &result.passes[1];
    let VerificationOutcome::Failed(failure) = &failed.verification else {
        panic!("expected a failed verification, got {:?}", failed.verification);
    };
    assert_eq!(failure.pass_index, 1);
    assert_eq!(failure.offset_start, target);
    assert_eq!(failure.offset_end, target + 1);
    assert_eq!(failure.expected, 0xFF);
    assert_eq!(failure.observed, 0xFE);
    assert_eq!(failure.mismatched_bytes, 1);

    let contents = fs::read(&path).unwrap();
    assert_eq!(contents.len(), size);
    for (i, byte) in contents.iter().enumerate() {
        let expected = if i as u64 == target { 0xFE } else { 0xFF };
        assert_eq!(*byte, expected, "byte {}", i);
    }

    assert!(matches!(result.check(), Err(Error::Verification(f)) if f.pass_index == 1));
}

#[test]
fn test_write_failure_runs_no_later_passes() {
    let (_dir, path) = write_temp("keep.bin", &TestFixtures::repetitive_text(20_000));
    let interceptor = Arc::new(FailPass {
        pass: 0,
        later_calls: AtomicUsize::new(0),
    });
    let engine = engine().with_interceptor(interceptor.clone());

    let result = engine.execute(&path, &three_pass_plan()).unwrap();

    assert_eq!(result.state, WipeState::Failed);
    assert_eq!(result.passes_completed, 0);
    assert!(result.passes.is_empty());
    assert_eq!(interceptor.later_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.failure.as_ref().unwrap().phase, Some(Phase::Write));
    assert!(path.exists());
    assert_eq!(fs::read(&path).unwrap(), TestFixtures::repetitive_text(20_000));
}

#[test]
fn test_complement_of_random_verifies() {
    let (_dir, path) = write_temp("notes.txt", &TestFixtures::repetitive_text(70_000));
    let plan = WipePlan::new(
        "random-then-complement",
        vec![
            PassSpec::verified(PassPattern::Random),
            PassSpec::verified(PassPattern::Complement),
        ],
    )
    .unwrap();

    let result = engine().execute(&path, &plan).unwrap();
    assert!(result.is_success());
    assert_eq!(result.passes[1].pattern, "complement:random");
}

#[test]
fn test_gutmann_on_small_file() {
    let (_dir, path) = write_temp("small.key", &TestFixtures::random(4096, 5));
    let result = engine().execute(&path, &WipePlan::gutmann()).unwrap();
    assert!(result.is_success());
    assert_eq!(result.passes_completed, 35);
}

#[test]
fn test_wipe_without_rename_or_truncate() {
    let (_dir, path) = write_temp("plain.bin", &[0x11; 1000]);
    let engine = SecureWipeEngine::new(WipeConfig {
        obscure_name: false,
        truncate_before_remove: false,
        ..WipeConfig::default()
    })
    .unwrap();

    let result = engine.execute(&path, &WipePlan::nist_800_88_clear()).unwrap();
    assert!(result.is_success());
    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn test_symlink_is_rejected_and_target_untouched() {
    let (dir, target) = write_temp("secret.txt", &[0x5A; 4096]);
    let link = dir.path().join("link.txt");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let err = engine()
        .execute(&link, &WipePlan::dod_5220_22_m())
        .unwrap_err();

    assert!(matches!(err, Error::NotRegularFile { .. }));
    assert!(fs::symlink_metadata(&link).is_ok());
    assert_eq!(fs::read(&target).unwrap(), vec![0x5A; 4096]);
}

#[cfg(unix)]
#[test]
fn test_read_only_file_is_permission_denied() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, path) = write_temp("locked.bin", &[0x33; 2048]);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();
    // root ignores mode bits
    if fs::OpenOptions::new().write(true).open(&path).is_ok() {
        return;
    }

    let err = engine()
        .execute(&path, &WipePlan::default())
        .unwrap_err();

    assert!(matches!(
        err,
        Error::PermissionDenied {
            phase: Phase::Open,
            ..
        }
    ));
    assert_eq!(fs::read(&path).unwrap(), vec![0x33; 2048]);
}

#[test]
fn test_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine()
        .execute(dir.path(), &WipePlan::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotRegularFile { .. }));
}

#[tokio::test]
async fn test_async_wipe() {
    let (_dir, path) = write_temp("async.bin", &TestFixtures::random(50_000, 9));
    let engine = Arc::new(engine());

    let result = engine
        .execute_async(path.clone(), WipePlan::dod_5220_22_m(), CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_async_cancelled_wipe_keeps_file() {
    let (_dir, path) = write_temp("cancel.bin", &[0x42; 8192]);
    let token = CancellationToken::new();
    token.cancel();

    let result = Arc::new(engine())
        .execute_async(path.clone(), WipePlan::dod_5220_22_m(), token)
        .await
        .unwrap();

    assert_eq!(result.disposition, Disposition::EntryRetainedDueToFailure);
    assert!(matches!(result.error(), Some(Error::Cancelled { .. })));
    assert_eq!(fs::read(&path).unwrap(), vec![0x42; 8192]);
}
