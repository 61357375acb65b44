//! Property-based testing for fileguard
//!
//! Uses proptest to check restoration invariants across randomly generated
//! file contents, tampering and timestamps.

use ::fileguard::*;
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Generate random file content, empty files included
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Small text files
        "[a-zA-Z0-9 \n]{0,1000}".prop_map(|s| s.into_bytes()),
        // Binary data
        prop::collection::vec(any::<u8>(), 0..10000),
        // Repetitive patterns
        (any::<u8>(), 1..1000usize).prop_map(|(byte, count)| vec![byte; count]),
    ]
}

/// Ways somebody can tamper with the protected file
#[derive(Debug, Clone)]
pub enum Tamper {
    Overwrite(Vec<u8>),
    Append(Vec<u8>),
    Replace(Vec<u8>),
    Delete,
}

fn tamper_strategy() -> impl Strategy<Value = Tamper> {
    prop_oneof![
        content_strategy().prop_map(Tamper::Overwrite),
        prop::collection::vec(any::<u8>(), 1..512).prop_map(Tamper::Append),
        content_strategy().prop_map(Tamper::Replace),
        Just(Tamper::Delete),
    ]
}

fn apply_tamper(target: &PathBuf, tamper: &Tamper) {
    match tamper {
        Tamper::Overwrite(content) => {
            fs::write(target, content).unwrap();
            // An equal-size write within one clock tick keeps the old mtime.
            filetime::set_file_mtime(target, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
        }
        Tamper::Append(extra) => {
            let mut content = fs::read(target).unwrap();
            content.extend_from_slice(extra);
            fs::write(target, content).unwrap();
        }
        Tamper::Replace(content) => {
            let staging = target.with_extension("swap");
            fs::write(&staging, content).unwrap();
            fs::rename(&staging, target).unwrap();
        }
        Tamper::Delete => fs::remove_file(target).unwrap(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_tampering_always_converges_to_backup(
        original in content_strategy(),
        tamper in tamper_strategy(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("asset.pak");
        fs::write(&target, &original).unwrap();

        let guard = FileGuardBuilder::new().build(&target).unwrap();
        guard.check_and_restore(Trigger::Startup).unwrap();

        apply_tamper(&target, &tamper);
        let diverged = fs::read(&target).map(|c| c != original).unwrap_or(true);

        let report = guard.check_and_restore(Trigger::Poll).unwrap();
        prop_assert_eq!(report.restored(), diverged);
        prop_assert_eq!(fs::read(&target).unwrap(), original.clone());

        // Converged: nothing left to do.
        let report = guard.check_and_restore(Trigger::Poll).unwrap();
        prop_assert_eq!(report.outcome, CheckOutcome::Unchanged);

        // The backup is never written to.
        prop_assert_eq!(fs::read(guard.backup().path()).unwrap(), original);
    }

    #[test]
    fn prop_timestamp_changes_never_restore(
        content in content_strategy(),
        seconds in 1_000i64..2_000_000_000i64,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("settings.ini");
        fs::write(&target, &content).unwrap();

        let guard = FileGuardBuilder::new().build(&target).unwrap();
        guard.check_and_restore(Trigger::Startup).unwrap();

        filetime::set_file_mtime(&target, filetime::FileTime::from_unix_time(seconds, 0)).unwrap();

        let report = guard.check_and_restore(Trigger::Event).unwrap();
        prop_assert!(!report.restored());
        prop_assert!(!report.outcome.is_tampered());
        prop_assert_eq!(guard.state().restores, 0);
    }

    #[test]
    fn prop_restore_preserves_backup_timestamp(
        content in content_strategy(),
        seconds in 1_000i64..2_000_000_000i64,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("asset.pak");
        let backup = temp_dir.path().join("asset.trusted");
        fs::write(&backup, &content).unwrap();
        filetime::set_file_mtime(&backup, filetime::FileTime::from_unix_time(seconds, 0)).unwrap();
        fs::write(&target, b"definitely not the backup").unwrap();

        let guard = FileGuardBuilder::new().backup_path(&backup).build(&target).unwrap();
        prop_assert!(guard.check_and_restore(Trigger::Startup).unwrap().restored());

        let restored = filetime::FileTime::from_last_modification_time(&fs::metadata(&target).unwrap());
        prop_assert_eq!(restored.unix_seconds(), seconds);
        prop_assert_eq!(fs::read(&target).unwrap(), content);
    }

    #[test]
    fn prop_manifest_reports_size_and_md5(content in content_strategy()) {
        use md5::{Digest, Md5};

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("pakchunk0.pak");
        fs::write(&file, &content).unwrap();

        let entries = manifest::build_manifest(&[file]).unwrap();
        prop_assert_eq!(entries.len(), 1);
        prop_assert_eq!(entries[0].size_in_bytes, content.len() as u64);
        prop_assert_eq!(&entries[0].hash, &hex::encode(Md5::digest(&content)));
    }
}
