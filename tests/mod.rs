//! Main test module for fileguard
//!
//! This module includes all test suites:
//! - Integration tests driving full guard runs
//! - Property-based tests for restoration invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::fileguard::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_target_and_backup_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("absent.cfg");

        let err = FileGuardBuilder::new().build(&target).unwrap_err();

        assert!(matches!(err, GuardError::NoSourceForBackup { .. }));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_file_is_protected() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("empty.cfg");
        fs::write(&target, b"").unwrap();

        let guard = FileGuardBuilder::new().build(&target).unwrap();
        guard.check_and_restore(Trigger::Startup).unwrap();

        fs::write(&target, b"not empty anymore").unwrap();
        let report = guard.check_and_restore(Trigger::Poll).unwrap();

        assert!(report.restored());
        assert_eq!(fs::read(&target).unwrap(), b"");
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();

        for name in ["file with spaces.txt", "file-with-dashes.txt", "ünïcödé.pak", ".hidden"] {
            let target = temp_dir.path().join(name);
            fs::write(&target, name.as_bytes()).unwrap();

            let guard = FileGuardBuilder::new().build(&target).unwrap();
            guard.check_and_restore(Trigger::Startup).unwrap();

            fs::write(&target, b"replaced").unwrap();
            assert!(guard.check_and_restore(Trigger::Event).unwrap().restored());
            assert_eq!(fs::read(&target).unwrap(), name.as_bytes());
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_same_size_same_mtime_replacement_via_rename() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("asset.pak");
        fs::write(&target, b"AAAA").unwrap();

        let guard = FileGuardBuilder::new().build(&target).unwrap();
        guard.check_and_restore(Trigger::Startup).unwrap();

        // Same size and timestamp, but a different inode after the rename.
        let stamp = filetime::FileTime::from_last_modification_time(&fs::metadata(&target).unwrap());
        let replacement = temp_dir.path().join("replacement");
        fs::write(&replacement, b"BBBB").unwrap();
        filetime::set_file_mtime(&replacement, stamp).unwrap();
        fs::rename(&replacement, &target).unwrap();

        assert!(guard.check_and_restore(Trigger::Event).unwrap().restored());
        assert_eq!(fs::read(&target).unwrap(), b"AAAA");
    }

    #[test]
    fn test_content_digest_matches_backup_digest() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("asset.pak");
        fs::write(&target, b"payload").unwrap();

        let guard = FileGuardBuilder::new().build(&target).unwrap();
        assert_eq!(content_digest(&target).unwrap(), guard.backup().digest());
    }
}
