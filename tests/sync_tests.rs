//! Tests for local manifests and remote sync
//!
//! These tests verify:
//! - Initial version depends on whether the directory has files
//! - Integrity failures: count, membership, length, checksum
//! - Same-length edits with a restored timestamp pass unless every
//!   checksum is recomputed
//! - Version steps only when the directory content changes, not on a
//!   timestamp-only touch
//! - Push/pull through a directory transport and drift classification

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tallydb::config::IntegrityMode;
use tallydb::sync::{list_files, DirectoryTransport, Drift, Local, Remote, Version};
use tallydb::TallyError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn populate(root: &Path) {
    fs::create_dir_all(root.join("invoices")).unwrap();
    fs::write(root.join("invoices/partition_000000.dat"), b"first partition").unwrap();
    fs::write(root.join("invoices/partition_000001.dat"), b"second").unwrap();
    fs::write(root.join("customers.dat"), b"customer data").unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn open_indexed(root: &Path) -> Local {
    let mut local = Local::open(root, IntegrityMode::TrustTimestamps).unwrap();
    local.create_index().unwrap();
    local
}

// =============================================================================
// Listing Tests
// =============================================================================

#[test]
fn test_listing_skips_hidden_and_temp_files() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    fs::write(dir.path().join(".manifest"), b"x").unwrap();
    fs::write(dir.path().join("customers.dat.tmp"), b"x").unwrap();
    fs::create_dir_all(dir.path().join(".staging-3")).unwrap();
    fs::write(dir.path().join(".staging-3/file"), b"x").unwrap();

    assert_eq!(
        list_files(dir.path()).unwrap(),
        vec![
            "customers.dat",
            "invoices/partition_000000.dat",
            "invoices/partition_000001.dat",
        ]
    );
}

// =============================================================================
// Index Creation Tests
// =============================================================================

#[test]
fn test_create_index_on_empty_directory() {
    let dir = TempDir::new().unwrap();
    let local = open_indexed(dir.path());

    assert_eq!(local.version(), Version::ZERO);
    assert!(local.index().files().is_empty());
    assert!(!local.index().is_empty());
    assert!(local.data_integrity_test().is_ok());
}

#[test]
fn test_create_index_with_files_starts_at_one() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());

    let local = open_indexed(dir.path());

    assert_eq!(local.version(), Version::new(1.0));
    assert_eq!(local.index().files().len(), 3);
    assert!(local.has_uncommitted_changes());
    assert!(dir.path().join(Local::MANIFEST_FILE).is_file());
}

#[test]
fn test_create_index_twice_fails() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let mut local = open_indexed(dir.path());

    assert!(matches!(
        local.create_index(),
        Err(TallyError::InvalidArgument(_))
    ));

    // Also after reopening
    let mut reopened = Local::open(dir.path(), IntegrityMode::TrustTimestamps).unwrap();
    assert_eq!(reopened.version(), Version::new(1.0));
    assert!(reopened.create_index().is_err());
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_integrity_detects_added_file() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let local = open_indexed(dir.path());

    fs::write(dir.path().join("extra.dat"), b"surprise").unwrap();

    assert!(matches!(
        local.data_integrity_test(),
        Err(TallyError::InvalidData(_))
    ));
}

#[test]
fn test_integrity_detects_swapped_file() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let local = open_indexed(dir.path());

    fs::remove_file(dir.path().join("customers.dat")).unwrap();
    fs::write(dir.path().join("vendors.dat"), b"vendor data").unwrap();

    assert!(matches!(
        local.data_integrity_test(),
        Err(TallyError::InvalidData(_))
    ));
}

#[test]
fn test_integrity_detects_length_change() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let local = open_indexed(dir.path());

    let path = dir.path().join("customers.dat");
    let before = mtime(&path);
    fs::write(&path, b"customer data, longer").unwrap();
    set_mtime(&path, before);

    assert!(matches!(
        local.data_integrity_test(),
        Err(TallyError::InvalidData(_))
    ));
}

#[test]
fn test_same_timestamp_edit_not_detected() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let local = open_indexed(dir.path());

    let path = dir.path().join("customers.dat");
    let before = mtime(&path);
    fs::write(&path, b"CUSTOMER DATA").unwrap();
    set_mtime(&path, before);

    assert!(local.data_integrity_test().is_ok());

    // Recomputing every checksum catches it
    let strict = Local::open(dir.path(), IntegrityMode::AlwaysChecksum).unwrap();
    assert!(matches!(
        strict.data_integrity_test(),
        Err(TallyError::InvalidData(_))
    ));
}

#[test]
fn test_moved_timestamp_edit_detected() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let local = open_indexed(dir.path());

    let path = dir.path().join("customers.dat");
    let before = mtime(&path);
    fs::write(&path, b"CUSTOMER DATA").unwrap();
    set_mtime(&path, before + Duration::from_secs(5));

    assert!(matches!(
        local.data_integrity_test(),
        Err(TallyError::InvalidData(_))
    ));
}

#[test]
fn test_touched_but_unchanged_file_passes() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let local = open_indexed(dir.path());

    let path = dir.path().join("customers.dat");
    set_mtime(&path, mtime(&path) + Duration::from_secs(60));

    assert!(local.data_integrity_test().is_ok());
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_timestamp_only_touch_keeps_version() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let mut local = open_indexed(dir.path());

    let path = dir.path().join("customers.dat");
    let moved = mtime(&path) + Duration::from_secs(60);
    set_mtime(&path, moved);

    assert!(!local.update_index().unwrap());
    assert_eq!(local.version(), Version::new(1.0));

    // The new timestamp is recorded, so the next scan reuses it
    let recorded = local.index().file("customers.dat").unwrap().last_modified;
    let on_disk = moved
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    assert_eq!(recorded, on_disk);
    assert!(local.data_integrity_test().is_ok());

    let reopened = Local::open(dir.path(), IntegrityMode::TrustTimestamps).unwrap();
    assert_eq!(reopened.version(), Version::new(1.0));
}

#[test]
fn test_update_index_steps_only_on_change() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let mut local = open_indexed(dir.path());

    assert!(!local.update_index().unwrap());
    assert_eq!(local.version(), Version::new(1.0));

    fs::write(dir.path().join("invoices/partition_000002.dat"), b"third").unwrap();
    assert!(local.update_index().unwrap());
    assert_eq!(local.version(), Version::new(2.0));

    fs::remove_file(dir.path().join("customers.dat")).unwrap();
    assert!(local.update_index().unwrap());
    assert_eq!(local.version(), Version::new(3.0));
    assert!(local.data_integrity_test().is_ok());

    let reopened = Local::open(dir.path(), IntegrityMode::TrustTimestamps).unwrap();
    assert_eq!(reopened.version(), Version::new(3.0));
    assert_eq!(reopened.index().files().len(), 3);
}

#[test]
fn test_mark_published_clears_uncommitted() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    let mut local = open_indexed(dir.path());
    assert!(local.has_uncommitted_changes());

    local.mark_published(local.version()).unwrap();

    assert!(!local.has_uncommitted_changes());
    assert_eq!(local.branch_version(), Version::new(1.0));
}

// =============================================================================
// Remote Tests
// =============================================================================

#[test]
fn test_push_then_pull_round_trip() {
    let origin = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    let cloud = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    populate(origin.path());
    let mut local = open_indexed(origin.path());

    let mut remote = Remote::new(DirectoryTransport::new(cloud.path()));
    assert!(remote.fetch_index(scratch.path()).unwrap().is_empty());
    assert_eq!(remote.drift(&local), Drift::LocalAhead);

    assert_eq!(remote.push(&mut local).unwrap(), 3);
    assert!(!local.has_uncommitted_changes());
    assert!(cloud.path().join("invoices/partition_000001.dat").is_file());
    assert!(cloud.path().join(Local::MANIFEST_FILE).is_file());

    // Second machine
    let mut other = Local::open(mirror.path(), IntegrityMode::TrustTimestamps).unwrap();
    let mut peer = Remote::new(DirectoryTransport::new(cloud.path()));
    peer.fetch_index(scratch.path()).unwrap();
    assert_eq!(peer.index().version(), Version::new(1.0));
    assert_eq!(peer.drift(&other), Drift::RemoteAhead);

    assert_eq!(peer.pull(&mut other).unwrap(), 3);
    assert_eq!(other.version(), Version::new(1.0));
    assert_eq!(peer.drift(&other), Drift::InSync);
    assert_eq!(
        fs::read(mirror.path().join("customers.dat")).unwrap(),
        b"customer data"
    );
    assert!(other.data_integrity_test().is_ok());
    assert!(!other.update_index().unwrap());
}

#[test]
fn test_incremental_push_and_pull() {
    let origin = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    let cloud = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    populate(origin.path());
    let mut local = open_indexed(origin.path());
    let mut remote = Remote::new(DirectoryTransport::new(cloud.path()));
    remote.fetch_index(scratch.path()).unwrap();
    remote.push(&mut local).unwrap();

    let mut other = Local::open(mirror.path(), IntegrityMode::TrustTimestamps).unwrap();
    let mut peer = Remote::new(DirectoryTransport::new(cloud.path()));
    peer.fetch_index(scratch.path()).unwrap();
    peer.pull(&mut other).unwrap();

    // Change one file, drop another
    fs::write(origin.path().join("customers.dat"), b"customer data v2").unwrap();
    fs::remove_file(origin.path().join("invoices/partition_000001.dat")).unwrap();
    assert!(local.update_index().unwrap());

    remote.fetch_index(scratch.path()).unwrap();
    assert_eq!(remote.drift(&local), Drift::LocalAhead);
    assert_eq!(remote.push(&mut local).unwrap(), 1);
    assert!(!cloud.path().join("invoices/partition_000001.dat").exists());

    peer.fetch_index(scratch.path()).unwrap();
    assert_eq!(peer.drift(&other), Drift::RemoteAhead);
    assert_eq!(peer.pull(&mut other).unwrap(), 1);

    assert_eq!(other.version(), local.version());
    assert!(!mirror.path().join("invoices/partition_000001.dat").exists());
    assert_eq!(
        fs::read(mirror.path().join("customers.dat")).unwrap(),
        b"customer data v2"
    );
}

#[test]
fn test_diverged_when_both_sides_change() {
    let origin = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    let cloud = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    populate(origin.path());
    let mut local = open_indexed(origin.path());
    let mut remote = Remote::new(DirectoryTransport::new(cloud.path()));
    remote.fetch_index(scratch.path()).unwrap();
    remote.push(&mut local).unwrap();

    let mut other = Local::open(mirror.path(), IntegrityMode::TrustTimestamps).unwrap();
    let mut peer = Remote::new(DirectoryTransport::new(cloud.path()));
    peer.fetch_index(scratch.path()).unwrap();
    peer.pull(&mut other).unwrap();

    // The mirror publishes first
    fs::write(mirror.path().join("notes.dat"), b"from mirror").unwrap();
    other.update_index().unwrap();
    peer.push(&mut other).unwrap();

    // Origin changes without pulling
    fs::write(origin.path().join("audit.dat"), b"from origin").unwrap();
    local.update_index().unwrap();

    remote.fetch_index(scratch.path()).unwrap();
    assert_eq!(remote.drift(&local), Drift::Diverged);
}

#[test]
fn test_unreachable_remote() {
    let scratch = TempDir::new().unwrap();
    let missing = scratch.path().join("not-mounted");
    let mut remote = Remote::new(DirectoryTransport::new(&missing));

    match remote.fetch_index(scratch.path()) {
        Err(TallyError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotConnected),
        other => panic!("expected NotConnected, got {:?}", other.map(|i| i.version())),
    }
}

#[test]
fn test_fetch_surfaces_scratch_errors() {
    let cloud = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    // A directory where the downloaded manifest page belongs cannot be cleared
    fs::create_dir_all(scratch.path().join("remote.manifest/held")).unwrap();

    let mut remote = Remote::new(DirectoryTransport::new(cloud.path()));

    match remote.fetch_index(scratch.path()) {
        Err(TallyError::Io(e)) => assert_ne!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected an I/O error, got {:?}", other.map(|i| i.version())),
    }
    assert!(remote.index().is_empty());
}
