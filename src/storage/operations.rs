//! Storage operations
//!
//! The list, get, put and delete operations on a scope, plus cleanup of the
//! staging directory used by uploads.

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

use crate::audit::{AuditSink, EventType};
use crate::auth::Scope;
use crate::error::StorageError;
use crate::storage::filesystem::{
    backup_dir, create_directory, directory_exists, ensure_no_symlinks, file_exists, files_differ,
    next_backup_path, remove_recursively, resolve_contained,
};
use crate::storage::lock::PathLock;
use crate::storage::results::{FileEntry, FileStream, FileType, NO_HASH, PutResult};
use crate::storage::validation::{normalize, validate_filename, validate_path};

/// Name of the staging directory below the base directory. Tenant names
/// cannot start with a dot, so no tenant directory can share it.
pub const STAGING_DIR_NAME: &str = ".tmp";

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// File store confined to per-request scopes.
pub struct StorageEngine {
    staging_dir: PathBuf,
    backup: bool,
    allow_symbolic_links: bool,
    locks: PathLock,
    audit: Arc<dyn AuditSink>,
}

impl StorageEngine {
    /// Creates an engine staging uploads in `<base_dir>/.tmp`.
    ///
    /// `base_dir` should be the same directory scopes are resolved against,
    /// so that the final rename of an upload stays on one volume.
    pub fn new(base_dir: &Path, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            staging_dir: base_dir.join(STAGING_DIR_NAME),
            backup: true,
            allow_symbolic_links: false,
            locks: PathLock::new(),
            audit,
        }
    }

    /// Enables or disables backup rotation on overwrite.
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Allows symbolic links below scope roots.
    pub fn with_symbolic_links(mut self, allow: bool) -> Self {
        self.allow_symbolic_links = allow;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Normalizes, validates and contains a caller-relative path.
    fn resolve(&self, scope: &Scope, raw_path: &str) -> Result<(String, PathBuf), StorageError> {
        let normalized = normalize(raw_path);
        if let Err(e) = validate_path(&normalized) {
            warn!("{} sent invalid path {:?}: {}", scope.subject(), raw_path, e);
            return Err(e.into());
        }

        let target = resolve_contained(scope.root(), &normalized)?;
        self.check_links(scope, &target)?;
        Ok((normalized, target))
    }

    fn check_links(&self, scope: &Scope, target: &Path) -> Result<(), StorageError> {
        if self.allow_symbolic_links {
            return Ok(());
        }
        ensure_no_symlinks(scope.root(), target)
    }

    fn audit(&self, scope: &Scope, event: EventType, target: &Path) {
        self.audit.log(
            scope.tenant(),
            event,
            scope.subject(),
            &target.display().to_string(),
        );
    }

    /// Lists the direct children of `path`, skipping hidden entries.
    ///
    /// The root of a realm that holds no data yet lists as empty.
    pub fn list(&self, scope: &Scope, path: &str) -> Result<Vec<FileEntry>, StorageError> {
        let (normalized, target) = self.resolve(scope, path)?;
        info!("{} list {}", scope.subject(), target.display());
        self.audit(scope, EventType::List, &target);

        if !directory_exists(&target) {
            if normalized.is_empty() && !file_exists(&target) {
                return Ok(Vec::new());
            }
            return Err(StorageError::PathNotFound(normalized));
        }

        let entries = fs::read_dir(&target).map_err(|e| {
            error!("Failed to read directory {}: {}", target.display(), e);
            StorageError::failure(format!("could not list {}", target.display()), e)
        })?;

        let mut listed = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() && !self.allow_symbolic_links {
                debug!("Skipping symbolic link {}", entry.path().display());
                continue;
            }

            // Follows links when they are allowed; vanished entries are skipped.
            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            let (file_type, size) = if metadata.is_dir() {
                (FileType::Folder, 0)
            } else {
                (FileType::File, metadata.len())
            };

            listed.push(FileEntry {
                name,
                file_type,
                size,
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        Ok(listed)
    }

    /// Opens a stored file for reading.
    pub fn get(&self, scope: &Scope, path: &str) -> Result<FileStream, StorageError> {
        let (normalized, target) = self.resolve(scope, path)?;
        info!("{} get {}", scope.subject(), target.display());
        self.audit(scope, EventType::Get, &target);

        let not_found = |e: io::Error| {
            debug!("Cannot open {}: {}", target.display(), e);
            StorageError::FileNotFound(normalized.clone())
        };

        let file = File::open(&target).map_err(not_found)?;
        let metadata = file.metadata().map_err(not_found)?;
        if !metadata.is_file() {
            return Err(StorageError::FileNotFound(normalized));
        }

        Ok(FileStream::new(file, metadata.len(), target))
    }

    /// Stores `content` as `path/filename`.
    ///
    /// The content is staged in full before the target is touched. Replacing
    /// an existing file with different content first moves the old version to
    /// `.<filename>/<filename>_<N>` when backups are enabled.
    pub fn put(
        &self,
        scope: &Scope,
        path: &str,
        filename: &str,
        content: impl Read,
        want_hash: bool,
    ) -> Result<PutResult, StorageError> {
        let (normalized, target_dir) = self.resolve(scope, path)?;
        if let Err(e) = validate_filename(filename) {
            warn!("{} sent invalid filename {:?}: {}", scope.subject(), filename, e);
            return Err(e.into());
        }

        let target_file = target_dir.join(filename);
        self.check_links(scope, &target_file)?;
        info!("{} put {}", scope.subject(), target_file.display());
        self.audit(scope, EventType::Put, &target_file);

        if file_exists(&target_dir) {
            return Err(StorageError::FolderAlreadyExistsAsFile(normalized));
        }
        if directory_exists(&target_file) {
            return Err(StorageError::FileAlreadyExistsAsFolder(join_relative(
                &normalized,
                filename,
            )));
        }

        create_directory(&target_dir).map_err(|e| {
            error!("Failed to create directory {}: {}", target_dir.display(), e);
            StorageError::failure(format!("could not create {}", target_dir.display()), e)
        })?;

        let (staged, bytes_written, hash) = self.stage(content, want_hash)?;
        debug!(
            "Staged {} bytes for {} in {}",
            bytes_written,
            target_file.display(),
            staged.path().display()
        );

        self.locks
            .with_lock(&target_file, || self.commit(staged, &target_dir, &target_file, filename))?;

        Ok(PutResult {
            bytes_written,
            hash,
        })
    }

    /// Copies `content` into a new staging file, hashing on the way.
    fn stage(
        &self,
        mut content: impl Read,
        want_hash: bool,
    ) -> Result<(NamedTempFile, u64, String), StorageError> {
        let staging_failure = |e: io::Error| {
            error!("Failed to stage upload in {}: {}", self.staging_dir.display(), e);
            StorageError::failure("could not stage upload", e)
        };

        create_directory(&self.staging_dir).map_err(staging_failure)?;
        let mut staged = NamedTempFile::new_in(&self.staging_dir).map_err(staging_failure)?;

        let mut hasher = want_hash.then(Sha256::new);
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = match content.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(staging_failure(e)),
            };
            staged.write_all(&buffer[..n]).map_err(staging_failure)?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buffer[..n]);
            }
            total += n as u64;
        }

        staged.as_file().sync_all().map_err(staging_failure)?;

        let hash = match hasher {
            Some(hasher) => hex::encode(hasher.finalize()),
            None => NO_HASH.to_string(),
        };

        Ok((staged, total, hash))
    }

    /// Rotates the current version into the backup set if needed and renames
    /// the staged file into place. Runs under the target's path lock.
    fn commit(
        &self,
        staged: NamedTempFile,
        target_dir: &Path,
        target_file: &Path,
        filename: &str,
    ) -> Result<(), StorageError> {
        if self.backup && file_exists(target_file) {
            let differs = files_differ(target_file, staged.path()).map_err(|e| {
                error!("Failed to compare {}: {}", target_file.display(), e);
                StorageError::failure(format!("could not compare {}", target_file.display()), e)
            })?;

            if differs {
                let backups = backup_dir(target_dir, filename);
                create_directory(&backups).map_err(|e| {
                    StorageError::failure(format!("could not create {}", backups.display()), e)
                })?;
                let slot = next_backup_path(&backups, filename);
                fs::rename(target_file, &slot).map_err(|e| {
                    error!("Failed to back up {}: {}", target_file.display(), e);
                    StorageError::failure(format!("could not back up {}", target_file.display()), e)
                })?;
                info!("Backed up {} to {}", target_file.display(), slot.display());
            }
        }

        staged.persist(target_file).map_err(|e| {
            error!("Failed to move upload to {}: {}", target_file.display(), e.error);
            StorageError::failure(format!("could not write {}", target_file.display()), e.error)
        })?;

        Ok(())
    }

    /// Removes `path` and everything below it. Absent paths are not an error.
    pub fn delete(&self, scope: &Scope, path: &str) -> Result<(), StorageError> {
        let (_, target) = self.resolve(scope, path)?;
        info!("{} delete {}", scope.subject(), target.display());
        self.audit(scope, EventType::Delete, &target);

        match remove_recursively(&target) {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!("Nothing to delete at {}", target.display());
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete {}: {}", target.display(), e);
                Err(StorageError::failure(
                    format!("could not delete {}", target.display()),
                    e,
                ))
            }
        }
    }

    /// Deletes staging files older than `max_age`. Returns how many were removed.
    pub fn sweep_staging(&self, max_age: Duration) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove stale upload {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale uploads from {}", removed, self.staging_dir.display());
        }
        Ok(removed)
    }
}

fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::RecordingAuditSink;
    use crate::audit::{FileAuditSink, NoopAuditSink};
    use crate::auth::ScopeResolver;
    use crate::auth::scope::tests::capability;
    use std::io::Cursor;
    use std::thread;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        base: PathBuf,
        engine: StorageEngine,
        scope: Scope,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(NoopAuditSink))
    }

    fn fixture_with(audit: Arc<dyn AuditSink>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_path_buf();
        let engine = StorageEngine::new(&base, audit);
        let scope = ScopeResolver::new(&base)
            .resolve(&capability("acme", "exam", "rwd"))
            .unwrap()
            .scope;
        Fixture {
            _dir: dir,
            base,
            engine,
            scope,
        }
    }

    fn put(f: &Fixture, path: &str, name: &str, content: &[u8]) -> PutResult {
        f.engine
            .put(&f.scope, path, name, Cursor::new(content.to_vec()), false)
            .unwrap()
    }

    fn read(f: &Fixture, path: &str) -> Vec<u8> {
        let mut stream = f.engine.get(&f.scope, path).unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn put_then_get_returns_content_and_hash() {
        let f = fixture();
        let result = f
            .engine
            .put(&f.scope, "docs", "a.txt", Cursor::new(b"hello".to_vec()), true)
            .unwrap();

        assert_eq!(result.bytes_written, 5);
        assert_eq!(
            result.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(read(&f, "docs/a.txt"), b"hello");
        assert_eq!(f.engine.get(&f.scope, "docs/a.txt").unwrap().size(), 5);
        assert!(f.base.join("acme/exam/docs/a.txt").is_file());
    }

    #[test]
    fn put_without_hash_reports_sentinel() {
        let f = fixture();
        assert_eq!(put(&f, "", "a.txt", b"x").hash, NO_HASH);
    }

    #[test]
    fn identical_overwrite_creates_no_backup() {
        let f = fixture();
        put(&f, "", "same.txt", b"content");
        put(&f, "", "same.txt", b"content");

        assert!(!f.base.join("acme/exam/.same.txt").exists());
        assert_eq!(read(&f, "same.txt"), b"content");
    }

    #[test]
    fn differing_overwrites_are_numbered() {
        let f = fixture();
        put(&f, "d", "v.txt", b"one");
        put(&f, "d", "v.txt", b"two");
        put(&f, "d", "v.txt", b"three");

        let backups = f.base.join("acme/exam/d/.v.txt");
        assert_eq!(fs::read(backups.join("v.txt_1")).unwrap(), b"one");
        assert_eq!(fs::read(backups.join("v.txt_2")).unwrap(), b"two");
        assert!(!backups.join("v.txt_3").exists());
        assert_eq!(read(&f, "d/v.txt"), b"three");
    }

    #[test]
    fn existing_backup_slots_are_never_overwritten() {
        let f = fixture();
        let backups = f.base.join("acme/exam/.k.txt");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("k.txt_1"), b"kept").unwrap();

        put(&f, "", "k.txt", b"a");
        put(&f, "", "k.txt", b"b");

        assert_eq!(fs::read(backups.join("k.txt_1")).unwrap(), b"kept");
        assert_eq!(fs::read(backups.join("k.txt_2")).unwrap(), b"a");
    }

    #[test]
    fn disabled_backup_replaces_in_place() {
        let mut f = fixture();
        f.engine = StorageEngine::new(&f.base, Arc::new(NoopAuditSink)).with_backup(false);
        put(&f, "", "n.txt", b"one");
        put(&f, "", "n.txt", b"two");

        assert!(!f.base.join("acme/exam/.n.txt").exists());
        assert_eq!(read(&f, "n.txt"), b"two");
    }

    #[test]
    fn type_conflicts_are_detected_before_writing() {
        let f = fixture();
        put(&f, "", "plain", b"file");
        fs::create_dir_all(f.base.join("acme/exam/dir.txt")).unwrap();

        let err = f
            .engine
            .put(&f.scope, "plain", "x.txt", Cursor::new(b"x".to_vec()), false)
            .unwrap_err();
        assert!(matches!(err, StorageError::FolderAlreadyExistsAsFile(_)));

        let err = f
            .engine
            .put(&f.scope, "", "dir.txt", Cursor::new(b"x".to_vec()), false)
            .unwrap_err();
        assert!(matches!(err, StorageError::FileAlreadyExistsAsFolder(_)));

        assert_eq!(read(&f, "plain"), b"file");
        assert!(f.base.join("acme/exam/dir.txt").is_dir());
        assert_eq!(fs::read_dir(f.engine.staging_dir()).unwrap().count(), 0);
    }

    #[test]
    fn list_skips_backups_and_reports_folders() {
        let f = fixture();
        put(&f, "", "listed.txt", b"one");
        put(&f, "", "listed.txt", b"two");
        put(&f, "", "listed.txt", b"three");
        put(&f, "sub", "inner.txt", b"x");

        let mut entries = f.engine.list(&f.scope, "").unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "listed.txt");
        assert_eq!(entries[0].file_type, FileType::File);
        assert_eq!(entries[0].size, 5);
        assert_eq!(entries[1].name, "sub");
        assert_eq!(entries[1].file_type, FileType::Folder);
        assert_eq!(entries[1].size, 0);
    }

    #[test]
    fn list_of_fresh_realm_root_is_empty() {
        let f = fixture();
        assert!(f.engine.list(&f.scope, "").unwrap().is_empty());
        assert!(f.engine.list(&f.scope, "/").unwrap().is_empty());
        assert!(matches!(
            f.engine.list(&f.scope, "missing"),
            Err(StorageError::PathNotFound(_))
        ));
    }

    #[test]
    fn get_of_folder_or_missing_file_is_not_found() {
        let f = fixture();
        put(&f, "folder", "a.txt", b"x");
        assert!(matches!(
            f.engine.get(&f.scope, "folder"),
            Err(StorageError::FileNotFound(_))
        ));
        assert!(matches!(
            f.engine.get(&f.scope, "folder/missing.txt"),
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[test]
    fn delete_is_idempotent_and_recursive() {
        let f = fixture();
        put(&f, "tree/deep", "a.txt", b"x");

        f.engine.delete(&f.scope, "tree").unwrap();
        assert!(!f.base.join("acme/exam/tree").exists());
        f.engine.delete(&f.scope, "tree").unwrap();
        f.engine.delete(&f.scope, "never/existed").unwrap();
    }

    #[test]
    fn traversal_never_leaves_the_scope() {
        let f = fixture();
        fs::create_dir_all(f.base.join("acme/other")).unwrap();
        fs::write(f.base.join("acme/other/secret.txt"), b"s").unwrap();

        // Survives normalization and must be refused.
        assert!(f.engine.get(&f.scope, "..").is_err());
        assert!(f.engine.list(&f.scope, "..").is_err());
        assert!(f.engine.delete(&f.scope, "..").is_err());
        assert!(
            f.engine
                .put(&f.scope, "..", "x.txt", Cursor::new(b"x".to_vec()), false)
                .is_err()
        );

        // Collapse into paths inside the realm.
        assert!(f.engine.get(&f.scope, "../other/secret.txt").is_err());
        f.engine.delete(&f.scope, "a/../../other").unwrap();
        put(&f, "/../../../../../../tmp/", "x.txt", b"x");

        assert!(f.base.join("acme/other/secret.txt").exists());
        assert!(f.base.join("acme/exam/tmp/x.txt").is_file());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let f = fixture();
        for name in ["", ".hidden", "a/b", "bad!name"] {
            assert!(matches!(
                f.engine
                    .put(&f.scope, "", name, Cursor::new(b"x".to_vec()), false),
                Err(StorageError::InvalidPath(_))
            ));
        }
        assert!(matches!(
            f.engine.list(&f.scope, ".x.txt"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symbolic_links_are_refused_unless_allowed() {
        let f = fixture();
        let outside = f.base.join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("leak.txt"), b"leak").unwrap();
        fs::create_dir_all(f.base.join("acme/exam")).unwrap();
        std::os::unix::fs::symlink(&outside, f.base.join("acme/exam/link")).unwrap();

        assert!(matches!(
            f.engine.get(&f.scope, "link/leak.txt"),
            Err(StorageError::AccessDenied(_))
        ));
        assert!(matches!(
            f.engine
                .put(&f.scope, "link", "x.txt", Cursor::new(b"x".to_vec()), false),
            Err(StorageError::AccessDenied(_))
        ));
        assert!(f.engine.list(&f.scope, "").unwrap().is_empty());
        assert!(!outside.join("x.txt").exists());

        let permissive =
            StorageEngine::new(&f.base, Arc::new(NoopAuditSink)).with_symbolic_links(true);
        let mut stream = permissive.get(&f.scope, "link/leak.txt").unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"leak");
    }

    #[test]
    fn concurrent_writers_to_one_path_keep_every_version() {
        const WRITERS: usize = 8;
        let f = Arc::new(fixture());

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let f = Arc::clone(&f);
                thread::spawn(move || {
                    let payload = format!("payload-{i}").repeat(1000);
                    f.engine
                        .put(&f.scope, "race", "c.txt", Cursor::new(payload.into_bytes()), false)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let backups = f.base.join("acme/exam/race/.c.txt");
        let names: Vec<_> = fs::read_dir(&backups)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), WRITERS - 1);
        for n in 1..WRITERS {
            assert!(names.contains(&format!("c.txt_{n}")));
        }

        let final_content = String::from_utf8(read(&f, "race/c.txt")).unwrap();
        assert!((0..WRITERS).any(|i| final_content == format!("payload-{i}").repeat(1000)));
        assert!(f.engine.locks.is_empty());
    }

    #[test]
    fn each_operation_is_audited_once() {
        let sink = Arc::new(RecordingAuditSink::default());
        let f = fixture_with(sink.clone());

        put(&f, "", "a.txt", b"x");
        read(&f, "a.txt");
        f.engine.list(&f.scope, "").unwrap();
        f.engine.delete(&f.scope, "a.txt").unwrap();
        let _ = f.engine.get(&f.scope, "a.txt");

        assert_eq!(
            sink.events(),
            vec![
                EventType::Put,
                EventType::Get,
                EventType::List,
                EventType::Delete,
                EventType::Get
            ]
        );
        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].0, "acme");
        assert_eq!(records[0].2, "subject");
    }

    #[test]
    fn sweep_removes_only_old_staging_files() {
        let f = fixture();
        fs::create_dir_all(f.engine.staging_dir()).unwrap();
        fs::write(f.engine.staging_dir().join("orphan"), b"x").unwrap();

        assert_eq!(f.engine.sweep_staging(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(f.engine.sweep_staging(Duration::ZERO).unwrap(), 1);
        assert_eq!(f.engine.sweep_staging(Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn sweep_leaves_audit_log_of_tenant_named_tmp() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        let audit = Arc::new(FileAuditSink::new(base));
        let engine = StorageEngine::new(base, audit.clone());
        let scope = ScopeResolver::new(base)
            .resolve(&capability("tmp", "exam", "rwd"))
            .unwrap()
            .scope;

        engine
            .put(&scope, "", "a.txt", Cursor::new(b"x".to_vec()), false)
            .unwrap();
        assert_ne!(engine.staging_dir(), base.join("tmp"));
        assert!(
            ScopeResolver::new(base)
                .resolve(&capability(STAGING_DIR_NAME, "exam", "r"))
                .is_err()
        );

        engine.sweep_staging(Duration::ZERO).unwrap();
        assert!(base.join("tmp").join(crate::audit::AUDIT_FILE_NAME).is_file());
        assert_eq!(audit.tail("tmp", 10).unwrap().len(), 1);
        let mut content = Vec::new();
        engine
            .get(&scope, "a.txt")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"x");
    }

    #[test]
    fn readers_see_whole_versions_during_concurrent_puts() {
        const SIZE: usize = 512 * 1024;
        const ROUNDS: usize = 20;
        let old = Arc::new(vec![b'a'; SIZE]);
        let new = Arc::new(vec![b'b'; SIZE]);

        let mut f = fixture();
        f.engine = StorageEngine::new(&f.base, Arc::new(NoopAuditSink)).with_backup(false);
        put(&f, "", "big.bin", &old);
        let f = Arc::new(f);

        let writers: Vec<_> = [old.clone(), new.clone()]
            .into_iter()
            .map(|payload| {
                let f = Arc::clone(&f);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        put(&f, "", "big.bin", &payload);
                    }
                })
            })
            .collect();

        let mut reads = 0;
        while reads < 50 || writers.iter().any(|w| !w.is_finished()) {
            let content = read(&f, "big.bin");
            assert!(
                content == *old || content == *new,
                "read {} bytes of mixed content",
                content.len()
            );
            reads += 1;
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }
}
