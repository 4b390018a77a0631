//! Directory-per-session artifact store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<session-id>/upload/<original file name>
//! <root>/<session-id>/results.bin
//! ```
//!
//! `results.bin` holds predictions, the optional overlay base and metadata as a
//! single bincode record. It is written to a temporary file and renamed into
//! place, so a reader never observes a partial result set.
//!
//! Saves, deletes and sweep removals of the same session are serialized by a
//! per-session mutex. The mutex is process-local; two processes sharing one
//! store root can still interleave a delete with a save.

use crate::core::errors::{SegError, SegResult};
use crate::domain::source::{SessionMetadata, SourceRecord};
use crate::session::cleanup::SweepReport;
use crate::utils::loader::load_source_file;
use chrono::{DateTime, Utc};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPLOAD_DIR: &str = "upload";
const RESULTS_FILE: &str = "results.bin";
const RESULTS_TMP_FILE: &str = "results.bin.tmp";

/// A validated session identifier (canonical hyphenated UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parses an identifier, returning `None` if it is not a UUID.
    pub fn parse(id: &str) -> Option<Self> {
        Uuid::parse_str(id).ok().map(|uuid| Self(uuid.to_string()))
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted segmentation results of one session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultsRecord {
    /// Class indices, (H, W, D) for volumes and (H, W) for images.
    pub predictions: ArrayD<u8>,
    /// Normalized source at display resolution, used as the overlay base.
    pub original: Option<ArrayD<f32>>,
    pub metadata: SessionMetadata,
    pub saved_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ResultsRecordRef<'a> {
    predictions: &'a ArrayD<u8>,
    original: Option<&'a ArrayD<f32>>,
    metadata: &'a SessionMetadata,
    saved_at: DateTime<Utc>,
}

/// File-system backed session store.
#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> SegResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("session store at {}", root.display());
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a new session and its directory.
    pub fn create_session(&self) -> SegResult<SessionId> {
        loop {
            let id = SessionId::generate();
            let dir = self.dir_of(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!("created session {}", id);
                    return Ok(id);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dir_of(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn resolve(&self, session_id: &str) -> SegResult<(SessionId, PathBuf)> {
        let id = SessionId::parse(session_id)
            .ok_or_else(|| SegError::not_found(session_id, "session"))?;
        let dir = self.dir_of(&id);
        if !dir.is_dir() {
            return Err(SegError::not_found(session_id, "session"));
        }
        Ok((id, dir))
    }

    fn session_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(id.as_str().to_string()).or_default())
    }

    fn guard(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn forget_lock(&self, id: &SessionId) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(id.as_str());
    }

    /// Returns `true` if the session directory exists.
    pub fn exists(&self, session_id: &str) -> bool {
        self.resolve(session_id).is_ok()
    }

    /// Returns `true` if a complete result set has been saved.
    pub fn has_results(&self, session_id: &str) -> bool {
        self.resolve(session_id)
            .map(|(_, dir)| dir.join(RESULTS_FILE).is_file())
            .unwrap_or(false)
    }

    /// Writes the uploaded bytes under the session.
    ///
    /// Only the final component of `filename` is used.
    pub fn save_upload(&self, session_id: &str, bytes: &[u8], filename: &str) -> SegResult<PathBuf> {
        let (_, dir) = self.resolve(session_id)?;
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SegError::validation(format!("invalid upload file name '{}'", filename)))?;
        let upload_dir = dir.join(UPLOAD_DIR);
        fs::create_dir_all(&upload_dir)?;
        let path = upload_dir.join(name);
        fs::write(&path, bytes)?;
        debug!("saved {} byte upload '{}' to session {}", bytes.len(), name, session_id);
        Ok(path)
    }

    /// Path of the session's uploaded file.
    pub fn upload_path(&self, session_id: &str) -> SegResult<PathBuf> {
        let (_, dir) = self.resolve(session_id)?;
        let entries = match fs::read_dir(dir.join(UPLOAD_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SegError::not_found(session_id, "upload"));
            }
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                return Ok(entry.path());
            }
        }
        Err(SegError::not_found(session_id, "upload"))
    }

    /// Parses the session's upload.
    pub fn load_source(&self, session_id: &str) -> SegResult<SourceRecord> {
        let path = self.upload_path(session_id)?;
        load_source_file(&path)
    }

    /// Persists predictions, the optional overlay base and metadata.
    pub fn save_results(
        &self,
        session_id: &str,
        predictions: &ArrayD<u8>,
        original: Option<&ArrayD<f32>>,
        metadata: &SessionMetadata,
    ) -> SegResult<()> {
        let (id, dir) = self.resolve(session_id)?;
        let record = ResultsRecordRef {
            predictions,
            original,
            metadata,
            saved_at: Utc::now(),
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| SegError::serialization("failed to encode results", e))?;

        let lock = self.session_lock(&id);
        let _guard = Self::guard(&lock);
        if !dir.is_dir() {
            return Err(SegError::not_found(session_id, "session"));
        }
        let tmp = dir.join(RESULTS_TMP_FILE);
        fs::write(&tmp, &encoded)?;
        fs::rename(&tmp, dir.join(RESULTS_FILE))?;
        debug!("saved {} bytes of results for session {}", encoded.len(), session_id);
        Ok(())
    }

    /// Loads the saved result set.
    ///
    /// # Errors
    ///
    /// [`SegError::NotFound`] when the session or its results are absent.
    pub fn load_results(&self, session_id: &str) -> SegResult<ResultsRecord> {
        let (_, dir) = self.resolve(session_id)?;
        let bytes = match fs::read(dir.join(RESULTS_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SegError::not_found(session_id, "results"));
            }
            Err(e) => return Err(e.into()),
        };
        bincode::deserialize(&bytes)
            .map_err(|e| SegError::serialization(format!("corrupt results for session {}", session_id), e))
    }

    /// Removes a session and everything under it.
    ///
    /// Returns `Ok(false)` if the session did not exist.
    pub fn delete_session(&self, session_id: &str) -> SegResult<bool> {
        let Some(id) = SessionId::parse(session_id) else {
            return Ok(false);
        };
        let lock = self.session_lock(&id);
        let removed = {
            let _guard = Self::guard(&lock);
            match fs::remove_dir_all(self.dir_of(&id)) {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(e.into()),
            }
        };
        self.forget_lock(&id);
        if removed {
            info!("deleted session {}", id);
        }
        Ok(removed)
    }

    /// Identifiers of all sessions currently on disk.
    pub fn list_sessions(&self) -> SegResult<Vec<SessionId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let Ok(entry) = entry else { continue };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if let (true, Some(id)) = (is_dir, entry.file_name().to_str().and_then(SessionId::parse)) {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Most recent modification time of the session directory or any file in it.
    pub fn last_modified(&self, session_id: &str) -> SegResult<SystemTime> {
        let (_, dir) = self.resolve(session_id)?;
        Ok(newest_mtime(&dir)?)
    }

    /// Removes sessions not modified within `retention` of the current time.
    pub fn sweep_expired(&self, retention: Duration) -> SweepReport {
        self.sweep_expired_at(SystemTime::now(), retention)
    }

    /// Removes sessions whose last modification is strictly older than
    /// `now - retention`.
    ///
    /// Failures on individual sessions are logged and counted, never returned.
    /// Sessions that disappear during the sweep are skipped.
    pub fn sweep_expired_at(&self, now: SystemTime, retention: Duration) -> SweepReport {
        let Some(cutoff) = now.checked_sub(retention) else {
            return SweepReport::default();
        };
        match self.list_sessions() {
            Ok(ids) => self.sweep_listed(&ids, cutoff),
            Err(e) => {
                warn!("expiry sweep could not list {}: {}", self.root.display(), e);
                SweepReport {
                    failed: 1,
                    ..SweepReport::default()
                }
            }
        }
    }

    fn sweep_listed(&self, ids: &[SessionId], cutoff: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        for id in ids {
            report.scanned += 1;
            match newest_mtime(&self.dir_of(id)) {
                Ok(modified) if modified >= cutoff => continue,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("expiry sweep could not stat session {}: {}", id, e);
                    report.failed += 1;
                    continue;
                }
            }

            match self.remove_if_expired(id, cutoff) {
                Ok(true) => {
                    debug!("expired session {}", id);
                    report.removed += 1;
                }
                Ok(false) => debug!("session {} was touched during the sweep", id),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("expiry sweep could not remove session {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Removes the session if it is still older than `cutoff` once its lock
    /// is held.
    fn remove_if_expired(&self, id: &SessionId, cutoff: SystemTime) -> std::io::Result<bool> {
        let dir = self.dir_of(id);
        let lock = self.session_lock(id);
        let outcome = {
            let _guard = Self::guard(&lock);
            match newest_mtime(&dir) {
                Ok(modified) if modified >= cutoff => Ok(false),
                Ok(_) => fs::remove_dir_all(&dir).map(|()| true),
                Err(e) => Err(e),
            }
        };
        if !matches!(outcome, Ok(false)) {
            self.forget_lock(id);
        }
        outcome
    }
}

fn newest_mtime(path: &Path) -> std::io::Result<SystemTime> {
    let mut newest = fs::metadata(path)?.modified()?;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let modified = if metadata.is_dir() {
            newest_mtime(&entry.path())?
        } else {
            metadata.modified()?
        };
        newest = newest.max(modified);
    }
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::{SourceKind, SpatialTransform};
    use ndarray::IxDyn;
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions")).unwrap();
        (dir, store)
    }

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            kind: SourceKind::Volume,
            dimensions: vec![4, 4, 2],
            num_slices: 2,
            spatial_transform: Some(SpatialTransform::identity()),
            filename: "scan.nii.gz".to_string(),
        }
    }

    #[test]
    fn test_session_ids_are_unique_and_validated() {
        let (_dir, store) = store();
        let a = store.create_session().unwrap();
        let b = store.create_session().unwrap();
        assert_ne!(a, b);
        assert!(store.exists(a.as_str()));
        assert!(!store.exists("../etc"));
        assert!(!store.exists(&Uuid::new_v4().to_string()));
        assert_eq!(store.list_sessions().unwrap().len(), 2);
    }

    #[test]
    fn test_upload_uses_file_name_component() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        let path = store
            .save_upload(id.as_str(), b"abc", "../../outside/scan.png")
            .unwrap();
        assert!(path.starts_with(store.root()));
        assert_eq!(path.file_name().unwrap(), "scan.png");
        assert_eq!(store.upload_path(id.as_str()).unwrap(), path);
    }

    #[test]
    fn test_missing_upload_is_not_found() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        assert!(store.upload_path(id.as_str()).unwrap_err().is_not_found());
        assert!(store.load_source(id.as_str()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_results_round_trip() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        assert!(!store.has_results(id.as_str()));
        assert!(store.load_results(id.as_str()).unwrap_err().is_not_found());

        let predictions = ArrayD::from_shape_fn(IxDyn(&[4, 4, 2]), |ix| (ix[0] + ix[2]) as u8);
        let original = ArrayD::from_shape_fn(IxDyn(&[4, 4, 2]), |ix| ix[1] as f32 / 3.0);
        store
            .save_results(id.as_str(), &predictions, Some(&original), &metadata())
            .unwrap();
        assert!(store.has_results(id.as_str()));

        let record = store.load_results(id.as_str()).unwrap();
        assert_eq!(record.predictions, predictions);
        assert_eq!(record.original, Some(original));
        assert_eq!(record.metadata, metadata());
        assert!(!store.root().join(id.as_str()).join(RESULTS_TMP_FILE).exists());
    }

    #[test]
    fn test_results_without_original() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        let predictions = ArrayD::zeros(IxDyn(&[3, 3]));
        store
            .save_results(id.as_str(), &predictions, None, &metadata())
            .unwrap();
        assert_eq!(store.load_results(id.as_str()).unwrap().original, None);
    }

    #[test]
    fn test_delete_session() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        store.save_upload(id.as_str(), b"x", "a.png").unwrap();
        assert!(store.delete_session(id.as_str()).unwrap());
        assert!(!store.exists(id.as_str()));
        assert!(!store.delete_session(id.as_str()).unwrap());
        assert!(!store.delete_session("not-a-uuid").unwrap());
        let err = store
            .save_results(id.as_str(), &ArrayD::zeros(IxDyn(&[1, 1])), None, &metadata())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_sweep_boundary_is_strict() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        store.save_upload(id.as_str(), b"x", "a.png").unwrap();
        let modified = store.last_modified(id.as_str()).unwrap();
        let retention = Duration::from_secs(3600);

        let report = store.sweep_expired_at(modified + retention, retention);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.removed, 0);
        assert!(store.exists(id.as_str()));

        let report = store.sweep_expired_at(modified + retention + Duration::from_millis(1), retention);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 0);
        assert!(!store.exists(id.as_str()));
    }

    #[test]
    fn test_sweep_keeps_fresh_sessions_and_ignores_strays() {
        let (_dir, store) = store();
        let fresh = store.create_session().unwrap();
        fs::create_dir(store.root().join("not-a-session")).unwrap();
        fs::write(store.root().join("stray.txt"), b"x").unwrap();

        let report = store.sweep_expired(Duration::from_secs(3600));
        assert_eq!(report.scanned, 1);
        assert_eq!(report.removed, 0);
        assert!(store.exists(fresh.as_str()));
        assert!(store.root().join("not-a-session").exists());
    }

    #[test]
    fn test_sweep_skips_sessions_deleted_mid_sweep() {
        let (_dir, store) = store();
        let ids: Vec<SessionId> = (0..3).map(|_| store.create_session().unwrap()).collect();
        let listed = store.list_sessions().unwrap();
        assert_eq!(listed.len(), 3);

        fs::remove_dir_all(store.root().join(ids[1].as_str())).unwrap();
        let cutoff = SystemTime::now() + Duration::from_secs(3600);
        let report = store.sweep_listed(&listed, cutoff);

        assert_eq!(report.scanned, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 0);
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_removal_rechecks_age_under_lock() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        store.save_upload(id.as_str(), b"x", "a.png").unwrap();

        assert!(!store.remove_if_expired(&id, SystemTime::UNIX_EPOCH).unwrap());
        assert!(store.exists(id.as_str()));

        let later = SystemTime::now() + Duration::from_secs(3600);
        assert!(store.remove_if_expired(&id, later).unwrap());
        assert!(!store.exists(id.as_str()));

        let err = store.remove_if_expired(&id, later).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_racing_save_leaves_consistent_state() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let predictions = ArrayD::from_shape_fn(IxDyn(&[16, 16, 4]), |ix| ix[2] as u8);

        for _ in 0..20 {
            let id = store.create_session().unwrap();
            let saver = {
                let store = Arc::clone(&store);
                let id = id.clone();
                let predictions = predictions.clone();
                std::thread::spawn(move || {
                    let _ = store.save_results(id.as_str(), &predictions, None, &metadata());
                })
            };
            let deleter = {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || store.delete_session(id.as_str()).unwrap())
            };
            saver.join().unwrap();
            deleter.join().unwrap();

            let dir = store.root().join(id.as_str());
            if dir.exists() {
                assert_eq!(store.load_results(id.as_str()).unwrap().predictions, predictions);
                assert!(!dir.join(RESULTS_TMP_FILE).exists());
            }
        }
    }
}
