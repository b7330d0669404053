//! Single-slot token storage
//!
//! Holds at most one [`TokenRecord`] as a JSON file in the per-user config
//! directory. Every write replaces the whole record via temp file + rename,
//! so a crash mid-write leaves the previous record intact and readers never
//! observe a half-written file. A tokio Mutex serializes writers sharing one
//! store; every write gets its own temp file, so separate stores on the same
//! path only race on the final rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{APP_DIR_NAME, TOKEN_FILE_NAME};
use crate::error::{Error, Result};
use crate::record::TokenRecord;

/// Attempts at finding an unused temp file name before giving up.
const TEMP_NAME_ATTEMPTS: u32 = 16;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-backed store for the single token record.
///
/// The store only moves bytes; deciding when to write belongs to the
/// lifecycle manager.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TokenStore {
    /// Store backed by an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the platform default location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    /// `<config dir>/google-apps-script-mcp/tokens.json`
    ///
    /// The config dir is `~/.config` on Linux, `~/Library/Application Support`
    /// on macOS and `%APPDATA%` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::BaseDirs::new().ok_or_else(|| {
            Error::Persistence("could not determine the user's home directory".into())
        })?;
        Ok(dirs.config_dir().join(APP_DIR_NAME).join(TOKEN_FILE_NAME))
    }

    /// Resolved storage path. Pure; touches no files.
    pub fn locate(&self) -> &Path {
        &self.path
    }

    /// Read the stored record.
    ///
    /// `Ok(None)` means no file exists. An unreadable or corrupt file is an
    /// [`Error::Persistence`], never silently treated as absent.
    pub async fn load(&self) -> Result<Option<TokenRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored tokens");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "reading token file {}: {e}",
                    self.path.display()
                )));
            }
        };

        let record: TokenRecord = serde_json::from_str(&contents).map_err(|e| {
            Error::Persistence(format!(
                "token file {} is corrupt: {e}",
                self.path.display()
            ))
        })?;
        debug!(path = %self.path.display(), saved_at = record.saved_at, "loaded tokens");
        Ok(Some(record))
    }

    /// Replace the stored record.
    ///
    /// Creates the parent directory (mode 0700 on unix) when missing. The
    /// file is written owner read/write only (0600).
    pub async fn save(&self, record: &TokenRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, record).await?;
        info!(path = %self.path.display(), "tokens saved");
        Ok(())
    }

    /// Delete the stored record. Deleting an absent record is not an error.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "stored tokens cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "removing token file {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Write the record atomically.
///
/// Writes to a freshly created temporary file in the same directory, then
/// renames it over the target. Temp names are unique per process and per
/// write, and are opened with `create_new`, so concurrent writers never
/// share a temp file. The temp file is created 0600 so token bytes are never
/// readable by other users, even before the rename.
async fn write_atomic(path: &Path, record: &TokenRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .map_err(|e| Error::Persistence(format!("serializing tokens: {e}")))?;

    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .ok_or_else(|| Error::Persistence("token path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Persistence("token path has no file name".into()))?
        .to_string_lossy();

    create_private_dir(dir).await?;

    let (tmp_path, mut file) = create_temp_file(dir, &file_name).await?;
    if let Err(e) = write_and_sync(&mut file, &json).await {
        drop(file);
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Persistence(format!(
            "renaming temp token file into place: {e}"
        )));
    }

    debug!(path = %path.display(), "persisted tokens");
    Ok(())
}

async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| Error::Persistence(format!("creating {}: {e}", dir.display())))
}

/// Create `.{file_name}.tmp.{pid}.{seq}` exclusively, retrying on a name
/// left behind by a crashed run.
async fn create_temp_file(dir: &Path, file_name: &str) -> Result<(PathBuf, tokio::fs::File)> {
    let pid = std::process::id();
    let mut last_err = None;
    for _ in 0..TEMP_NAME_ATTEMPTS {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = dir.join(format!(".{file_name}.tmp.{pid}.{seq}"));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        match options.open(&tmp_path).await {
            Ok(file) => return Ok((tmp_path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => last_err = Some(e),
            Err(e) => {
                return Err(Error::Persistence(format!("creating temp token file: {e}")));
            }
        }
    }
    Err(Error::Persistence(format!(
        "creating temp token file: {}",
        last_err.map_or_else(|| "no free name".to_string(), |e| e.to_string())
    )))
}

async fn write_and_sync(file: &mut tokio::fs::File, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes)
        .await
        .map_err(|e| Error::Persistence(format!("writing temp token file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Persistence(format!("syncing temp token file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_record(suffix: &str) -> TokenRecord {
        TokenRecord {
            access_token: format!("at_{suffix}"),
            refresh_token: Some(format!("rt_{suffix}")),
            token_type: "Bearer".into(),
            expires_at: 1_735_500_000_000,
            scope: "https://www.googleapis.com/auth/script.projects".into(),
            saved_at: 1_735_496_400_000,
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("nested").join("tokens.json"))
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = test_record("1");

        store.save(&record).await.unwrap();
        let loaded = store.load().await.unwrap().expect("record present");
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn load_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = TokenStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(ref m) if m.contains("corrupt")), "got {err:?}");
    }

    #[tokio::test]
    async fn save_replaces_previous_record_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&test_record("1")).await.unwrap();
        let mut second = test_record("2");
        second.refresh_token = None;
        store.save(&second).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "at_2");
        assert!(loaded.refresh_token.is_none());
    }

    #[tokio::test]
    async fn clear_removes_record_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_record("1")).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    /// A 250-byte file name is legal, but its temp name exceeds NAME_MAX,
    /// so every save fails while loads still work.
    fn unwritable_token_path(dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", "t".repeat(245)))
    }

    #[tokio::test]
    async fn save_failure_leaves_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = unwritable_token_path(dir.path());
        tokio::fs::write(&path, serde_json::to_vec(&test_record("1")).unwrap())
            .await
            .unwrap();
        let store = TokenStore::new(&path);

        let err = store.save(&test_record("2")).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(ref m) if m.contains("temp")), "got {err:?}");
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "at_1");
    }

    #[tokio::test]
    async fn stale_temp_file_does_not_block_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let seq = TEMP_SEQ.load(Ordering::Relaxed);
        for n in seq..seq + 4 {
            let stale = dir.path().join(format!(".tokens.json.tmp.{}.{n}", std::process::id()));
            tokio::fs::create_dir(&stale).await.unwrap();
        }

        let store = TokenStore::new(&path);
        store.save(&test_record("1")).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "at_1");
    }

    #[test]
    fn locate_returns_configured_path() {
        let store = TokenStore::new("/tmp/gas/tokens.json");
        assert_eq!(store.locate(), Path::new("/tmp/gas/tokens.json"));
    }

    #[test]
    fn default_path_ends_with_app_dir() {
        if let Ok(path) = TokenStore::default_path() {
            assert!(path.ends_with(Path::new(APP_DIR_NAME).join(TOKEN_FILE_NAME)));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_record("1")).await.unwrap();

        let metadata = tokio::fs::metadata(store.locate()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");

        let dir_mode = tokio::fs::metadata(store.locate().parent().unwrap())
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "token dir must be 0700, got {dir_mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save(&test_record(&i.to_string())).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Last writer wins, and the file is always a complete record
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.access_token.starts_with("at_"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn independent_stores_on_same_path_never_expose_partial_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let first = Arc::new(TokenStore::new(&path));
        let second = Arc::new(TokenStore::new(&path));

        let mut large = test_record("large");
        large.scope = "https://www.googleapis.com/auth/drive ".repeat(110);
        assert!(large.scope.len() > 4096);
        let small = test_record("small");

        for _ in 0..200 {
            let (a, b, read) = tokio::join!(
                tokio::spawn({
                    let store = first.clone();
                    let record = large.clone();
                    async move { store.save(&record).await }
                }),
                tokio::spawn({
                    let store = second.clone();
                    let record = small.clone();
                    async move { store.save(&record).await }
                }),
                tokio::spawn({
                    let store = second.clone();
                    async move { store.load().await }
                }),
            );
            a.unwrap().unwrap();
            b.unwrap().unwrap();
            read.unwrap().unwrap();

            let loaded = first.load().await.unwrap().unwrap();
            assert!(loaded == large || loaded == small, "unexpected record {loaded:?}");
        }

        // No temp files are left behind
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = vec![];
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["tokens.json".to_string()]);
    }
}
