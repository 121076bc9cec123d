//! File backend for the record store.

use crate::store::{STORE_VERSION, Store};
use anyhow::{Context, Result, bail};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persists a [`Store`] as JSON on disk.
///
/// The file only ever contains envelopes and plaintext metadata, so it is
/// written without an outer encryption layer.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Loads the store, or an empty one if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// was written by a newer layout version.
    pub fn load_store(&self) -> Result<Store> {
        if !self.exists() {
            debug!(path = %self.path.display(), "no store file; starting empty");
            return Ok(Store::new());
        }

        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let version = serde_json::from_slice::<serde_json::Value>(&data)
            .context("store file is not valid JSON")?
            .get("version")
            .and_then(|v| v.as_u64())
            .context("store file has no version")?;
        if version != STORE_VERSION as u64 {
            bail!("unsupported store version: {version}");
        }

        let store: Store =
            serde_json::from_slice(&data).context("failed to deserialize store file")?;
        debug!(records = store.len(), "store loaded");
        Ok(store)
    }

    pub fn save_store(&self, store: &Store) -> Result<()> {
        let data = serde_json::to_vec_pretty(store)?;
        self.save(&data)?;
        debug!(records = store.len(), "store saved");
        Ok(())
    }

    /// Writes `data` crash-safely: temp file, fsync, atomic rename, fsync
    /// of the parent directory. Creates parent directories as needed.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// `<file name>.tmp.<16 hex chars>` next to the target.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .context("store path has no file name")?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{rand_string}")))
    }

    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW,
        };

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are null-terminated UTF-16 and outlive the call.
        let result = unsafe {
            MoveFileExW(
                tmp_w.as_ptr(),
                target_w.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
