//! JSON file-backed job store with atomic writes.

use std::path::PathBuf;

use {async_trait::async_trait, tokio::fs, tokio::sync::Mutex};

use crate::{error::Result, store::JobStore, types::Job};

/// File-backed store: all jobs in a single JSON file.
///
/// Every mutation is a whole-file read-modify-write serialized by a mutex,
/// so concurrent saves cannot interleave and lose entries. Writes go through
/// a temp file and rename, keeping a `.bak` of the previous contents.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_jobs(&self) -> Result<Vec<Job>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn write_jobs(&self, jobs: &[Job]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let bak = self.path.with_extension("json.bak");
            let _ = fs::rename(&self.path, &bak).await;
        }
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn save(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        if let Some(pos) = jobs.iter().position(|j| j.id == job.id) {
            jobs[pos] = job.clone();
        } else {
            jobs.push(job.clone());
        }
        self.write_jobs(&jobs).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Ok(()); // absent id is a no-op
        }
        self.write_jobs(&jobs).await
    }

    async fn load_all(&self) -> Result<Vec<Job>> {
        let _guard = self.write_lock.lock().await;
        self.read_jobs().await
    }
}
