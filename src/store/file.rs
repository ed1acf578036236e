//! JSON file store.
//!
//! One file per collection under the data directory. Writes are whole-file
//! rewrites serialized by a lock.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::{find, remove, rename, upsert, ProfileStore, StoredProfile};
use crate::core::{
    IkigaiProfile, IkigaiProfileSummary, StoreError, StoreResult, WhyProfile, WhyProfileSummary,
};
use crate::session::SessionSnapshot;

const WHY_FILE: &str = "why_profiles.json";
const IKIGAI_FILE: &str = "ikigai_profiles.json";
const TEMP_FILE: &str = "temp_state.json";

/// Profile store backed by JSON files.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. Nothing is created until the first save.
    pub fn with_path(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> StoreResult<Option<T>> {
        let path = self.path(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> StoreResult<()> {
        let path = self.path(file);
        let content = serde_json::to_string_pretty(value)?;

        // Ensure parent directory exists
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io { path: self.dir.clone(), source })?;

        tokio::fs::write(&path, content).await.map_err(|source| StoreError::Io { path, source })
    }

    async fn read_list<T: DeserializeOwned>(&self, file: &str) -> StoreResult<Vec<T>> {
        Ok(self.read(file).await?.unwrap_or_default())
    }

    async fn save_profile<T>(&self, file: &str, profile: &T) -> StoreResult<()>
    where
        T: StoredProfile + Serialize + DeserializeOwned,
    {
        let _guard = self.write_lock.lock().await;
        let mut profiles: Vec<T> = self.read_list(file).await?;
        upsert(&mut profiles, profile);
        self.write(file, &profiles).await?;
        tracing::info!(id = profile.id(), file, "Profile saved");
        Ok(())
    }

    async fn load_profile<T>(&self, file: &str, id: &str) -> StoreResult<T>
    where
        T: StoredProfile + DeserializeOwned,
    {
        let profiles: Vec<T> = self.read_list(file).await?;
        find(&profiles, id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete_profile<T>(&self, file: &str, id: &str) -> StoreResult<()>
    where
        T: StoredProfile + Serialize + DeserializeOwned,
    {
        let _guard = self.write_lock.lock().await;
        let mut profiles: Vec<T> = self.read_list(file).await?;
        if !remove(&mut profiles, id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.write(file, &profiles).await
    }

    async fn rename_profile<T>(&self, file: &str, id: &str, name: &str) -> StoreResult<T>
    where
        T: StoredProfile + Serialize + DeserializeOwned,
    {
        let _guard = self.write_lock.lock().await;
        let mut profiles: Vec<T> = self.read_list(file).await?;
        let renamed = rename(&mut profiles, id, name).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.write(file, &profiles).await?;
        Ok(renamed)
    }
}

#[async_trait]
impl ProfileStore for JsonFileStore {
    async fn save_why(&self, profile: &WhyProfile) -> StoreResult<()> {
        self.save_profile(WHY_FILE, profile).await
    }

    async fn load_why(&self, id: &str) -> StoreResult<WhyProfile> {
        self.load_profile(WHY_FILE, id).await
    }

    async fn list_why(&self) -> StoreResult<Vec<WhyProfileSummary>> {
        let mut profiles: Vec<WhyProfile> = self.read_list(WHY_FILE).await?;
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles.iter().map(WhyProfile::summary_view).collect())
    }

    async fn delete_why(&self, id: &str) -> StoreResult<()> {
        self.delete_profile::<WhyProfile>(WHY_FILE, id).await
    }

    async fn rename_why(&self, id: &str, name: &str) -> StoreResult<WhyProfile> {
        self.rename_profile(WHY_FILE, id, name).await
    }

    async fn save_ikigai(&self, profile: &IkigaiProfile) -> StoreResult<()> {
        self.save_profile(IKIGAI_FILE, profile).await
    }

    async fn load_ikigai(&self, id: &str) -> StoreResult<IkigaiProfile> {
        self.load_profile(IKIGAI_FILE, id).await
    }

    async fn list_ikigai(&self) -> StoreResult<Vec<IkigaiProfileSummary>> {
        let mut profiles: Vec<IkigaiProfile> = self.read_list(IKIGAI_FILE).await?;
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles.iter().map(IkigaiProfile::summary_view).collect())
    }

    async fn delete_ikigai(&self, id: &str) -> StoreResult<()> {
        self.delete_profile::<IkigaiProfile>(IKIGAI_FILE, id).await
    }

    async fn rename_ikigai(&self, id: &str, name: &str) -> StoreResult<IkigaiProfile> {
        self.rename_profile(IKIGAI_FILE, id, name).await
    }

    async fn save_temp_state(&self, snapshot: &SessionSnapshot) -> StoreResult<()> {
        let mut snapshot = snapshot.clone();
        snapshot.last_updated = Utc::now();
        let _guard = self.write_lock.lock().await;
        self.write(TEMP_FILE, &snapshot).await
    }

    async fn load_temp_state(&self) -> StoreResult<Option<SessionSnapshot>> {
        self.read(TEMP_FILE).await
    }

    async fn clear_temp_state(&self) -> StoreResult<()> {
        let path = self.path(TEMP_FILE);
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}
