//! In-process store for tests and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{find, remove, rename, upsert, ProfileStore};
use crate::core::{
    IkigaiProfile, IkigaiProfileSummary, StoreError, StoreResult, WhyProfile, WhyProfileSummary,
};
use crate::session::SessionSnapshot;

#[derive(Debug, Default)]
struct Data {
    why: Vec<WhyProfile>,
    ikigai: Vec<IkigaiProfile>,
    temp: Option<SessionSnapshot>,
}

/// Profile store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(id.to_string())
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn save_why(&self, profile: &WhyProfile) -> StoreResult<()> {
        upsert(&mut self.data.lock().why, profile);
        Ok(())
    }

    async fn load_why(&self, id: &str) -> StoreResult<WhyProfile> {
        find(&self.data.lock().why, id).ok_or_else(|| not_found(id))
    }

    async fn list_why(&self) -> StoreResult<Vec<WhyProfileSummary>> {
        let mut profiles = self.data.lock().why.clone();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles.iter().map(WhyProfile::summary_view).collect())
    }

    async fn delete_why(&self, id: &str) -> StoreResult<()> {
        if remove(&mut self.data.lock().why, id) {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn rename_why(&self, id: &str, name: &str) -> StoreResult<WhyProfile> {
        rename(&mut self.data.lock().why, id, name).ok_or_else(|| not_found(id))
    }

    async fn save_ikigai(&self, profile: &IkigaiProfile) -> StoreResult<()> {
        upsert(&mut self.data.lock().ikigai, profile);
        Ok(())
    }

    async fn load_ikigai(&self, id: &str) -> StoreResult<IkigaiProfile> {
        find(&self.data.lock().ikigai, id).ok_or_else(|| not_found(id))
    }

    async fn list_ikigai(&self) -> StoreResult<Vec<IkigaiProfileSummary>> {
        let mut profiles = self.data.lock().ikigai.clone();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles.iter().map(IkigaiProfile::summary_view).collect())
    }

    async fn delete_ikigai(&self, id: &str) -> StoreResult<()> {
        if remove(&mut self.data.lock().ikigai, id) {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn rename_ikigai(&self, id: &str, name: &str) -> StoreResult<IkigaiProfile> {
        rename(&mut self.data.lock().ikigai, id, name).ok_or_else(|| not_found(id))
    }

    async fn save_temp_state(&self, snapshot: &SessionSnapshot) -> StoreResult<()> {
        let mut snapshot = snapshot.clone();
        snapshot.last_updated = Utc::now();
        self.data.lock().temp = Some(snapshot);
        Ok(())
    }

    async fn load_temp_state(&self) -> StoreResult<Option<SessionSnapshot>> {
        Ok(self.data.lock().temp.clone())
    }

    async fn clear_temp_state(&self) -> StoreResult<()> {
        self.data.lock().temp = None;
        Ok(())
    }
}
