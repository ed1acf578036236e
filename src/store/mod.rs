//! Profile persistence.
//!
//! [`ProfileStore`] is the only way the engine reaches durable storage:
//! saved Why and Ikigai profiles plus one resumable session snapshot.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::Utc;

use crate::core::{IkigaiProfile, IkigaiProfileSummary, StoreResult, WhyProfile, WhyProfileSummary};
use crate::session::SessionSnapshot;

/// Storage for profiles and the temporary session snapshot.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace by id.
    async fn save_why(&self, profile: &WhyProfile) -> StoreResult<()>;
    async fn load_why(&self, id: &str) -> StoreResult<WhyProfile>;
    /// Newest first.
    async fn list_why(&self) -> StoreResult<Vec<WhyProfileSummary>>;
    async fn delete_why(&self, id: &str) -> StoreResult<()>;
    async fn rename_why(&self, id: &str, name: &str) -> StoreResult<WhyProfile>;

    async fn save_ikigai(&self, profile: &IkigaiProfile) -> StoreResult<()>;
    async fn load_ikigai(&self, id: &str) -> StoreResult<IkigaiProfile>;
    async fn list_ikigai(&self) -> StoreResult<Vec<IkigaiProfileSummary>>;
    async fn delete_ikigai(&self, id: &str) -> StoreResult<()>;
    async fn rename_ikigai(&self, id: &str, name: &str) -> StoreResult<IkigaiProfile>;

    /// Replace the snapshot, stamping `last_updated`.
    async fn save_temp_state(&self, snapshot: &SessionSnapshot) -> StoreResult<()>;
    async fn load_temp_state(&self) -> StoreResult<Option<SessionSnapshot>>;
    async fn clear_temp_state(&self) -> StoreResult<()>;
}

/// A saved profile addressed by id.
pub(crate) trait StoredProfile: Clone {
    fn id(&self) -> &str;
    fn rename(&mut self, name: &str);
}

impl StoredProfile for WhyProfile {
    fn id(&self) -> &str {
        &self.id
    }

    fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.updated_at = Some(Utc::now());
    }
}

impl StoredProfile for IkigaiProfile {
    fn id(&self) -> &str {
        &self.id
    }

    fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.updated_at = Some(Utc::now());
    }
}

pub(crate) fn upsert<T: StoredProfile>(profiles: &mut Vec<T>, profile: &T) {
    match profiles.iter_mut().find(|p| p.id() == profile.id()) {
        Some(existing) => *existing = profile.clone(),
        None => profiles.push(profile.clone()),
    }
}

pub(crate) fn find<T: StoredProfile>(profiles: &[T], id: &str) -> Option<T> {
    profiles.iter().find(|p| p.id() == id).cloned()
}

/// Remove by id, returning whether anything was removed.
pub(crate) fn remove<T: StoredProfile>(profiles: &mut Vec<T>, id: &str) -> bool {
    let before = profiles.len();
    profiles.retain(|p| p.id() != id);
    profiles.len() != before
}

pub(crate) fn rename<T: StoredProfile>(profiles: &mut [T], id: &str, name: &str) -> Option<T> {
    let profile = profiles.iter_mut().find(|p| p.id() == id)?;
    profile.rename(name);
    Some(profile.clone())
}
