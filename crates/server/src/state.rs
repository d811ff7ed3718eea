use std::sync::Arc;

use db::DBService;
use services::services::{
    config::AppConfig, file_storage::FileStorage, notes::NoteService, query_cache::QueryCache,
    realtime::RealtimeHub,
};

/// Shared handles passed to every route.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    config: Arc<AppConfig>,
    cache: QueryCache,
    storage: FileStorage,
    notes: NoteService,
    hub: RealtimeHub,
}

impl AppState {
    pub fn new(db: DBService, config: AppConfig) -> Self {
        let storage = FileStorage::new(config.storage_dir.clone(), config.public_base_url.clone());
        let notes = NoteService::new(storage.clone(), config.notes_grid);
        Self {
            db,
            config: Arc::new(config),
            cache: QueryCache::default(),
            storage,
            notes,
            hub: RealtimeHub::default(),
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn notes(&self) -> &NoteService {
        &self.notes
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }
}
