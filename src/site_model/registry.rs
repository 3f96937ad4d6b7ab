use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use futures::future::{self, BoxFuture};
use log::debug;
use uuid::Uuid;

use super::{DesignExistenceMapProvider, ExistenceMapKind, SiteModel, SiteModelProvider};
use crate::subgrid_tree::SubGridTreeBitMask;

type Models = HashMap<Uuid, Arc<SiteModel>>;

// The guarded value is empty, so a poisoned writer lock carries no broken state.
fn lock_writer(writer: &Mutex<()>) -> MutexGuard<'_, ()> {
    writer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory registry of site model snapshots.
///
/// Readers get the snapshot that was current when they asked. Writers
/// never mutate a published snapshot: they publish a replacement.
/// Writers are serialized with each other, readers never wait.
#[derive(Default)]
pub struct SiteModels {
    models: ArcSwap<Models>,
    writer: Mutex<()>,
}

impl SiteModels {
    pub fn new() -> SiteModels {
        SiteModels::default()
    }

    /// Publishes `site_model`, replacing any snapshot with the same identifier.
    pub fn register(&self, site_model: SiteModel) -> Arc<SiteModel> {
        let site_model = Arc::new(site_model);
        let _writer = lock_writer(&self.writer);
        let mut models = self.models.load_full();
        Arc::make_mut(&mut models).insert(site_model.id(), Arc::clone(&site_model));
        self.models.store(models);
        site_model
    }

    /// Publishes the result of `update` applied to the current snapshot.
    ///
    /// Returns the new snapshot, or `None` if the model is unknown.
    /// `update` runs while holding the registry's writer lock, so no
    /// concurrent write is lost.
    pub fn update<F>(&self, id: Uuid, update: F) -> Option<Arc<SiteModel>>
    where F: FnOnce(&SiteModel) -> SiteModel {
        let _writer = lock_writer(&self.writer);
        let mut models = self.models.load_full();
        let current = models.get(&id)?;
        let updated = Arc::new(update(current));
        Arc::make_mut(&mut models).insert(id, Arc::clone(&updated));
        self.models.store(models);
        debug!("published new snapshot of site model {id}");
        Some(updated)
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<SiteModel>> {
        let _writer = lock_writer(&self.writer);
        let mut models = self.models.load_full();
        let removed = Arc::make_mut(&mut models).remove(&id);
        self.models.store(models);
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<SiteModel>> {
        self.models.load().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.load().is_empty()
    }
}

impl SiteModelProvider for SiteModels {
    fn get_site_model(&self, id: Uuid) -> BoxFuture<'_, Option<Arc<SiteModel>>> {
        Box::pin(future::ready(self.get(id)))
    }
}

type MapKey = (Uuid, ExistenceMapKind, Uuid);

/// In-memory cache of design and surveyed surface existence maps.
#[derive(Default)]
pub struct ExistenceMaps {
    maps: ArcSwap<HashMap<MapKey, Arc<SubGridTreeBitMask>>>,
    writer: Mutex<()>,
}

impl ExistenceMaps {
    pub fn new() -> ExistenceMaps {
        ExistenceMaps::default()
    }

    pub fn register(
        &self,
        project_id: Uuid,
        kind: ExistenceMapKind,
        design_id: Uuid,
        existence_map: SubGridTreeBitMask,
    ) {
        let existence_map = Arc::new(existence_map);
        let _writer = lock_writer(&self.writer);
        let mut maps = self.maps.load_full();
        Arc::make_mut(&mut maps).insert((project_id, kind, design_id), existence_map);
        self.maps.store(maps);
    }

    pub fn remove(&self, project_id: Uuid, kind: ExistenceMapKind, design_id: Uuid) {
        let _writer = lock_writer(&self.writer);
        let mut maps = self.maps.load_full();
        Arc::make_mut(&mut maps).remove(&(project_id, kind, design_id));
        self.maps.store(maps);
    }

    pub fn get(&self, project_id: Uuid, kind: ExistenceMapKind, design_id: Uuid) -> Option<Arc<SubGridTreeBitMask>> {
        self.maps.load().get(&(project_id, kind, design_id)).cloned()
    }
}

impl DesignExistenceMapProvider for ExistenceMaps {
    fn get_single_existence_map(
        &self,
        project_id: Uuid,
        kind: ExistenceMapKind,
        design_id: Uuid,
    ) -> BoxFuture<'_, Option<Arc<SubGridTreeBitMask>>> {
        Box::pin(future::ready(self.get(project_id, kind, design_id)))
    }
}
