use std::sync::Arc;

use itertools::Itertools;
use log::info;
use uuid::Uuid;

use crate::site_model::SiteModels;
use crate::subgrid_tree::sub_grid_key_of_cell;
use crate::SiteGridError;

/// Flags the sub-grids touched by freshly processed cells in the existence
/// map of their site model.
///
/// Updates publish a new site model snapshot: requests holding the previous
/// snapshot keep seeing it unchanged.
#[derive(Clone)]
pub struct SubGridExistenceIngestor {
    site_models: Arc<SiteModels>,
}

impl SubGridExistenceIngestor {
    pub fn new(site_models: Arc<SiteModels>) -> SubGridExistenceIngestor {
        SubGridExistenceIngestor { site_models }
    }

    /// Marks the sub-grids containing the on-the-ground `cells` of site
    /// model `site_model_id`.
    pub fn ingest(&self, site_model_id: &Uuid, cells: &[(u32, u32)]) -> crate::Result<()> {
        let sub_grid_keys: Vec<(u32, u32)> = cells
            .iter()
            .map(|&(cell_x, cell_y)| sub_grid_key_of_cell(cell_x, cell_y))
            .sorted_unstable()
            .dedup()
            .collect();
        self.site_models
            .update(*site_model_id, |site_model| {
                site_model.with_marked_sub_grids(sub_grid_keys.iter().copied())
            })
            .ok_or(SiteGridError::SiteModelNotFound(*site_model_id))?;
        info!(
            "marked {} sub-grids of site model {site_model_id}",
            sub_grid_keys.len()
        );
        Ok(())
    }

    /// Turns the ingestor into a processor for an
    /// [`IngestWorkerPool`](super::IngestWorkerPool) keyed by site model.
    pub fn into_processor(self) -> impl Fn(&Uuid, Vec<(u32, u32)>) -> crate::Result<()> + Send + Sync + 'static {
        move |site_model_id: &Uuid, cells: Vec<(u32, u32)>| self.ingest(site_model_id, &cells)
    }
}
