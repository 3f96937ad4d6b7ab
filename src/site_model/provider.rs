use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SiteModel;
use crate::subgrid_tree::SubGridTreeBitMask;

/// Resolves site models by identifier.
pub trait SiteModelProvider: Send + Sync {
    /// Returns the current snapshot of the site model, or `None` if no such
    /// model is known.
    fn get_site_model(&self, id: Uuid) -> BoxFuture<'_, Option<Arc<SiteModel>>>;
}

/// Kind of surface an existence map is requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExistenceMapKind {
    DesignSurface,
    SurveyedSurface,
}

/// Cache of the existence maps of design and surveyed surfaces.
pub trait DesignExistenceMapProvider: Send + Sync {
    fn get_single_existence_map(
        &self,
        project_id: Uuid,
        kind: ExistenceMapKind,
        design_id: Uuid,
    ) -> BoxFuture<'_, Option<Arc<SubGridTreeBitMask>>>;
}
