//! Query pipelines.
//!
//! A [`PipelineProcessor`] resolves one request end to end:
//!
//! 1. `build` resolves the site model, composes the existence map of the
//!    request and prepares its filters,
//! 2. `process` runs the [`RequestAnalyser`] and dispatches the retrieval
//!    of the selected sub-grids,
//! 3. the [`PipelineResponse`] carries the terminal status and the fruit of
//!    the request's [`PipelineTask`].

mod dispatch;
mod processor;
mod request_analyser;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use self::dispatch::{
    build_batches, initiate, Aggregative, BatchCollector, BatchTemplate, ClientSubGrid, Completion,
    DispatchContext, DispatchProgress, DispatchStrategy, Fruit, InFlight, Mergeable, PipelineTask,
    Progressive, SubGridKind, SubGridRequestBatch, SubGridRetriever,
};
pub use self::processor::{
    BuildFailure, Built, PipelineProcessor, PipelineResponse, PipelineServices, Processed, Unbuilt,
};
pub use self::request_analyser::{AnalysisCounters, DesignMask, RequestAnalyser};
use crate::error::RequestErrorStatus;
use crate::filter::FilterSet;
use crate::geometry::BoundingWorldExtent3D;
use crate::settings::PipelineSettings;

/// Kind of cell data a request retrieves.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GridDataType {
    Height,
    CompactionValue,
    PassCount,
    Temperature,
    MachineSpeed,
    /// Elevation difference with a reference design.
    CutFill,
    /// Elevation difference between the base and the top filters.
    SimpleVolumeOverlay,
}

impl GridDataType {
    /// True if the request needs a reference design.
    pub fn requires_design(self) -> bool {
        matches!(self, GridDataType::CutFill)
    }

    /// True if surveyed surfaces contribute elevations to this kind of data.
    pub fn includes_surveyed_surfaces(self) -> bool {
        matches!(
            self,
            GridDataType::Height | GridDataType::CutFill | GridDataType::SimpleVolumeOverlay
        )
    }
}

/// Cooperative cancellation flag shared between a caller and its request.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything a caller specifies about a request.
#[derive(Clone, Debug)]
pub struct PipelineRequest {
    pub request_id: Uuid,
    pub data_model_id: Uuid,
    pub filters: FilterSet,
    pub grid_data_type: GridDataType,
    pub reference_design: Option<Uuid>,
    /// Further restricts the area of the request.
    pub override_extents: Option<BoundingWorldExtent3D>,
    pub require_surveyed_surface_information: bool,
    pub settings: PipelineSettings,
    pub cancellation: CancellationToken,
}

impl PipelineRequest {
    /// Creates an unfiltered request with default settings.
    pub fn new(data_model_id: Uuid, grid_data_type: GridDataType) -> PipelineRequest {
        PipelineRequest {
            request_id: Uuid::new_v4(),
            data_model_id,
            filters: FilterSet::unfiltered(),
            grid_data_type,
            reference_design: None,
            override_extents: None,
            require_surveyed_surface_information: grid_data_type.includes_surveyed_surfaces(),
            settings: PipelineSettings::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> PipelineRequest {
        self.filters = filters;
        self
    }

    pub fn with_reference_design(mut self, design_id: Uuid) -> PipelineRequest {
        self.reference_design = Some(design_id);
        self
    }

    pub fn with_override_extents(mut self, extents: BoundingWorldExtent3D) -> PipelineRequest {
        self.override_extents = Some(extents);
        self
    }

    pub fn with_surveyed_surface_information(mut self, required: bool) -> PipelineRequest {
        self.require_surveyed_surface_information = required;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> PipelineRequest {
        self.settings = settings;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> PipelineRequest {
        self.cancellation = cancellation;
        self
    }
}

impl RequestErrorStatus {
    /// Status reported when processing fails with `error`.
    pub(crate) fn from_processing_error(error: &crate::SiteGridError) -> RequestErrorStatus {
        match error {
            crate::SiteGridError::DesignNotFound(_) => RequestErrorStatus::NoDesignProvided,
            _ => RequestErrorStatus::FailedToExecuteRetrieval,
        }
    }
}
