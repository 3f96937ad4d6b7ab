use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use super::dispatch::{self, BatchTemplate, InFlight};
use super::{
    Aggregative, AnalysisCounters, DesignMask, DispatchStrategy, Mergeable, PipelineRequest, PipelineTask,
    Progressive, RequestAnalyser, SubGridRetriever,
};
use crate::error::RequestErrorStatus;
use crate::filter::FilterSet;
use crate::geometry::BoundingWorldExtent3D;
use crate::site_model::{DesignExistenceMapProvider, ExistenceMapKind, SiteModel, SiteModelProvider};
use crate::subgrid_tree::SubGridTreeBitMask;
use crate::SiteGridError;

/// Collaborators shared by the pipelines of a node.
#[derive(Clone)]
pub struct PipelineServices {
    pub retriever: Arc<dyn SubGridRetriever>,
    pub site_models: Arc<dyn SiteModelProvider>,
    pub existence_maps: Arc<dyn DesignExistenceMapProvider>,
}

/// A pipeline that was not built yet.
pub struct Unbuilt;

/// A pipeline ready to be processed.
pub struct Built {
    site_model: Arc<SiteModel>,
    filters: Arc<FilterSet>,
    analyser: RequestAnalyser,
    surveyed_surfaces_excluded_by_time: bool,
}

/// A pipeline that ran to its terminal status.
pub struct Processed<F> {
    response: PipelineResponse<F>,
}

/// Result of a request.
#[derive(Debug)]
pub struct PipelineResponse<F> {
    pub request_id: Uuid,
    pub status: RequestErrorStatus,
    /// Fruit of the task, if the retrieval completed.
    pub fruit: Option<F>,
    pub counters: AnalysisCounters,
    pub outstanding_sub_grids: u64,
}

/// Reported when a pipeline cannot be built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("Failed to build the pipeline of request '{request_id}': {status}")]
pub struct BuildFailure {
    pub request_id: Uuid,
    pub status: RequestErrorStatus,
}

struct Wiring<T: PipelineTask> {
    request_id: Uuid,
    task: Option<Arc<T>>,
    strategy: Option<Arc<dyn DispatchStrategy<T>>>,
    services: Option<PipelineServices>,
}

impl<T: PipelineTask> Wiring<T> {
    fn is_disposed(&self) -> bool {
        self.task.is_none() && self.strategy.is_none() && self.services.is_none()
    }

    fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.task = None;
        self.strategy = None;
        self.services = None;
        debug!("request {}: pipeline disposed", self.request_id);
    }
}

impl<T: PipelineTask> Drop for Wiring<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Resolves a single request.
///
/// The processor goes through the [`Unbuilt`], [`Built`] and
/// [`Processed`] states. Each transition consumes the processor, so a
/// pipeline can only be processed once it was successfully built.
pub struct PipelineProcessor<T: PipelineTask, S = Unbuilt> {
    request: PipelineRequest,
    wiring: Wiring<T>,
    state: S,
}

impl<T: PipelineTask, S> PipelineProcessor<T, S> {
    pub fn request(&self) -> &PipelineRequest {
        &self.request
    }

    /// Releases the task, the strategy and the services.
    ///
    /// Calling `dispose` more than once is harmless. A disposed pipeline
    /// fails to build or to process.
    pub fn dispose(&mut self) {
        self.wiring.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.wiring.is_disposed()
    }
}

impl<T: PipelineTask> PipelineProcessor<T, Unbuilt> {
    pub fn new(
        request: PipelineRequest,
        task: Arc<T>,
        strategy: Arc<dyn DispatchStrategy<T>>,
        services: PipelineServices,
    ) -> PipelineProcessor<T, Unbuilt> {
        PipelineProcessor {
            wiring: Wiring {
                request_id: request.request_id,
                task: Some(task),
                strategy: Some(strategy),
                services: Some(services),
            },
            request,
            state: Unbuilt,
        }
    }

    /// A pipeline merging the batch fruits once all of them are collected.
    pub fn aggregative(request: PipelineRequest, task: Arc<T>, services: PipelineServices) -> Self {
        PipelineProcessor::new(request, task, Arc::new(Aggregative), services)
    }

    /// A pipeline merging each batch fruit as soon as it is collected.
    pub fn progressive(request: PipelineRequest, task: Arc<T>, services: PipelineServices) -> Self
    where T::Fruit: Mergeable {
        PipelineProcessor::new(request, task, Arc::new(Progressive), services)
    }

    /// Resolves the site model and prepares everything the request needs.
    ///
    /// Fails on the first step that cannot complete, with the status
    /// describing that step.
    pub async fn build(self) -> Result<PipelineProcessor<T, Built>, BuildFailure> {
        let PipelineProcessor {
            mut request,
            wiring,
            ..
        } = self;
        let request_id = request.request_id;
        let failure = move |status: RequestErrorStatus| {
            warn!("request {request_id}: pipeline build failed with {status}");
            BuildFailure { request_id, status }
        };

        let Some(services) = wiring.services.clone() else {
            return Err(failure(RequestErrorStatus::Unknown));
        };
        if let Err(err) = request.settings.validate() {
            warn!("request {request_id}: {err}");
            return Err(failure(RequestErrorStatus::InvalidSettings));
        }
        debug!(
            "request {request_id}: building {:?} pipeline for data model {}",
            request.grid_data_type, request.data_model_id
        );

        let excluded_surveyed_surfaces = request.filters.surveyed_surface_exclusion_list();

        let Some(site_model) = services.site_models.get_site_model(request.data_model_id).await else {
            return Err(failure(RequestErrorStatus::NoSuchDataModel));
        };

        let mut world_extents = site_model.adjusted_spatial_extents(&excluded_surveyed_surfaces);
        if !world_extents.is_valid_plan_extent() {
            return Err(failure(RequestErrorStatus::FailedToRequestDatamodelStatistics));
        }

        let mut overall_existence_map = SubGridTreeBitMask::clone(site_model.existence_map());
        let mut surveyed_surfaces_excluded_by_time = true;
        if request.require_surveyed_surface_information {
            for filter in request.filters.iter() {
                let surveyed_surfaces = filter.filter_surveyed_surfaces(site_model.surveyed_surfaces());
                surveyed_surfaces_excluded_by_time &= surveyed_surfaces.is_empty();
                for surveyed_surface in surveyed_surfaces {
                    let existence_map = services
                        .existence_maps
                        .get_single_existence_map(
                            site_model.id(),
                            ExistenceMapKind::SurveyedSurface,
                            surveyed_surface.id,
                        )
                        .await
                        .ok_or_else(|| failure(RequestErrorStatus::FailedToRequestSubgridExistenceMap))?;
                    overall_existence_map.or_with(&existence_map);
                }
            }
        }

        for filter in request.filters.iter() {
            let Some(design_id) = filter.attribute.elevation_range_design else {
                continue;
            };
            let existence_map = services
                .existence_maps
                .get_single_existence_map(site_model.id(), ExistenceMapKind::DesignSurface, design_id)
                .await
                .ok_or_else(|| failure(RequestErrorStatus::NoDesignProvided))?;
            overall_existence_map.and_with(&existence_map);
        }

        for filter in request.filters.filters_mut() {
            if filter.any_filter_selections {
                filter.prepare_for_query().map_err(failure)?;
            }
        }

        request
            .filters
            .apply_filter_and_subset_boundaries_to_extents(&mut world_extents);
        if let Some(override_extents) = &request.override_extents {
            world_extents.intersect(override_extents);
        }
        if !world_extents.is_valid_plan_extent() {
            debug!("request {request_id}: filters and override extents leave nothing to scan");
            overall_existence_map.clear();
        }

        let design_overlay = if request.grid_data_type.requires_design() {
            let design_id = request
                .reference_design
                .ok_or_else(|| failure(RequestErrorStatus::NoDesignProvided))?;
            let existence_map = services
                .existence_maps
                .get_single_existence_map(site_model.id(), ExistenceMapKind::DesignSurface, design_id)
                .await
                .ok_or_else(|| failure(RequestErrorStatus::NoDesignProvided))?;
            Some(existence_map)
        } else {
            None
        };

        let mut design_masks = Vec::new();
        for filter in request.filters.iter() {
            if let Some(design_id) = filter.spatial.design_mask {
                let existence_map = services
                    .existence_maps
                    .get_single_existence_map(site_model.id(), ExistenceMapKind::DesignSurface, design_id)
                    .await;
                design_masks.push(DesignMask {
                    design_id,
                    existence_map,
                });
            }
        }
        let filters = Arc::new(request.filters.clone());
        let analyser = RequestAnalyser::new(
            overall_existence_map,
            Arc::clone(site_model.existence_map()),
            Arc::clone(&filters),
            world_extents,
        )
        .with_design_overlay(design_overlay)
        .with_design_masks(design_masks)
        .with_submission_page(request.settings.submission_page);

        debug!(
            "request {request_id}: pipeline built, {} candidate sub-grids over {world_extents:?}",
            analyser.overall_existence_map().count_bits()
        );
        Ok(PipelineProcessor {
            request,
            wiring,
            state: Built {
                site_model,
                filters,
                analyser,
                surveyed_surfaces_excluded_by_time,
            },
        })
    }
}

impl<T: PipelineTask> PipelineProcessor<T, Built> {
    pub fn site_model(&self) -> &Arc<SiteModel> {
        &self.state.site_model
    }

    /// Area of the request once narrowed by the filters and the override extents.
    pub fn world_extents(&self) -> BoundingWorldExtent3D {
        self.state.analyser.world_extents()
    }

    pub fn analyser(&self) -> &RequestAnalyser {
        &self.state.analyser
    }

    pub fn analyser_mut(&mut self) -> &mut RequestAnalyser {
        &mut self.state.analyser
    }

    /// True if no filter selected any surveyed surface.
    pub fn surveyed_surfaces_excluded_by_time(&self) -> bool {
        self.state.surveyed_surfaces_excluded_by_time
    }

    /// Retrieves the sub-grids of the request and runs the task on them.
    ///
    /// The response always carries a terminal status: a request that timed
    /// out or was cancelled reports it, whatever happened before.
    pub fn process(self) -> PipelineProcessor<T, Processed<T::Fruit>> {
        let PipelineProcessor {
            request,
            mut wiring,
            state,
        } = self;
        let Built {
            mut analyser,
            filters,
            ..
        } = state;
        let request_id = request.request_id;

        let mut status = RequestErrorStatus::Unknown;
        let mut fruit = None;
        let mut outstanding_sub_grids = 0;
        let mut timed_out = false;
        match initiate(&request, &wiring, &mut analyser, filters) {
            Ok(in_flight) => {
                let completion = in_flight.wait(request.settings.time_to_live);
                outstanding_sub_grids = completion.outstanding_sub_grids;
                timed_out = completion.timed_out;
                if outstanding_sub_grids == 0 {
                    info!("request {request_id}: all sub-grids processed");
                } else {
                    info!("request {request_id}: {outstanding_sub_grids} sub-grids outstanding");
                }
                if !completion.terminated_abnormally && !completion.aborted {
                    status = RequestErrorStatus::Ok;
                }
                fruit = completion.fruit;
            }
            Err(err) => {
                warn!("request {request_id}: failed to initiate the retrieval: {err}");
                status = RequestErrorStatus::from_processing_error(&err);
            }
        }
        if timed_out {
            status = RequestErrorStatus::AbortedDueToPipelineTimeout;
        } else if request.cancellation.is_cancelled() {
            status = RequestErrorStatus::RequestHasBeenCancelled;
        }
        info!("request {request_id}: completed with status {status}");

        let counters = analyser.counters();
        wiring.dispose();
        PipelineProcessor {
            request,
            wiring,
            state: Processed {
                response: PipelineResponse {
                    request_id,
                    status,
                    fruit,
                    counters,
                    outstanding_sub_grids,
                },
            },
        }
    }
}

fn initiate<T: PipelineTask>(
    request: &PipelineRequest,
    wiring: &Wiring<T>,
    analyser: &mut RequestAnalyser,
    filters: Arc<FilterSet>,
) -> crate::Result<InFlight<T::Fruit>> {
    let (Some(task), Some(strategy), Some(services)) = (&wiring.task, &wiring.strategy, &wiring.services) else {
        return Err(SiteGridError::SystemError("the pipeline was disposed".to_string()));
    };
    analyser.execute()?;
    let (prod_data_mask, surveyed_surface_only_mask) = analyser.take_masks();
    let template = BatchTemplate {
        request_id: request.request_id,
        data_model_id: request.data_model_id,
        grid_data_type: request.grid_data_type,
        reference_design: request.reference_design,
        filters,
    };
    let batches = dispatch::build_batches(
        &template,
        &prod_data_mask,
        &surveyed_surface_only_mask,
        request.settings.max_sub_grids_per_batch,
    );
    dispatch::initiate(
        Arc::clone(strategy),
        Arc::clone(task),
        Arc::clone(&services.retriever),
        batches,
        request.settings.num_retrieval_threads,
        request.cancellation.clone(),
    )
}

impl<T: PipelineTask> PipelineProcessor<T, Processed<T::Fruit>> {
    pub fn status(&self) -> RequestErrorStatus {
        self.state.response.status
    }

    pub fn response(&self) -> &PipelineResponse<T::Fruit> {
        &self.state.response
    }

    pub fn into_response(self) -> PipelineResponse<T::Fruit> {
        self.state.response
    }
}
