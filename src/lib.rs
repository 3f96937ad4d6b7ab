//! # `sitegrid`
//!
//! Spatial query resolution over compaction and earthworks sub-grid data.
//!
//! A site model tracks, in an existence map, which 32x32 cell sub-grids of
//! the site hold production data. Answering a request means finding the
//! sub-grids it needs and retrieving them:
//!
//! - [`geometry`] provides the extents, fences and vector math,
//! - [`filter`] describes the spatial and attribute restrictions of a request,
//! - [`pipeline`] builds a request against a site model snapshot, selects its
//!   sub-grids with the [`pipeline::RequestAnalyser`] and dispatches their
//!   retrieval,
//! - [`ingest`] keeps existence maps current as cells get processed.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use futures::executor::block_on;
//! use sitegrid::pipeline::{
//!     BatchCollector, ClientSubGrid, PipelineProcessor, PipelineRequest, PipelineServices,
//!     PipelineTask, SubGridRequestBatch, SubGridRetriever, GridDataType,
//! };
//! use sitegrid::site_model::{ExistenceMaps, SiteModel, SiteModels};
//! use sitegrid::subgrid_tree::{SubGridTreeBitMask, EXISTENCE_MAP_ORIGIN_OFFSET};
//! use uuid::Uuid;
//!
//! struct EmptySubGrids;
//!
//! impl SubGridRetriever for EmptySubGrids {
//!     fn retrieve(&self, batch: &SubGridRequestBatch) -> sitegrid::Result<Vec<ClientSubGrid>> {
//!         Ok(batch
//!             .keys
//!             .iter()
//!             .map(|&key| ClientSubGrid::empty(key, batch.kind, batch.grid_data_type))
//!             .collect())
//!     }
//! }
//!
//! struct CountSubGrids;
//! struct SubGridCounter(usize);
//!
//! impl PipelineTask for CountSubGrids {
//!     type Fruit = usize;
//!     type Child = SubGridCounter;
//!
//!     fn for_batch(&self, _batch: &SubGridRequestBatch) -> sitegrid::Result<SubGridCounter> {
//!         Ok(SubGridCounter(0))
//!     }
//!
//!     fn merge_fruits(&self, fruits: Vec<usize>) -> sitegrid::Result<usize> {
//!         Ok(fruits.into_iter().sum())
//!     }
//! }
//!
//! impl BatchCollector for SubGridCounter {
//!     type Fruit = usize;
//!
//!     fn collect(&mut self, _sub_grid: ClientSubGrid) {
//!         self.0 += 1;
//!     }
//!
//!     fn harvest(self) -> usize {
//!         self.0
//!     }
//! }
//!
//! let mut existence_map = SubGridTreeBitMask::new(1.0);
//! existence_map.set_cell(EXISTENCE_MAP_ORIGIN_OFFSET, EXISTENCE_MAP_ORIGIN_OFFSET, true);
//! let site_model_id = Uuid::new_v4();
//! let site_models = Arc::new(SiteModels::new());
//! site_models.register(SiteModel::new(site_model_id, 1.0).with_existence_map(existence_map));
//!
//! let services = PipelineServices {
//!     retriever: Arc::new(EmptySubGrids),
//!     site_models,
//!     existence_maps: Arc::new(ExistenceMaps::new()),
//! };
//! let request = PipelineRequest::new(site_model_id, GridDataType::PassCount);
//! let processor = PipelineProcessor::aggregative(request, Arc::new(CountSubGrids), services);
//! let built = block_on(processor.build()).unwrap();
//! let response = built.process().into_response();
//! assert!(response.status.is_ok());
//! assert_eq!(response.fruit, Some(1));
//! ```

pub mod error;
pub mod executor;
pub mod filter;
pub mod geometry;
pub mod ingest;
pub mod pipeline;
pub mod settings;
pub mod site_model;
pub mod subgrid_tree;

pub use crate::error::{RequestErrorStatus, SiteGridError};
pub use crate::executor::Executor;
pub use crate::filter::{CombinedFilter, FilterSet};
pub use crate::geometry::{BoundingIntegerExtent2D, BoundingWorldExtent3D, Fence, XYZ};
pub use crate::pipeline::{GridDataType, PipelineProcessor, PipelineRequest, PipelineResponse};
pub use crate::settings::PipelineSettings;
pub use crate::site_model::{SiteModel, SiteModels};

/// `sitegrid` result type.
pub type Result<T> = std::result::Result<T, SiteGridError>;
