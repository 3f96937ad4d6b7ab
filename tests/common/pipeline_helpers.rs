#![allow(dead_code)]

use std::sync::Arc;

use futures::executor::block_on;
use sitegrid::pipeline::{
    BatchCollector, ClientSubGrid, PipelineProcessor, PipelineRequest, PipelineResponse, PipelineServices,
    PipelineTask, SubGridKind, SubGridRequestBatch, SubGridRetriever,
};
use sitegrid::site_model::{ExistenceMaps, SiteModel, SiteModels};
use sitegrid::subgrid_tree::{SubGridTreeBitMask, EXISTENCE_MAP_ORIGIN_OFFSET};
use uuid::Uuid;

pub const ORIGIN: u32 = EXISTENCE_MAP_ORIGIN_OFFSET;

/// Existence map with a cell size of one meter, holding the sub-grids at
/// the given offsets from the origin.
pub fn existence_map(sub_grids: &[(u32, u32)]) -> SubGridTreeBitMask {
    let mut map = SubGridTreeBitMask::new(1.0);
    for &(x, y) in sub_grids {
        map.set_cell(ORIGIN + x, ORIGIN + y, true);
    }
    map
}

/// Offsets from the origin of the sub-grids set in `map`.
pub fn offsets(map: &SubGridTreeBitMask) -> Vec<(u32, u32)> {
    map.iter_set_cells()
        .map(|(x, y)| (x - ORIGIN, y - ORIGIN))
        .collect()
}

/// Returns sub-grids holding a single value, at their first cell.
pub struct OneValueRetriever;

impl SubGridRetriever for OneValueRetriever {
    fn retrieve(&self, batch: &SubGridRequestBatch) -> sitegrid::Result<Vec<ClientSubGrid>> {
        Ok(batch
            .keys
            .iter()
            .map(|&key| {
                let mut sub_grid = ClientSubGrid::empty(key, batch.kind, batch.grid_data_type);
                sub_grid.set_cell(0, 0, Some(1.0));
                sub_grid
            })
            .collect())
    }
}

/// Collects the offsets and kinds of the retrieved sub-grids.
pub struct CollectSubGrids;

pub struct SubGridsCollector(Vec<((u32, u32), SubGridKind)>);

impl BatchCollector for SubGridsCollector {
    type Fruit = Vec<((u32, u32), SubGridKind)>;

    fn collect(&mut self, sub_grid: ClientSubGrid) {
        let (x, y) = sub_grid.key;
        self.0.push(((x - ORIGIN, y - ORIGIN), sub_grid.kind));
    }

    fn harvest(self) -> Self::Fruit {
        self.0
    }
}

impl PipelineTask for CollectSubGrids {
    type Fruit = Vec<((u32, u32), SubGridKind)>;
    type Child = SubGridsCollector;

    fn for_batch(&self, _batch: &SubGridRequestBatch) -> sitegrid::Result<SubGridsCollector> {
        Ok(SubGridsCollector(Vec::new()))
    }

    fn merge_fruits(&self, batch_fruits: Vec<Self::Fruit>) -> sitegrid::Result<Self::Fruit> {
        Ok(batch_fruits.into_iter().flatten().collect())
    }
}

pub struct TestSite {
    pub site_models: Arc<SiteModels>,
    pub existence_maps: Arc<ExistenceMaps>,
    pub site_model_id: Uuid,
}

impl TestSite {
    pub fn with_sub_grids(sub_grids: &[(u32, u32)]) -> TestSite {
        let site_models = Arc::new(SiteModels::new());
        let site_model_id = Uuid::new_v4();
        site_models.register(SiteModel::new(site_model_id, 1.0).with_existence_map(existence_map(sub_grids)));
        TestSite {
            site_models,
            existence_maps: Arc::new(ExistenceMaps::new()),
            site_model_id,
        }
    }

    pub fn services(&self) -> PipelineServices {
        PipelineServices {
            retriever: Arc::new(OneValueRetriever),
            site_models: self.site_models.clone(),
            existence_maps: self.existence_maps.clone(),
        }
    }

    /// Builds and processes `request` with an aggregative pipeline.
    pub fn run(&self, request: PipelineRequest) -> PipelineResponse<Vec<((u32, u32), SubGridKind)>> {
        let pipeline = PipelineProcessor::aggregative(request, Arc::new(CollectSubGrids), self.services());
        match block_on(pipeline.build()) {
            Ok(built) => built.process().into_response(),
            Err(failure) => panic!("pipeline build failed: {failure}"),
        }
    }

    /// Builds and processes `request` with a progressive pipeline.
    pub fn run_progressive(&self, request: PipelineRequest) -> PipelineResponse<Vec<((u32, u32), SubGridKind)>> {
        let pipeline = PipelineProcessor::progressive(request, Arc::new(CollectSubGrids), self.services());
        match block_on(pipeline.build()) {
            Ok(built) => built.process().into_response(),
            Err(failure) => panic!("pipeline build failed: {failure}"),
        }
    }
}
