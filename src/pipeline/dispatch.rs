//! Retrieval of the requested sub-grids and combination of the results.
//!
//! Sub-grids are requested from a [`SubGridRetriever`] in batches. Each
//! batch is handed to a [`BatchCollector`] created by the request's
//! [`PipelineTask`], which reduces it to a fruit. A [`DispatchStrategy`]
//! decides how fruits are combined:
//!
//! - [`Aggregative`] keeps every batch fruit and merges them once, at the end,
//!   with [`PipelineTask::merge_fruits`].
//! - [`Progressive`] merges each fruit into a running result as soon as its
//!   batch is collected. This requires the fruit to be [`Mergeable`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CancellationToken, GridDataType};
use crate::executor::Executor;
use crate::filter::FilterSet;
use crate::subgrid_tree::{SubGridTreeBitMask, SUB_GRID_TREE_DIMENSION};
use crate::SiteGridError;

/// Why a sub-grid is requested.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SubGridKind {
    ProductionData,
    SurveyedSurfaceOnly,
}

/// A group of sub-grids requested from the retrieval layer at once.
///
/// A batch only holds sub-grids of a single [`SubGridKind`].
#[derive(Clone, Debug)]
pub struct SubGridRequestBatch {
    pub request_id: Uuid,
    pub data_model_id: Uuid,
    pub grid_data_type: GridDataType,
    pub reference_design: Option<Uuid>,
    pub filters: Arc<FilterSet>,
    pub kind: SubGridKind,
    pub ordinal: usize,
    /// Sub-grid keys, in scan order.
    pub keys: Vec<(u32, u32)>,
}

impl SubGridRequestBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Describes the request the batches belong to.
#[derive(Clone, Debug)]
pub struct BatchTemplate {
    pub request_id: Uuid,
    pub data_model_id: Uuid,
    pub grid_data_type: GridDataType,
    pub reference_design: Option<Uuid>,
    pub filters: Arc<FilterSet>,
}

/// Splits the production data and the surveyed surface only sub-grids in
/// batches of at most `max_sub_grids_per_batch` keys.
///
/// Production data batches come first. Keys follow the scan order of the
/// masks.
pub fn build_batches(
    template: &BatchTemplate,
    prod_data_mask: &SubGridTreeBitMask,
    surveyed_surface_only_mask: &SubGridTreeBitMask,
    max_sub_grids_per_batch: usize,
) -> Vec<SubGridRequestBatch> {
    let max_sub_grids_per_batch = max_sub_grids_per_batch.max(1);
    let mut batches = Vec::new();
    for (kind, mask) in [
        (SubGridKind::ProductionData, prod_data_mask),
        (SubGridKind::SurveyedSurfaceOnly, surveyed_surface_only_mask),
    ] {
        let chunks = mask.iter_set_cells().chunks(max_sub_grids_per_batch);
        for keys in &chunks {
            batches.push(SubGridRequestBatch {
                request_id: template.request_id,
                data_model_id: template.data_model_id,
                grid_data_type: template.grid_data_type,
                reference_design: template.reference_design,
                filters: Arc::clone(&template.filters),
                kind,
                ordinal: batches.len(),
                keys: keys.collect(),
            });
        }
    }
    batches
}

/// A sub-grid as returned by the retrieval layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSubGrid {
    pub key: (u32, u32),
    pub kind: SubGridKind,
    pub grid_data_type: GridDataType,
    /// One value per on-the-ground cell, x-major. `None` where the cell holds no value.
    pub cells: Vec<Option<f64>>,
}

impl ClientSubGrid {
    /// A sub-grid without any cell value.
    pub fn empty(key: (u32, u32), kind: SubGridKind, grid_data_type: GridDataType) -> ClientSubGrid {
        let num_cells = (SUB_GRID_TREE_DIMENSION * SUB_GRID_TREE_DIMENSION) as usize;
        ClientSubGrid {
            key,
            kind,
            grid_data_type,
            cells: vec![None; num_cells],
        }
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<f64> {
        self.cells
            .get((x * SUB_GRID_TREE_DIMENSION + y) as usize)
            .copied()
            .flatten()
    }

    pub fn set_cell(&mut self, x: u32, y: u32, value: Option<f64>) {
        if let Some(cell) = self.cells.get_mut((x * SUB_GRID_TREE_DIMENSION + y) as usize) {
            *cell = value;
        }
    }

    pub fn num_values(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }
}

/// The retrieval layer fetching sub-grid cell data.
pub trait SubGridRetriever: Send + Sync {
    fn retrieve(&self, batch: &SubGridRequestBatch) -> crate::Result<Vec<ClientSubGrid>>;
}

/// Result of a task on a batch, or on a whole request.
pub trait Fruit: Send + 'static {}

impl<T> Fruit for T where T: Send + 'static {}

/// Fruits that can be merged incrementally.
///
/// `merge` must be associative.
pub trait Mergeable {
    fn merge(&mut self, other: Self);
}

impl Mergeable for usize {
    fn merge(&mut self, other: Self) {
        *self += other;
    }
}

impl Mergeable for u64 {
    fn merge(&mut self, other: Self) {
        *self += other;
    }
}

impl<T> Mergeable for Vec<T> {
    fn merge(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

impl<T: Mergeable> Mergeable for Option<T> {
    fn merge(&mut self, other: Self) {
        match (self.as_mut(), other) {
            (Some(left), Some(right)) => left.merge(right),
            (None, right) => *self = right,
            (Some(_), None) => {}
        }
    }
}

/// Processing logic of a request.
///
/// The task creates one [`BatchCollector`] per batch of retrieved
/// sub-grids, and merges the fruits of the collectors.
pub trait PipelineTask: Send + Sync + 'static {
    /// `Fruit` is the type for the result of our collection.
    type Fruit: Fruit;

    /// Type of the `BatchCollector` associated with this task.
    type Child: BatchCollector<Fruit = Self::Fruit>;

    /// `for_batch` is called once per batch, before its sub-grids are collected.
    fn for_batch(&self, batch: &SubGridRequestBatch) -> crate::Result<Self::Child>;

    /// Combines the fruits of the batches into one fruit.
    fn merge_fruits(&self, batch_fruits: Vec<Self::Fruit>) -> crate::Result<Self::Fruit>;

    /// Collects all of the sub-grids of a batch.
    fn collect_batch(
        &self,
        batch: &SubGridRequestBatch,
        sub_grids: Vec<ClientSubGrid>,
    ) -> crate::Result<Self::Fruit> {
        let mut collector = self.for_batch(batch)?;
        for sub_grid in sub_grids {
            collector.collect(sub_grid);
        }
        Ok(collector.harvest())
    }
}

/// Collects the sub-grids of one batch.
pub trait BatchCollector: 'static {
    type Fruit: Fruit;

    fn collect(&mut self, sub_grid: ClientSubGrid);

    /// Extract the fruit of the collection from the `BatchCollector`.
    fn harvest(self) -> Self::Fruit;
}

/// Shared progress of a dispatch.
#[derive(Debug)]
pub struct DispatchProgress {
    outstanding_sub_grids: AtomicU64,
    aborted: AtomicBool,
    terminated_abnormally: AtomicBool,
}

impl DispatchProgress {
    fn new(num_sub_grids: u64) -> DispatchProgress {
        DispatchProgress {
            outstanding_sub_grids: AtomicU64::new(num_sub_grids),
            aborted: AtomicBool::new(false),
            terminated_abnormally: AtomicBool::new(false),
        }
    }

    /// Number of requested sub-grids not processed yet.
    pub fn outstanding_sub_grids(&self) -> u64 {
        self.outstanding_sub_grids.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn terminated_abnormally(&self) -> bool {
        self.terminated_abnormally.load(Ordering::Acquire)
    }

    /// Stops the processing of the batches not started yet.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    fn mark_abnormal_termination(&self) {
        self.terminated_abnormally.store(true, Ordering::Release);
    }

    fn batch_processed(&self, num_sub_grids: usize) {
        self.outstanding_sub_grids
            .fetch_sub(num_sub_grids as u64, Ordering::AcqRel);
    }
}

/// Everything a strategy needs to retrieve batches.
pub struct DispatchContext {
    executor: Executor,
    retriever: Arc<dyn SubGridRetriever>,
    cancellation: CancellationToken,
    progress: Arc<DispatchProgress>,
}

impl DispatchContext {
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn progress(&self) -> &DispatchProgress {
        &self.progress
    }

    /// Retrieves a batch and collects it with `task`.
    ///
    /// Returns `Ok(None)` without retrieving anything once the dispatch
    /// was aborted or the request cancelled.
    pub fn retrieve_and_collect<T: PipelineTask>(
        &self,
        task: &T,
        batch: &SubGridRequestBatch,
    ) -> crate::Result<Option<T::Fruit>> {
        if self.cancellation.is_cancelled() {
            self.progress.abort();
        }
        if self.progress.is_aborted() {
            debug!("skipping batch {} of request {}", batch.ordinal, batch.request_id);
            return Ok(None);
        }
        let fruit = self
            .retriever
            .retrieve(batch)
            .and_then(|sub_grids| task.collect_batch(batch, sub_grids));
        match fruit {
            Ok(fruit) => {
                self.progress.batch_processed(batch.len());
                Ok(Some(fruit))
            }
            Err(err) => {
                warn!(
                    "batch {} of request {} failed: {err}",
                    batch.ordinal, batch.request_id
                );
                self.progress.mark_abnormal_termination();
                Err(err)
            }
        }
    }
}

/// Combines the fruits of the batches of a request.
pub trait DispatchStrategy<T: PipelineTask>: Send + Sync {
    /// Retrieves and collects every batch, and returns the combined fruit.
    fn run(
        &self,
        task: &T,
        batches: Vec<SubGridRequestBatch>,
        context: &DispatchContext,
    ) -> crate::Result<T::Fruit>;
}

/// Merges all of the batch fruits once every batch has been collected.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aggregative;

impl<T: PipelineTask> DispatchStrategy<T> for Aggregative {
    fn run(
        &self,
        task: &T,
        batches: Vec<SubGridRequestBatch>,
        context: &DispatchContext,
    ) -> crate::Result<T::Fruit> {
        let batch_fruits = context
            .executor()
            .map(|batch| context.retrieve_and_collect(task, &batch), batches.into_iter())?;
        task.merge_fruits(batch_fruits.into_iter().flatten().collect())
    }
}

/// Merges each batch fruit as soon as it is available.
#[derive(Clone, Copy, Debug, Default)]
pub struct Progressive;

impl<T> DispatchStrategy<T> for Progressive
where
    T: PipelineTask,
    T::Fruit: Mergeable,
{
    fn run(
        &self,
        task: &T,
        batches: Vec<SubGridRequestBatch>,
        context: &DispatchContext,
    ) -> crate::Result<T::Fruit> {
        let merged: Mutex<Option<T::Fruit>> = Mutex::new(None);
        context.executor().map(
            |batch| {
                if let Some(fruit) = context.retrieve_and_collect(task, &batch)? {
                    let mut merged = merged.lock()?;
                    match merged.as_mut() {
                        Some(accumulated) => accumulated.merge(fruit),
                        None => *merged = Some(fruit),
                    }
                }
                Ok(())
            },
            batches.into_iter(),
        )?;
        match merged.into_inner()? {
            Some(fruit) => Ok(fruit),
            None => task.merge_fruits(Vec::new()),
        }
    }
}

/// Outcome of waiting for a dispatch.
#[derive(Debug)]
pub struct Completion<F> {
    /// The combined fruit, if the dispatch completed in time.
    pub fruit: Option<F>,
    pub outstanding_sub_grids: u64,
    pub timed_out: bool,
    pub aborted: bool,
    pub terminated_abnormally: bool,
}

impl<F> Completion<F> {
    /// True if every batch was processed without error.
    pub fn is_complete(&self) -> bool {
        !self.timed_out && !self.aborted && !self.terminated_abnormally
    }
}

/// Handle on a running dispatch.
pub struct InFlight<F> {
    receiver: Receiver<crate::Result<F>>,
    progress: Arc<DispatchProgress>,
}

impl<F> InFlight<F> {
    pub fn progress(&self) -> &DispatchProgress {
        &self.progress
    }

    /// Waits for the dispatch to complete, at most `time_to_live`.
    ///
    /// On timeout, the batches not started yet are abandoned.
    pub fn wait(self, time_to_live: Duration) -> Completion<F> {
        let (fruit, timed_out) = match self.receiver.recv_timeout(time_to_live) {
            Ok(Ok(fruit)) => (Some(fruit), false),
            Ok(Err(err)) => {
                warn!("dispatch failed: {err}");
                self.progress.mark_abnormal_termination();
                (None, false)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.progress.abort();
                (None, true)
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("dispatch thread ended without a result");
                self.progress.mark_abnormal_termination();
                (None, false)
            }
        };
        Completion {
            fruit,
            outstanding_sub_grids: self.progress.outstanding_sub_grids(),
            timed_out,
            aborted: self.progress.is_aborted(),
            terminated_abnormally: self.progress.terminated_abnormally(),
        }
    }
}

/// Starts the retrieval of `batches` on a dedicated thread.
///
/// Fails if the executor or the dispatch thread cannot be created.
pub fn initiate<T: PipelineTask>(
    strategy: Arc<dyn DispatchStrategy<T>>,
    task: Arc<T>,
    retriever: Arc<dyn SubGridRetriever>,
    batches: Vec<SubGridRequestBatch>,
    num_retrieval_threads: usize,
    cancellation: CancellationToken,
) -> crate::Result<InFlight<T::Fruit>> {
    let num_sub_grids: u64 = batches.iter().map(|batch| batch.len() as u64).sum();
    let progress = Arc::new(DispatchProgress::new(num_sub_grids));
    let context = DispatchContext {
        executor: Executor::with_num_threads(num_retrieval_threads)?,
        retriever,
        cancellation,
        progress: Arc::clone(&progress),
    };
    let (sender, receiver) = crossbeam_channel::bounded(1);
    debug!(
        "dispatching {} batches, {num_sub_grids} sub-grids",
        batches.len()
    );
    thread::Builder::new()
        .name("pipeline-dispatch".to_string())
        .spawn(move || {
            let result = strategy.run(&*task, batches, &context);
            if result.is_err() {
                context.progress.mark_abnormal_termination();
            }
            // The receiver is gone if the pipeline stopped waiting.
            let _ = sender.send(result);
        })
        .map_err(|err| SiteGridError::SystemError(format!("failed to spawn the dispatch thread: {err}")))?;
    Ok(InFlight { receiver, progress })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountValues;

    struct CountValuesCollector(usize);

    impl BatchCollector for CountValuesCollector {
        type Fruit = usize;

        fn collect(&mut self, sub_grid: ClientSubGrid) {
            self.0 += sub_grid.num_values();
        }

        fn harvest(self) -> usize {
            self.0
        }
    }

    impl PipelineTask for CountValues {
        type Fruit = usize;
        type Child = CountValuesCollector;

        fn for_batch(&self, _: &SubGridRequestBatch) -> crate::Result<CountValuesCollector> {
            Ok(CountValuesCollector(0))
        }

        fn merge_fruits(&self, batch_fruits: Vec<usize>) -> crate::Result<usize> {
            Ok(batch_fruits.into_iter().sum())
        }
    }

    /// Returns sub-grids with one value per sub-grid, fails on the given batch.
    struct OneValueRetriever {
        failing_batch: Option<usize>,
    }

    impl SubGridRetriever for OneValueRetriever {
        fn retrieve(&self, batch: &SubGridRequestBatch) -> crate::Result<Vec<ClientSubGrid>> {
            if Some(batch.ordinal) == self.failing_batch {
                return Err(SiteGridError::RetrievalFailed(format!("batch {}", batch.ordinal)));
            }
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

    fn template() -> BatchTemplate {
        BatchTemplate {
            request_id: Uuid::new_v4(),
            data_model_id: Uuid::new_v4(),
            grid_data_type: GridDataType::Height,
            reference_design: None,
            filters: Arc::new(FilterSet::unfiltered()),
        }
    }

    fn masks(num_prod: u32, num_surveyed: u32) -> (SubGridTreeBitMask, SubGridTreeBitMask) {
        let mut prod = SubGridTreeBitMask::new(1.0);
        for x in 0..num_prod {
            prod.set_cell(x, 0, true);
        }
        let mut surveyed = SubGridTreeBitMask::new(1.0);
        for x in 0..num_surveyed {
            surveyed.set_cell(x, 1, true);
        }
        (prod, surveyed)
    }

    fn dispatch(
        strategy: Arc<dyn DispatchStrategy<CountValues>>,
        failing_batch: Option<usize>,
        num_threads: usize,
    ) -> Completion<usize> {
        let (prod, surveyed) = masks(25, 7);
        let batches = build_batches(&template(), &prod, &surveyed, 10);
        initiate(
            strategy,
            Arc::new(CountValues),
            Arc::new(OneValueRetriever { failing_batch }),
            batches,
            num_threads,
            CancellationToken::new(),
        )
        .unwrap()
        .wait(Duration::from_secs(10))
    }

    #[test]
    fn test_build_batches() {
        let (prod, surveyed) = masks(25, 7);
        let batches = build_batches(&template(), &prod, &surveyed, 10);
        let shape: Vec<(SubGridKind, usize)> = batches.iter().map(|batch| (batch.kind, batch.len())).collect();
        assert_eq!(
            shape,
            vec![
                (SubGridKind::ProductionData, 10),
                (SubGridKind::ProductionData, 10),
                (SubGridKind::ProductionData, 5),
                (SubGridKind::SurveyedSurfaceOnly, 7),
            ]
        );
        assert_eq!(batches[1].keys[0], (10, 0));
        assert_eq!(batches[3].ordinal, 3);
        assert!(build_batches(&template(), &SubGridTreeBitMask::new(1.0), &SubGridTreeBitMask::new(1.0), 10).is_empty());
    }

    #[test]
    fn test_aggregative_and_progressive_agree() {
        for num_threads in [1, 3] {
            let aggregative = dispatch(Arc::new(Aggregative), None, num_threads);
            let progressive = dispatch(Arc::new(Progressive), None, num_threads);
            assert!(aggregative.is_complete());
            assert!(progressive.is_complete());
            assert_eq!(aggregative.fruit, Some(32));
            assert_eq!(progressive.fruit, aggregative.fruit);
            assert_eq!(progressive.outstanding_sub_grids, 0);
        }
    }

    #[test]
    fn test_failing_batch_terminates_abnormally() {
        let completion = dispatch(Arc::new(Aggregative), Some(1), 1);
        assert!(completion.terminated_abnormally);
        assert!(!completion.is_complete());
        assert_eq!(completion.fruit, None);
        assert!(completion.outstanding_sub_grids > 0);
    }

    #[test]
    fn test_cancelled_dispatch_is_aborted() {
        let (prod, surveyed) = masks(25, 7);
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let completion = initiate(
            Arc::new(Progressive) as Arc<dyn DispatchStrategy<CountValues>>,
            Arc::new(CountValues),
            Arc::new(OneValueRetriever { failing_batch: None }),
            build_batches(&template(), &prod, &surveyed, 10),
            1,
            cancellation,
        )
        .unwrap()
        .wait(Duration::from_secs(10));
        assert!(completion.aborted);
        assert_eq!(completion.outstanding_sub_grids, 32);
        assert_eq!(completion.fruit, Some(0));
    }

    #[test]
    fn test_mergeable() {
        let mut left = Some(vec![1, 2]);
        left.merge(Some(vec![3]));
        left.merge(None);
        assert_eq!(left, Some(vec![1, 2, 3]));
        let mut count = 3usize;
        count.merge(4);
        assert_eq!(count, 7);
    }
}
