use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};

use super::GroupedWorkQueue;
use crate::SiteGridError;

/// Reported by a worker once it processed a group.
#[derive(Debug)]
pub struct IngestEvent<K> {
    pub key: K,
    pub num_items: usize,
    pub result: crate::Result<()>,
}

/// Threads processing the groups of a [`GroupedWorkQueue`].
pub struct IngestWorkerPool<K, V> {
    queue: Arc<GroupedWorkQueue<K, V>>,
    workers: Vec<JoinHandle<crate::Result<()>>>,
    events: Receiver<IngestEvent<K>>,
}

impl<K, V> IngestWorkerPool<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Spawns `num_workers` threads applying `processor` to the groups of `queue`.
    pub fn start<F>(num_workers: usize, queue: Arc<GroupedWorkQueue<K, V>>, processor: F) -> crate::Result<Self>
    where F: Fn(&K, Vec<V>) -> crate::Result<()> + Send + Sync + 'static {
        let processor = Arc::new(processor);
        let (event_sender, events) = crossbeam_channel::unbounded();
        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers.max(1) {
            let worker = spawn_worker(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&processor),
                event_sender.clone(),
            )?;
            workers.push(worker);
        }
        Ok(IngestWorkerPool {
            queue,
            workers,
            events,
        })
    }

    pub fn queue(&self) -> &Arc<GroupedWorkQueue<K, V>> {
        &self.queue
    }

    /// Events of the processed groups, in completion order.
    pub fn events(&self) -> &Receiver<IngestEvent<K>> {
        &self.events
    }

    /// Closes the queue, lets the workers drain it and waits for them.
    pub fn shutdown(self) -> crate::Result<()> {
        self.queue.close()?;
        for worker in self.workers {
            worker
                .join()
                .map_err(|err| SiteGridError::ErrorInThread(format!("{err:?}")))??;
        }
        Ok(())
    }
}

fn spawn_worker<K, V, F>(
    worker_id: usize,
    queue: Arc<GroupedWorkQueue<K, V>>,
    processor: Arc<F>,
    event_sender: Sender<IngestEvent<K>>,
) -> crate::Result<JoinHandle<crate::Result<()>>>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
    F: Fn(&K, Vec<V>) -> crate::Result<()> + Send + Sync + 'static,
{
    thread::Builder::new()
        .name(format!("ingest-worker-{worker_id}"))
        .spawn(move || {
            while let Some((key, items)) = queue.wait_for_group()? {
                let num_items = items.len();
                let result = (*processor)(&key, items);
                if let Err(err) = &result {
                    warn!("ingest worker {worker_id}: failed to process a group of {num_items} items: {err}");
                }
                queue.complete(&key)?;
                // Nobody may be listening.
                let _ = event_sender.send(IngestEvent {
                    key,
                    num_items,
                    result,
                });
            }
            debug!("ingest worker {worker_id} stopped");
            Ok(())
        })
        .map_err(|err| SiteGridError::SystemError(format!("failed to spawn an ingest worker: {err}")))
}
