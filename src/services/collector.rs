//! Fan-out/fan-in collection of paginated resources.
//!
//! `collect` splits the offset space of a query across a fixed pool of workers.
//! Worker `w` of `n` reads the pages at `w * page_size`, `(w + n) * page_size`, ...
//! and stops at the first empty or failed page. Records are streamed over a bounded
//! channel into a single aggregator which owns the resulting collection.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::ports::spotify::SpotifyApi;
use crate::services::fetcher::{FetchOptions, PagedQuery, fetch_page};

pub const DEFAULT_WORKERS: u32 = 20;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// The arithmetic offset sequence owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker: u32,
    pub workers: u32,
    pub page_size: u32,
}

impl Partition {
    pub fn new(worker: u32, workers: u32, page_size: u32) -> Self {
        Self {
            worker,
            workers,
            page_size,
        }
    }

    /// Offsets `(worker + k * workers) * page_size` for k = 0, 1, ...
    ///
    /// Ends instead of wrapping when the offset no longer fits in a `u32`.
    pub fn offsets(self) -> impl Iterator<Item = u32> {
        let Partition {
            worker,
            workers,
            page_size,
        } = self;
        (0u32..).map_while(move |k| {
            k.checked_mul(workers)?
                .checked_add(worker)?
                .checked_mul(page_size)
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub workers: u32,
    pub channel_capacity: usize,
    pub fetch: FetchOptions,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            fetch: FetchOptions::default(),
        }
    }
}

/// A partition that stopped on an error instead of running out of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub worker: u32,
    /// `None` when the worker task itself died.
    pub offset: Option<u32>,
    pub reason: String,
}

/// All records delivered for one query. Order carries no meaning.
#[derive(Debug)]
pub struct Collection<T> {
    pub items: Vec<T>,
    pub failures: Vec<PartitionFailure>,
}

impl<T> Collection<T> {
    /// Whether some records may be missing because a partition failed.
    pub fn is_truncated(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Collect every record of `query` with a pool of `options.workers` concurrent workers.
pub async fn collect<Q>(
    client: Arc<dyn SpotifyApi>,
    query: Arc<Q>,
    options: &PoolOptions,
) -> Collection<Q::Item>
where
    Q: PagedQuery + 'static,
{
    let workers = options.workers.max(1);
    let (sender, receiver) = mpsc::channel(options.channel_capacity.max(1));

    tracing::debug!(
        query = %query.describe(),
        workers,
        page_size = options.fetch.page_size,
        "Starting collection"
    );

    let mut join_set = JoinSet::new();
    for worker in 0..workers {
        let partition = Partition::new(worker, workers, options.fetch.page_size);
        join_set.spawn(
            run_worker(
                client.clone(),
                query.clone(),
                partition,
                options.fetch,
                sender.clone(),
            )
            .instrument(tracing::debug_span!("worker", worker)),
        );
    }
    // The channel closes once the last worker drops its sender
    drop(sender);

    let (items, failures) = tokio::join!(drain(receiver), join_workers(join_set, workers));

    tracing::info!(
        query = %query.describe(),
        records = items.len(),
        failed_partitions = failures.len(),
        "Collection finished"
    );

    Collection { items, failures }
}

/// Receive records until every sender is dropped.
pub async fn drain<T>(mut receiver: mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = receiver.recv().await {
        items.push(item);
    }
    items
}

async fn join_workers(
    mut join_set: JoinSet<(u32, Option<PartitionFailure>)>,
    workers: u32,
) -> Vec<PartitionFailure> {
    let mut failures = Vec::new();
    let mut finished = BTreeSet::new();
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok((worker, failure)) => {
                finished.insert(worker);
                failures.extend(failure);
            }
            Err(error) => tracing::error!("Collection worker died: {}", error),
        }
    }

    // Workers that never reported back lost their whole remaining partition
    for worker in (0..workers).filter(|worker| !finished.contains(worker)) {
        failures.push(PartitionFailure {
            worker,
            offset: None,
            reason: "worker task panicked or was cancelled".to_string(),
        });
    }
    failures.sort_by_key(|failure| failure.worker);
    failures
}

async fn run_worker<Q>(
    client: Arc<dyn SpotifyApi>,
    query: Arc<Q>,
    partition: Partition,
    options: FetchOptions,
    sender: mpsc::Sender<Q::Item>,
) -> (u32, Option<PartitionFailure>)
where
    Q: PagedQuery + ?Sized,
{
    let worker = partition.worker;
    let mut pages = 0usize;
    for offset in partition.offsets() {
        let page = fetch_page(client.as_ref(), query.as_ref(), offset, &options).await;

        if let Some(error) = page.failure {
            let failure = PartitionFailure {
                worker,
                offset: Some(offset),
                reason: error.to_string(),
            };
            return (worker, Some(failure));
        }
        if !page.has_more {
            break;
        }

        pages += 1;
        for item in page.items {
            if sender.send(item).await.is_err() {
                tracing::debug!("Aggregator is gone, stopping worker");
                return (worker, None);
            }
        }
    }

    tracing::trace!(pages, "Partition exhausted");
    (worker, None)
}

/// Page through `query` from offset 0 on the current task.
pub async fn fetch_sequential<Q>(
    client: &dyn SpotifyApi,
    query: &Q,
    options: &FetchOptions,
) -> Collection<Q::Item>
where
    Q: PagedQuery + ?Sized,
{
    let mut items = Vec::new();
    let mut failures = Vec::new();

    for offset in Partition::new(0, 1, options.page_size.max(1)).offsets() {
        let page = fetch_page(client, query, offset, options).await;
        if let Some(error) = page.failure {
            failures.push(PartitionFailure {
                worker: 0,
                offset: Some(offset),
                reason: error.to_string(),
            });
            break;
        }
        if !page.has_more {
            break;
        }
        items.extend(page.items);
    }

    Collection { items, failures }
}
