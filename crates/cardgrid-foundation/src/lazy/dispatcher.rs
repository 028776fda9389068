//! Sub-batch dispatcher.
//!
//! Executes one scheduled load: the batch is split into small sub-batches,
//! each of which has its missing assets prefetched concurrently, is appended
//! to the sink in one piece, and then yields to the runtime before the next
//! sub-batch starts.

use std::rc::Rc;

use cardgrid_runtime::{join_all, yield_now, LocalFuture};
use smallvec::SmallVec;

use super::sink::DataSink;
use crate::error::{AssetLoadError, GridError};
use crate::host::AssetCache;
use crate::item::{Asset, Card, GridItem};

/// Bookkeeping hooks the dispatcher calls around each append.
pub trait BatchCommit {
    /// Whether the batch still belongs to the live source. Checked before
    /// every append.
    fn is_current(&self) -> bool;

    /// `count` items were appended to the sink.
    fn committed(&mut self, count: usize) -> Result<(), GridError>;
}

/// Result of dispatching one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchReport {
    pub appended: usize,
    pub sub_batches: usize,
    pub asset_failures: usize,
    /// The source was replaced mid-batch; the remainder was dropped.
    pub abandoned: bool,
}

pub struct SubBatchDispatcher<I> {
    sink: DataSink<I>,
    cache: Rc<dyn AssetCache<I>>,
    sub_batch_size: usize,
}

impl<I: GridItem> SubBatchDispatcher<I> {
    pub fn new(sink: DataSink<I>, cache: Rc<dyn AssetCache<I>>, sub_batch_size: usize) -> Self {
        Self {
            sink,
            cache,
            sub_batch_size: sub_batch_size.max(1),
        }
    }

    pub fn sub_batch_size(&self) -> usize {
        self.sub_batch_size
    }

    pub fn sink(&self) -> &DataSink<I> {
        &self.sink
    }

    /// Cards for a synchronous load; only assets already in the cache are
    /// attached.
    pub fn cached_cards(&self, items: Vec<I>) -> Vec<Card<I>> {
        items
            .into_iter()
            .map(|item| {
                let asset = if self.cache.is_cached(&item) {
                    self.cache.get_cached(&item)
                } else {
                    None
                };
                Card::new(item, asset)
            })
            .collect()
    }

    pub async fn dispatch(
        &self,
        batch: Vec<I>,
        commit: &mut dyn BatchCommit,
    ) -> Result<DispatchReport, GridError> {
        let mut report = DispatchReport::default();
        let mut chunks = batch.chunks(self.sub_batch_size).peekable();
        while let Some(chunk) = chunks.next() {
            let (cards, failures) = self.prefetch(chunk).await;
            report.asset_failures += failures;

            if !commit.is_current() {
                log::debug!(
                    "SubBatchDispatcher: source replaced, dropping {} pending items",
                    batch.len() - report.appended
                );
                report.abandoned = true;
                return Ok(report);
            }
            let count = cards.len();
            self.sink.append_batch(cards)?;
            commit.committed(count)?;
            report.appended += count;
            report.sub_batches += 1;

            if chunks.peek().is_some() {
                yield_now().await;
            }
        }
        Ok(report)
    }

    /// Resolves assets for one sub-batch. Failed loads fall back to the
    /// placeholder; the number of failures is returned alongside the cards.
    async fn prefetch(&self, chunk: &[I]) -> (Vec<Card<I>>, usize) {
        let mut assets: SmallVec<[Option<Asset>; 8]> = SmallVec::from_elem(None, chunk.len());
        let mut waiting: SmallVec<[usize; 8]> = SmallVec::new();
        let mut loads: Vec<LocalFuture<Result<Asset, AssetLoadError>>> = Vec::new();

        for (slot, item) in chunk.iter().enumerate() {
            let Some(key) = item.asset_key() else {
                continue;
            };
            if self.cache.is_cached(item) {
                if let Some(asset) = self.cache.get_cached(item) {
                    assets[slot] = Some(asset);
                    continue;
                }
            }
            loads.push(self.cache.load(key, item));
            waiting.push(slot);
        }

        let mut failures = 0;
        let results = join_all(loads).await;
        for (slot, result) in waiting.into_iter().zip(results) {
            let asset = match result {
                Ok(asset) => asset,
                Err(err) => {
                    failures += 1;
                    log::warn!(
                        "SubBatchDispatcher: {} for {}, using placeholder",
                        err,
                        chunk[slot].id()
                    );
                    Asset::Placeholder
                }
            };
            assets[slot] = Some(asset);
        }

        let cards = chunk
            .iter()
            .cloned()
            .zip(assets)
            .map(|(item, asset)| Card::new(item, asset))
            .collect();
        (cards, failures)
    }
}
