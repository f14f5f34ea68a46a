use std::collections::HashSet;

use crossbeam::channel;
use crossbeam::sync::WaitGroup;

use crate::collection::{Batch, CollectionStore, Document};
use crate::common::{FILTER_DEFAULT_LIMIT, FILTER_DEFAULT_WORKERS};
use crate::errors::DocketResult;
use crate::filter::FilterSpec;

/// The part of a filter that needs the collection lock.
///
/// Holds owned copies of the candidate documents. Copies share their
/// field trees with the stored documents, so taking them is cheap and the
/// residual scan can run after the lock is released.
#[derive(Debug)]
pub(crate) struct FilterPlan {
    candidates: Vec<Document>,
    residual: FilterSpec,
    limit: usize,
}

/// Runs [FilterSpec]s against a collection.
///
/// Conditions on indexed fields are answered from the secondary index by
/// intersecting buckets, smallest first. The remaining conditions are checked
/// by scan workers over the candidates, or over every batch when no
/// condition is indexed. Results are ordered by `index` and truncated.
#[derive(Clone, Copy, Debug)]
pub struct FilterExecutor {
    workers: usize,
    default_limit: usize,
}

impl FilterExecutor {
    pub fn new(workers: usize, default_limit: usize) -> Self {
        FilterExecutor {
            workers: workers.max(1),
            default_limit: default_limit.max(1),
        }
    }

    pub(crate) fn execute(&self, store: &CollectionStore, spec: &FilterSpec) -> DocketResult<Vec<Document>> {
        let plan = self.plan(store, spec)?;
        Ok(self.run(plan))
    }

    /// Resolves the indexed conditions and copies out the candidates.
    pub(crate) fn plan(&self, store: &CollectionStore, spec: &FilterSpec) -> DocketResult<FilterPlan> {
        spec.validate()?;
        let limit = spec.limit().unwrap_or(self.default_limit);

        let index = store.index();
        let mut indexed = Vec::new();
        let mut residual = FilterSpec::new();
        for (field, key) in spec.conditions() {
            if index.is_indexed(field) {
                indexed.push((field, key));
            } else {
                residual = residual.eq(field, key);
            }
        }

        let candidates = if indexed.is_empty() {
            store.batches().flat_map(Batch::documents).cloned().collect()
        } else {
            candidates(store, &indexed).unwrap_or_default()
        };
        log::trace!(
            "Filter on {} has {} candidates ({} indexed conditions)",
            store.name(),
            candidates.len(),
            indexed.len()
        );

        Ok(FilterPlan {
            candidates,
            residual,
            limit,
        })
    }

    /// Checks the residual conditions. Takes no lock.
    pub(crate) fn run(&self, plan: FilterPlan) -> Vec<Document> {
        let FilterPlan {
            candidates,
            residual,
            limit,
        } = plan;

        if residual.is_empty() || candidates.is_empty() {
            // the intersection already satisfies every condition
            return finish(candidates, limit);
        }
        let chunk = candidates.len().div_ceil(self.workers).max(1);
        finish(scan(&candidates, chunk, &residual), limit)
    }
}

impl Default for FilterExecutor {
    fn default() -> Self {
        FilterExecutor::new(FILTER_DEFAULT_WORKERS, FILTER_DEFAULT_LIMIT)
    }
}

/// Intersects the buckets of every indexed condition. `None` when the
/// intersection is empty.
fn candidates(store: &CollectionStore, indexed: &[(&str, &str)]) -> Option<Vec<Document>> {
    let index = store.index();
    let mut buckets = Vec::with_capacity(indexed.len());
    for (field, key) in indexed {
        buckets.push(index.bucket(field, key)?);
    }
    buckets.sort_by_key(|bucket| bucket.len());

    let (smallest, rest) = buckets.split_first()?;
    let mut ids: HashSet<&String> = smallest.iter().collect();
    for bucket in rest {
        ids.retain(|id| bucket.contains(*id));
        if ids.is_empty() {
            return None;
        }
    }

    Some(ids.into_iter().filter_map(|id| store.get(id)).cloned().collect())
}

/// Checks every chunk on its own scoped thread. Matches are streamed over a
/// channel which closes once all workers are done.
fn scan(candidates: &[Document], chunk: usize, residual: &FilterSpec) -> Vec<Document> {
    let (sender, receiver) = channel::unbounded::<Document>();
    let wait_group = WaitGroup::new();

    std::thread::scope(|scope| {
        for share in candidates.chunks(chunk) {
            let sender = sender.clone();
            let wait_group = wait_group.clone();
            scope.spawn(move || {
                for doc in share {
                    if residual.matches(doc) {
                        // the receiver outlives the scope
                        let _ = sender.send(doc.clone());
                    }
                }
                drop(wait_group);
            });
        }

        // closes the channel after the last worker
        scope.spawn(move || {
            wait_group.wait();
            drop(sender);
        });

        receiver.iter().collect()
    })
}

fn finish(mut documents: Vec<Document>, limit: usize) -> Vec<Document> {
    documents.sort_by_key(|doc| doc.index().unwrap_or_default());
    documents.truncate(limit);
    documents
}
