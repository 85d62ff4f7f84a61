use crate::core::errors::Result;
use crate::core::types::{QueryRequest, QueryResult};
use crate::engine::HybridSearchEngine;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct QueuedSearch {
    pub id: String,
    pub request: QueryRequest,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub id: String,
    pub result: Result<QueryResult>,
}

/// FIFO of named queries drained in waves of at most `max_concurrency` searches.
pub struct SearchQueue {
    queue: Mutex<VecDeque<QueuedSearch>>,
    active_count: AtomicUsize,
    pub max_concurrency: usize,
    engine: Arc<HybridSearchEngine>,
}

impl SearchQueue {
    pub fn new(engine: Arc<HybridSearchEngine>, max_concurrency: Option<usize>) -> Self {
        let actual_concurrency = max_concurrency
            .unwrap_or_else(|| engine.config().queue_concurrency())
            .max(1);

        SearchQueue {
            queue: Mutex::new(VecDeque::new()),
            active_count: AtomicUsize::new(0),
            max_concurrency: actual_concurrency,
            engine,
        }
    }

    /// Queues `request` and returns its id; an empty id is replaced by a fresh UUID.
    pub fn enqueue(&self, id: impl Into<String>, request: QueryRequest) -> String {
        let id = id.into();
        let id = if id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id
        };

        self.queue.lock().push_back(QueuedSearch {
            id: id.clone(),
            request,
        });
        id
    }

    /// Runs every queued search, handing each outcome to `callback` in queue order.
    pub fn process_each<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(SearchOutcome),
    {
        let mut processed = 0;
        loop {
            let wave: Vec<QueuedSearch> = {
                let mut queue = self.queue.lock();
                let take = self.max_concurrency.min(queue.len());
                queue.drain(..take).collect()
            };
            if wave.is_empty() {
                break;
            }

            self.active_count.fetch_add(wave.len(), Ordering::SeqCst);
            let engine = &self.engine;
            let outcomes: Vec<SearchOutcome> = engine.pool().install(|| {
                wave.into_par_iter()
                    .map(|job| SearchOutcome {
                        result: engine.search(&job.request),
                        id: job.id,
                    })
                    .collect()
            });
            self.active_count.fetch_sub(outcomes.len(), Ordering::SeqCst);

            processed += outcomes.len();
            for outcome in outcomes {
                if let Err(e) = &outcome.result {
                    if !e.is_no_result() {
                        log::warn!("Queued search {} failed: {}", outcome.id, e);
                    }
                }
                callback(outcome);
            }
        }
        processed
    }

    pub fn process(&self) -> Vec<SearchOutcome> {
        let mut outcomes = Vec::new();
        self.process_each(|outcome| outcomes.push(outcome));
        outcomes
    }

    pub fn is_empty(&self) -> bool {
        self.queue_size() == 0 && self.active_count() == 0
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}
