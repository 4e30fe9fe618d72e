// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded queue between answered turns and the curation worker.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use curio_config::{CurationConfig, OverflowPolicy};
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, warn};

/// Post-answer work for one exchange.
#[derive(Debug)]
pub struct CurationJob {
    pub conversation_id: String,
    pub user_input: String,
    pub model_response: String,
    /// Recorded on knowledge units as their provenance.
    pub source_ref: String,
    /// Run knowledge extraction and merge.
    pub update_knowledge: bool,
    /// Run preference analysis and self-reflection.
    pub observe: bool,
    /// Receives the written knowledge file once the update finishes.
    pub reply: Option<oneshot::Sender<Option<PathBuf>>>,
}

/// Why a job was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The worker is shutting down.
    Closed,
}

pub struct CurationQueue {
    jobs: Mutex<VecDeque<CurationJob>>,
    capacity: usize,
    policy: OverflowPolicy,
    items: Notify,
    space: Notify,
    closed: AtomicBool,
}

impl CurationQueue {
    pub fn new(config: &CurationConfig) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(config.queue_capacity)),
            capacity: config.queue_capacity.max(1),
            policy: config.overflow,
            items: Notify::new(),
            space: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueues a job according to the overflow policy.
    ///
    /// Under `block` this waits for space; under `drop_oldest` it evicts
    /// the oldest queued job, whose reply channel is dropped unanswered.
    pub async fn push(&self, job: CurationJob) -> Result<(), Rejected> {
        let mut job = Some(job);
        loop {
            {
                let mut jobs = self.jobs.lock().await;
                if self.is_closed() {
                    return Err(Rejected::Closed);
                }
                if jobs.len() < self.capacity || self.policy == OverflowPolicy::DropOldest {
                    if jobs.len() >= self.capacity
                        && let Some(evicted) = jobs.pop_front()
                    {
                        warn!(
                            conversation_id = %evicted.conversation_id,
                            capacity = self.capacity,
                            "curation queue full, dropping oldest job"
                        );
                        metrics::counter!("curio_curation_dropped_total").increment(1);
                    }
                    if let Some(job) = job.take() {
                        jobs.push_back(job);
                    }
                    debug!(queued = jobs.len(), "curation job enqueued");
                    self.items.notify_one();
                    return Ok(());
                }
            }
            debug!(capacity = self.capacity, "curation queue full, waiting for space");
            self.space.notified().await;
        }
    }

    /// Waits for the next job. Returns `None` once the queue is closed and
    /// everything queued before closing has been taken.
    pub async fn pop(&self) -> Option<CurationJob> {
        loop {
            {
                let mut jobs = self.jobs.lock().await;
                if let Some(job) = jobs.pop_front() {
                    self.space.notify_one();
                    return Some(job);
                }
                if self.is_closed() {
                    return None;
                }
            }
            self.items.notified().await;
        }
    }

    /// Stops accepting jobs. Queued jobs can still be popped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.notify_waiters();
        self.items.notify_one();
        self.space.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn job(n: usize) -> CurationJob {
        CurationJob {
            conversation_id: format!("c{n}"),
            user_input: String::new(),
            model_response: String::new(),
            source_ref: String::new(),
            update_knowledge: true,
            observe: false,
            reply: None,
        }
    }

    fn queue(capacity: usize, overflow: OverflowPolicy) -> CurationQueue {
        CurationQueue::new(&CurationConfig {
            queue_capacity: capacity,
            overflow,
            max_concurrent_jobs: 1,
        })
    }

    #[tokio::test]
    async fn fifo_order() {
        let q = queue(4, OverflowPolicy::Block);
        for n in 0..3 {
            q.push(job(n)).await.unwrap();
        }
        for n in 0..3 {
            assert_eq!(q.pop().await.unwrap().conversation_id, format!("c{n}"));
        }
    }

    #[tokio::test]
    async fn drop_oldest_evicts_head() {
        let q = queue(2, OverflowPolicy::DropOldest);
        let (tx, rx) = oneshot::channel();
        let mut first = job(0);
        first.reply = Some(tx);
        q.push(first).await.unwrap();
        q.push(job(1)).await.unwrap();
        q.push(job(2)).await.unwrap();

        assert_eq!(q.len().await, 2);
        assert_eq!(q.pop().await.unwrap().conversation_id, "c1");
        assert_eq!(q.pop().await.unwrap().conversation_id, "c2");
        assert!(rx.await.is_err(), "evicted job's reply is dropped");
    }

    #[tokio::test]
    async fn block_waits_for_space() {
        let q = Arc::new(queue(1, OverflowPolicy::Block));
        q.push(job(0)).await.unwrap();

        let producer = {
            let q = q.clone();
            tokio::spawn(async move { q.push(job(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "producer must wait while full");

        assert_eq!(q.pop().await.unwrap().conversation_id, "c0");
        producer.await.unwrap().unwrap();
        assert_eq!(q.pop().await.unwrap().conversation_id, "c1");
    }

    #[tokio::test]
    async fn close_rejects_new_jobs_and_drains_old() {
        let q = queue(4, OverflowPolicy::Block);
        q.push(job(0)).await.unwrap();
        q.close();
        assert_eq!(q.push(job(1)).await, Err(Rejected::Closed));
        assert!(q.pop().await.is_some());
        assert!(q.pop().await.is_none());
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let q = Arc::new(queue(4, OverflowPolicy::Block));
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        assert!(consumer.await.unwrap().is_none());
    }
}
