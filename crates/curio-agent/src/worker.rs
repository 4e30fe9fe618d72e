// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background curation worker.
//!
//! Pops jobs off the [`CurationQueue`] and runs up to
//! `max_concurrent_jobs` of them at once. Same-topic writes are still
//! serialized by the knowledge store's topic locks. On cancellation the
//! queue is closed and drained before the worker returns.

use std::sync::Arc;

use curio_knowledge::KnowledgeManager;
use curio_reflect::PreferenceReflector;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{CurationJob, CurationQueue};

#[derive(Clone)]
pub struct CurationWorker {
    queue: Arc<CurationQueue>,
    knowledge: Arc<KnowledgeManager>,
    reflector: Arc<PreferenceReflector>,
    max_concurrent_jobs: usize,
}

impl CurationWorker {
    pub fn new(
        queue: Arc<CurationQueue>,
        knowledge: Arc<KnowledgeManager>,
        reflector: Arc<PreferenceReflector>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            queue,
            knowledge,
            reflector,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }

    /// Runs until `cancel` fires, then finishes every queued and in-flight
    /// job.
    pub async fn run(self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        info!(max_concurrent_jobs = self.max_concurrent_jobs, "curation worker started");

        loop {
            let job = tokio::select! {
                job = self.queue.pop() => job,
                _ = cancel.cancelled() => {
                    info!("shutdown requested, draining curation queue");
                    self.queue.close();
                    self.queue.pop().await
                }
            };
            let Some(job) = job else {
                break;
            };
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let worker = self.clone();
            tokio::spawn(async move {
                worker.process(job).await;
                drop(permit);
            });
        }

        // Every permit back means every spawned job has finished.
        let all = u32::try_from(self.max_concurrent_jobs).unwrap_or(u32::MAX);
        if permits.acquire_many(all).await.is_err() {
            warn!("curation permits closed before drain completed");
        }
        info!("curation worker stopped");
    }

    /// Runs one job. Failures are logged and never propagate.
    pub async fn process(&self, job: CurationJob) {
        let CurationJob {
            conversation_id,
            user_input,
            model_response,
            source_ref,
            update_knowledge,
            observe,
            reply,
        } = job;

        let updated = if update_knowledge {
            match self
                .knowledge
                .update_with_source(&user_input, &model_response, Some(source_ref))
                .await
            {
                Ok(path) => path,
                Err(e) => {
                    warn!(conversation_id = %conversation_id, error = %e, "knowledge update failed");
                    None
                }
            }
        } else {
            None
        };
        debug!(
            conversation_id = %conversation_id,
            updated = updated.is_some(),
            "curation job finished"
        );
        if let Some(reply) = reply {
            let _ = reply.send(updated);
        }

        if observe {
            self.reflector
                .observe(&conversation_id, &user_input, &model_response)
                .await;
        }
    }
}
