// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Writer supervisor (§4.4, C4).

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{config::IngestConfig, error::Result, worker::Worker};

/// Default budget for a worker to notice cancellation and return from
/// `close` before the supervisor gives up waiting on it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct RunningWorker {
    running:       Arc<AtomicBool>,
    close_lock:    Arc<Mutex<()>>,
    cancel:        CancellationToken,
    wakeup_handle: Arc<dyn Fn() + Send + Sync>,
}

/// Owns shared immutable configuration and the worker pool. `start` spawns
/// every worker onto its own execution carrier and fails fast if any worker
/// cannot establish log connectivity; `close` shuts every worker down and
/// never propagates a close-time I/O error (§4.4).
pub struct WriterSupervisor<R: Send + 'static> {
    config:  Arc<IngestConfig<R>>,
    workers: Vec<RunningWorker>,
    joins:   JoinSet<Result<()>>,
}

impl<R: Send + 'static> WriterSupervisor<R> {
    #[must_use]
    pub fn new(config: Arc<IngestConfig<R>>) -> Self {
        Self {
            config,
            workers: Vec::new(),
            joins: JoinSet::new(),
        }
    }

    /// Spawns `worker_count` workers, each on an independent execution
    /// carrier drawn from [`sparq_common_runtime`]. Non-blocking once every
    /// worker has completed its initial connectivity check; returns the
    /// first [`IngestError::WorkerInit`] encountered if any worker fails to
    /// start.
    pub async fn start(&mut self) -> Result<()> {
        for index in 0..self.config.worker_count {
            let config = Arc::clone(&self.config);
            let running = Arc::new(AtomicBool::new(true));
            let cancel = CancellationToken::new();

            let mut worker = Worker::init(index, config, Arc::clone(&running)).await?;
            let close_lock = worker.close_lock();
            let wakeup_handle = worker.wakeup_handle();

            let worker_cancel = cancel.clone();
            let handle = sparq_common_runtime::file_io_runtime();
            self.joins.spawn_on(
                async move { worker.run(worker_cancel).await },
                handle.handle(),
            );

            self.workers.push(RunningWorker {
                running,
                close_lock,
                cancel,
                wakeup_handle,
            });
        }
        Ok(())
    }

    /// Signals every worker to stop (`running = false` + wakeup), takes each
    /// worker's `close-lock` while cancelling its execution carrier, then
    /// waits up to [`SHUTDOWN_TIMEOUT`] for all worker tasks to finish,
    /// aborting stragglers. I/O failures surfaced during close are logged
    /// and swallowed (§4.4) — this method never fails.
    pub async fn close(&mut self) {
        for worker in &self.workers {
            worker.running.store(false, Ordering::SeqCst);
            (worker.wakeup_handle)();
        }

        for worker in &self.workers {
            let _guard = worker.close_lock.lock().await;
            worker.cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        loop {
            if self.joins.is_empty() {
                break;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                tracing::warn!("shutdown timeout elapsed, aborting remaining workers");
                self.joins.abort_all();
                while self.joins.join_next().await.is_some() {}
                break;
            }
            tokio::select! {
                result = self.joins.join_next() => {
                    match result {
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err(err))) => {
                            tracing::warn!(error = %err, "worker close-time error swallowed");
                        }
                        Some(Err(join_err)) => {
                            tracing::warn!(error = %join_err, "worker task panicked during shutdown");
                        }
                        None => break,
                    }
                }
                () = tokio::time::sleep(remaining) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{
        config::RawIngestConfig,
        testing::{FakeConsumerFactory, FakeFs, FakeParser, FakeWriterFactory},
    };

    #[tokio::test]
    async fn supervisor_starts_and_closes_a_single_worker() {
        let raw = RawIngestConfig::builder()
            .instance_name("writer-0".to_string())
            .topic("events".to_string())
            .target_directory(PathBuf::from("/tmp/sparq"))
            .parser(Arc::new(FakeParser))
            .writer_factory(Arc::new(FakeWriterFactory::default()))
            .consumer_factory(Arc::new(FakeConsumerFactory::default()))
            .fs(Arc::new(FakeFs::default()))
            .worker_count(1)
            .build();
        let config = Arc::new(raw.validate().unwrap());

        sparq_common_runtime::init_global_runtimes(&sparq_common_runtime::GlobalRuntimeOptions {
            file_io_threads:    1,
            network_io_threads: 1,
            background_threads: 1,
        });

        let mut supervisor: WriterSupervisor<Vec<u8>> = WriterSupervisor::new(config);
        supervisor.start().await.unwrap();
        assert_eq!(supervisor.workers.len(), 1);
        supervisor.close().await;
    }
}
