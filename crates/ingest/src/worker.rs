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

//! Worker ingest loop (§4.3, C3).

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::{Duration, SystemTime},
};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    collaborators::{
        ColumnFileWriter, ColumnFileWriterFactory, ConsumedRecord, LogConsumer, LogConsumerFactory,
        MetricSink, PollOutcome, RebalanceListener,
    },
    config::{IngestConfig, RecordErrorPolicy},
    error::{IngestError, Result, UnexpectedWakeupSnafu, WorkerInitSnafu},
    finalize::Finalizer,
    metrics::{WRITTEN_BYTES, WRITTEN_RECORDS},
    retry::retry,
};

/// Observable worker lifecycle state (see the state-machine diagram in
/// §4.3). Exposed for tests and metrics; the actual single-open-file
/// invariant (P3) is enforced structurally by `current_file` being a single
/// `Option` slot, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    Init       = 0,
    Idle       = 1,
    Writing    = 2,
    Finalising = 3,
    Closed     = 4,
    Failed     = 5,
}

impl WorkerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Idle,
            2 => Self::Writing,
            3 => Self::Finalising,
            4 => Self::Closed,
            _ => Self::Failed,
        }
    }
}

/// Timeout for the one-shot connectivity `poll(0)` performed at startup.
const INIT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

struct PartitionPruner {
    written_offsets: Arc<std::sync::Mutex<HashMap<i32, i64>>>,
}

impl RebalanceListener for PartitionPruner {
    fn on_revoke(&mut self, partitions: &[i32]) {
        tracing::info!(?partitions, "partitions revoked");
    }

    fn on_assign(&mut self, partitions: &[i32]) {
        let mut offsets = self.written_offsets.lock().unwrap();
        offsets.retain(|partition, _| partitions.contains(partition));
    }
}

/// A single ingest pipeline: one consumer session, one output file slot.
pub struct Worker<R: Send + 'static> {
    index:           usize,
    config:          Arc<IngestConfig<R>>,
    consumer:        Box<dyn LogConsumer>,
    wakeup_handle:   Arc<dyn Fn() + Send + Sync>,
    current_file:    Option<OpenFile<R>>,
    written_offsets: Arc<std::sync::Mutex<HashMap<i32, i64>>>,
    running:         Arc<AtomicBool>,
    close_lock:      Arc<Mutex<()>>,
    phase:           Arc<AtomicU8>,
    finalizer:       Finalizer,
}

struct OpenFile<R: Send> {
    writer:        Box<dyn ColumnFileWriter<R>>,
    creation_time: SystemTime,
}

impl<R: Send + 'static> Worker<R> {
    /// Constructs the log consumer, subscribes with a rebalance listener,
    /// and performs the one-shot connectivity poll. Returns a `WorkerInit`
    /// error if any of that fails (§4.3 "Initialisation").
    pub async fn init(index: usize, config: Arc<IngestConfig<R>>, running: Arc<AtomicBool>) -> Result<Self> {
        let mut consumer = config
            .consumer_factory
            .create(&config.consumer_properties)
            .map_err(|err| IngestError::WorkerInit {
                index,
                message: err.to_string(),
                loc: snafu::Location::new(file!(), line!(), column!()),
            })?;

        let written_offsets = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let listener = Box::new(PartitionPruner {
            written_offsets: Arc::clone(&written_offsets),
        });

        consumer
            .subscribe(&config.topic, listener)
            .await
            .map_err(|err| IngestError::WorkerInit {
                index,
                message: err.to_string(),
                loc: snafu::Location::new(file!(), line!(), column!()),
            })?;

        let wakeup_handle = consumer.wakeup_handle();

        let connectivity_check = consumer.poll(0);
        match tokio::time::timeout(INIT_POLL_TIMEOUT, connectivity_check).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                return WorkerInitSnafu {
                    index,
                    message: err.to_string(),
                }
                .fail();
            }
            Err(_) => {
                return WorkerInitSnafu {
                    index,
                    message: "timed out forcing group join".to_string(),
                }
                .fail();
            }
        }

        let finalizer = Finalizer::new(
            Arc::clone(&config.fs),
            config.target_directory.clone(),
            config.directory_date_pattern.clone(),
            config.instance_name.clone(),
            index,
        );

        Ok(Self {
            index,
            config,
            consumer,
            wakeup_handle,
            current_file: None,
            written_offsets,
            running,
            close_lock: Arc::new(Mutex::new(())),
            phase: Arc::new(AtomicU8::new(WorkerPhase::Idle as u8)),
            finalizer,
        })
    }

    #[must_use]
    pub fn phase(&self) -> WorkerPhase { WorkerPhase::from_u8(self.phase.load(Ordering::SeqCst)) }

    #[must_use]
    pub fn close_lock(&self) -> Arc<Mutex<()>> { Arc::clone(&self.close_lock) }

    #[must_use]
    pub fn wakeup_handle(&self) -> Arc<dyn Fn() + Send + Sync> { Arc::clone(&self.wakeup_handle) }

    fn set_phase(&self, phase: WorkerPhase) { self.phase.store(phase as u8, Ordering::SeqCst); }

    fn is_full(&self, writer: &dyn ColumnFileWriter<R>) -> bool {
        let max_records = self.config.max_records_per_file;
        let max_bytes = self.config.max_file_bytes.as_bytes();
        (max_records > 0 && writer.record_count() >= max_records)
            || (max_bytes > 0 && writer.data_size() >= max_bytes)
    }

    fn is_expired(&self, open_file: &OpenFile<R>) -> bool {
        let max_age = self.config.max_file_open_duration_ms;
        max_age > 0
            && open_file
                .creation_time
                .elapsed()
                .map(|elapsed| elapsed >= Duration::from_millis(max_age))
                .unwrap_or(false)
    }

    async fn open_writer(&self, cancel: &CancellationToken) -> Result<OpenFile<R>> {
        let factory = Arc::clone(&self.config.writer_factory);
        let properties = self.config.column_file_properties.clone();
        let path = self.finalizer.temp_path();
        let writer = retry(cancel, || {
            let factory = Arc::clone(&factory);
            let properties = properties.clone();
            let path = path.clone();
            async move { factory.open(&path, &properties).await }
        })
        .await?;
        Ok(OpenFile {
            writer,
            creation_time: SystemTime::now(),
        })
    }

    async fn finalize_current(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(open_file) = self.current_file.take() else {
            return Ok(());
        };
        self.set_phase(WorkerPhase::Finalising);
        let offsets = {
            let guard = self.written_offsets.lock().unwrap();
            guard.clone()
        };
        self.finalizer
            .finalize(
                cancel,
                &self.close_lock,
                open_file.writer,
                &offsets,
                self.config.metric_sink.as_ref(),
                self.consumer.as_mut(),
            )
            .await?;
        self.written_offsets.lock().unwrap().clear();
        self.set_phase(WorkerPhase::Idle);
        Ok(())
    }

    /// Runs the main ingest loop until `running` goes false or a fatal error
    /// occurs. `cancel` is fired by the supervisor as part of the shutdown
    /// handshake (§4.3).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if let Some(open_file) = &self.current_file {
                if self.is_expired(open_file) {
                    self.finalize_current(&cancel).await?;
                }
            }

            let outcome = self.consumer.poll(self.config.poll_timeout_ms).await;
            let records = match outcome {
                Ok(PollOutcome::Records(records)) => records,
                Ok(PollOutcome::WokenUp) => {
                    if self.running.load(Ordering::SeqCst) {
                        return UnexpectedWakeupSnafu.fail();
                    }
                    break;
                }
                Err(err) if err.is_cancelled() => {
                    if self.running.load(Ordering::SeqCst) {
                        return Err(err);
                    }
                    break;
                }
                Err(err) => return Err(err),
            };

            if records.is_empty() {
                continue;
            }

            if self.current_file.is_none() {
                self.current_file = Some(self.open_writer(&cancel).await?);
                self.set_phase(WorkerPhase::Writing);
            }

            self.ingest_batch(&cancel, records).await?;
        }

        self.set_phase(WorkerPhase::Closed);
        Ok(())
    }

    async fn ingest_batch(&mut self, cancel: &CancellationToken, records: Vec<ConsumedRecord>) -> Result<()> {
        let last_index = records.len() - 1;
        for (index, record) in records.into_iter().enumerate() {
            let parsed = match self.config.parser.parse(&record.value) {
                Ok(parsed) => parsed,
                Err(message) => match self.config.record_error_policy {
                    RecordErrorPolicy::FailFast => {
                        self.set_phase(WorkerPhase::Failed);
                        return Err(IngestError::MalformedRecord {
                            partition: record.partition,
                            offset: record.offset,
                            message,
                            loc: snafu::Location::new(file!(), line!(), column!()),
                        });
                    }
                    RecordErrorPolicy::SkipAndCount => {
                        tracing::warn!(
                            partition = record.partition,
                            offset = record.offset,
                            %message,
                            "skipping malformed record"
                        );
                        continue;
                    }
                },
            };

            let on_wire_size = record.value.len() as u64;

            {
                let open_file = self
                    .current_file
                    .as_mut()
                    .expect("current_file is opened before ingest_batch is called");
                // `write` takes the writer by unique reference, which does not fit the
                // `Fn`-bound generic retry combinator (the same shape as the commit
                // retry in finalize.rs), so it is retried with an explicit loop instead.
                loop {
                    match open_file.writer.write(&parsed).await {
                        Ok(()) => break,
                        Err(err) if err.is_transient() => {
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return Err(IngestError::cancelled()),
                                () = tokio::time::sleep(crate::retry::RETRY_BACKOFF) => {}
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
            }

            self.written_offsets
                .lock()
                .unwrap()
                .insert(record.partition, record.offset);

            self.config.metric_sink.increment(WRITTEN_RECORDS, 1);
            self.config.metric_sink.increment(WRITTEN_BYTES, on_wire_size);

            let is_full = {
                let open_file = self.current_file.as_ref().unwrap();
                self.is_full(open_file.writer.as_ref())
            };
            if is_full {
                self.finalize_current(cancel).await?;
                // §4.3 step 5e: only reopen here if more records remain in
                // this batch. If the triggering record was the last one, the
                // next writer opens lazily on the next non-empty batch —
                // reopening unconditionally would leave an empty `.tmp` file
                // on disk until it eventually finalises into a 0-row file.
                if index < last_index {
                    self.current_file = Some(self.open_writer(cancel).await?);
                    self.set_phase(WorkerPhase::Writing);
                }
            }
        }
        Ok(())
    }

    /// Finalises any open file and closes the consumer. Invoked by the
    /// supervisor's shutdown handshake; in-flight partial files are dropped
    /// rather than finalised per §5/§7 (the last `written_offsets` are
    /// simply never committed).
    pub async fn close(&mut self, _cancel: &CancellationToken) -> Result<()> {
        // Intentionally does NOT finalize self.current_file: a clean
        // shutdown drops the in-flight partial file (scenario 4).
        self.current_file = None;
        self.consumer.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::{
        config::RawIngestConfig,
        testing::{FakeConsumerFactory, FakeFs, FakeParser, FakeWriterFactory},
    };

    async fn make_config(
        max_records: u64,
        max_bytes: sparq_base::ReadableSize,
    ) -> Arc<IngestConfig<Vec<u8>>> {
        let raw = RawIngestConfig::builder()
            .instance_name("writer-0".to_string())
            .topic("events".to_string())
            .target_directory(std::path::PathBuf::from("/tmp/sparq"))
            .parser(Arc::new(FakeParser))
            .writer_factory(Arc::new(FakeWriterFactory::default()))
            .consumer_factory(Arc::new(FakeConsumerFactory::with_records(vec![ConsumedRecord {
                partition: 0,
                offset:    0,
                value:     vec![1, 2, 3],
            }])))
            .fs(Arc::new(FakeFs::default()))
            .max_records_per_file(max_records)
            .max_file_bytes(max_bytes)
            .build();
        Arc::new(raw.validate().unwrap())
    }

    #[tokio::test]
    async fn worker_inits_subscribes_and_idles() {
        let config = make_config(0, sparq_base::ReadableSize::gb(1)).await;
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::init(0, config, running).await.unwrap();
        assert_eq!(worker.phase(), WorkerPhase::Idle);
    }

    #[tokio::test]
    async fn worker_writes_one_record_then_stops_cleanly() {
        let config = make_config(0, sparq_base::ReadableSize::gb(1)).await;
        let running = Arc::new(AtomicBool::new(true));
        let mut worker = Worker::init(0, config, Arc::clone(&running)).await.unwrap();
        let cancel = CancellationToken::new();

        let running_clone = Arc::clone(&running);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            running_clone.store(false, Ordering::SeqCst);
        });

        worker.run(cancel).await.unwrap();
        stopper.await.unwrap();
        assert_eq!(worker.phase(), WorkerPhase::Closed);
    }
}
