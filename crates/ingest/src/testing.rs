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

//! In-memory fakes for every external-collaborator trait, used by unit
//! tests elsewhere in this crate so the scenarios in §8 run deterministically
//! without a cluster or a real filesystem.

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use async_trait::async_trait;

use crate::{
    collaborators::{
        ColumnFileProperties, ColumnFileWriter, ColumnFileWriterFactory, ConsumedRecord,
        DistributedFs, LogConsumer, LogConsumerFactory, PollOutcome, RebalanceListener,
    },
    error::{FilesystemTransientSnafu, Result},
};

/// A [`crate::collaborators::RecordParser`] that treats the bytes as the
/// record itself — sufficient for tests that only care about write/rollover
/// bookkeeping, not real protobuf decoding.
pub struct FakeParser;

impl crate::collaborators::RecordParser<Vec<u8>> for FakeParser {
    fn parse(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> { Ok(bytes.to_vec()) }
}

/// An always-fails parser, for exercising the malformed-record path.
pub struct FailingParser;

impl crate::collaborators::RecordParser<Vec<u8>> for FailingParser {
    fn parse(&self, _bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
        Err("simulated parse failure".to_string())
    }
}

/// An in-memory [`ColumnFileWriter`] counting records/bytes without touching
/// disk.
pub struct FakeWriter {
    record_count: u64,
    data_size:    u64,
    creation:     SystemTime,
}

impl Default for FakeWriter {
    fn default() -> Self { Self::with_totals(0, 0) }
}

impl FakeWriter {
    #[must_use]
    pub fn with_totals(record_count: u64, data_size: u64) -> Self {
        Self {
            record_count,
            data_size,
            creation: SystemTime::now(),
        }
    }
}

#[async_trait]
impl ColumnFileWriter<Vec<u8>> for FakeWriter {
    async fn write(&mut self, record: &Vec<u8>) -> Result<()> {
        self.record_count += 1;
        self.data_size += record.len() as u64;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> { Ok(()) }

    fn data_size(&self) -> u64 { self.data_size }

    fn record_count(&self) -> u64 { self.record_count }

    fn creation_time(&self) -> SystemTime { self.creation }
}

#[derive(Default)]
pub struct FakeWriterFactory;

#[async_trait]
impl ColumnFileWriterFactory<Vec<u8>> for FakeWriterFactory {
    async fn open(
        &self,
        _path: &Path,
        _properties: &ColumnFileProperties,
    ) -> Result<Box<dyn ColumnFileWriter<Vec<u8>>>> {
        Ok(Box::new(FakeWriter::default()))
    }
}

/// An in-memory filesystem: `mkdirs` always succeeds, `rename` records the
/// pair it was asked to rename, and can be configured to fail the first `k`
/// rename attempts to exercise the retry harness (R2, scenario 5).
#[derive(Default)]
pub struct FakeFs {
    pub renamed:          Mutex<Vec<(PathBuf, PathBuf)>>,
    pub mkdirs_called:    Mutex<Vec<PathBuf>>,
    rename_failures_left: AtomicU64,
}

impl FakeFs {
    #[must_use]
    pub fn failing_renames(times: u64) -> Self {
        Self {
            rename_failures_left: AtomicU64::new(times),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DistributedFs for FakeFs {
    async fn mkdirs(&self, path: &Path) -> Result<()> {
        self.mkdirs_called.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if self.rename_failures_left.load(Ordering::SeqCst) > 0 {
            self.rename_failures_left.fetch_sub(1, Ordering::SeqCst);
            return FilesystemTransientSnafu {
                message: "simulated transient rename failure".to_string(),
            }
            .fail();
        }
        self.renamed.lock().unwrap().push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.renamed.lock().unwrap().iter().any(|(_, to)| to == path))
    }
}

/// An in-memory [`LogConsumer`]. The first `poll` (the worker's startup
/// connectivity check) always returns an empty batch; subsequent polls
/// drain a configured queue, then return empty batches forever unless a
/// handle from [`FakeConsumer::wakeup_handle`] has been invoked, in which
/// case the next poll returns [`PollOutcome::WokenUp`] exactly once.
#[derive(Default)]
pub struct FakeConsumer {
    connectivity_checked: bool,
    queue:                VecDeque<Vec<ConsumedRecord>>,
    woken:                Arc<std::sync::atomic::AtomicBool>,
    pub committed:        HashMap<i32, i64>,
    pub commit_calls:     u64,
}

impl FakeConsumer {
    #[must_use]
    pub fn with_records(records: Vec<ConsumedRecord>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(records);
        Self {
            queue,
            ..Default::default()
        }
    }
}

#[async_trait]
impl LogConsumer for FakeConsumer {
    async fn subscribe(&mut self, _topic: &str, _listener: Box<dyn RebalanceListener>) -> Result<()> {
        Ok(())
    }

    async fn poll(&mut self, _timeout_ms: u64) -> Result<PollOutcome> {
        if !self.connectivity_checked {
            self.connectivity_checked = true;
            return Ok(PollOutcome::Records(Vec::new()));
        }
        if self.woken.swap(false, Ordering::SeqCst) {
            return Ok(PollOutcome::WokenUp);
        }
        Ok(PollOutcome::Records(self.queue.pop_front().unwrap_or_default()))
    }

    async fn commit_async(&mut self, offsets: &HashMap<i32, i64>) -> Result<()> {
        self.commit_calls += 1;
        for (partition, offset) in offsets {
            self.committed.insert(*partition, *offset);
        }
        Ok(())
    }

    fn wakeup_handle(&self) -> Arc<dyn Fn() + Send + Sync> {
        let woken = Arc::clone(&self.woken);
        Arc::new(move || woken.store(true, Ordering::SeqCst))
    }

    async fn close(&mut self) -> Result<()> { Ok(()) }
}

#[derive(Default)]
pub struct FakeConsumerFactory {
    records: Vec<ConsumedRecord>,
}

impl FakeConsumerFactory {
    #[must_use]
    pub fn with_records(records: Vec<ConsumedRecord>) -> Self { Self { records } }
}

impl LogConsumerFactory for FakeConsumerFactory {
    fn create(&self, _properties: &HashMap<String, String>) -> Result<Box<dyn LogConsumer>> {
        Ok(Box::new(FakeConsumer::with_records(self.records.clone())))
    }
}
