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

//! Trait seams for the systems this engine bridges.
//!
//! The log, the filesystem, the column-file encoder, and the protobuf parser
//! are all external collaborators in the source system. They are modelled
//! here as traits so the worker/supervisor/finaliser can be exercised with
//! in-memory fakes; production adapters live under [`crate::adapters`].

use std::{collections::HashMap, path::Path, sync::Arc, time::SystemTime};

use async_trait::async_trait;

use crate::error::Result;

/// A single record delivered by the log, still in on-wire form.
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    pub partition: i32,
    pub offset:    i64,
    pub value:     Vec<u8>,
}

/// Outcome of a bounded `poll` call.
pub enum PollOutcome {
    Records(Vec<ConsumedRecord>),
    /// The consumer was woken via [`LogConsumer::wakeup_handle`].
    WokenUp,
}

/// Callbacks registered at `subscribe` time, invoked on partition rebalance.
pub trait RebalanceListener: Send {
    /// Partitions revoked from this consumer. No commit happens here —
    /// uncommitted offsets are intentionally left to be re-read.
    fn on_revoke(&mut self, partitions: &[i32]);

    /// New partition assignment. Implementations prune any per-partition
    /// state outside the new assignment (invariant P4).
    fn on_assign(&mut self, partitions: &[i32]);
}

/// One consumer-group session, scoped to a single topic.
#[async_trait]
pub trait LogConsumer: Send {
    async fn subscribe(
        &mut self,
        topic: &str,
        listener: Box<dyn RebalanceListener>,
    ) -> Result<()>;

    async fn poll(&mut self, timeout_ms: u64) -> Result<PollOutcome>;

    async fn commit_async(&mut self, offsets: &HashMap<i32, i64>) -> Result<()>;

    /// Returns a cheaply cloneable handle that interrupts a blocked `poll`
    /// from another task. Unlike the other methods here, the handle needs no
    /// exclusive access to the consumer, so it can be taken once at
    /// construction time and handed to whatever is coordinating shutdown
    /// while the consumer itself stays owned by the polling task.
    fn wakeup_handle(&self) -> Arc<dyn Fn() + Send + Sync>;

    async fn close(&mut self) -> Result<()>;
}

/// Builds a [`LogConsumer`] from the final, construction-time consumer
/// properties (already forced to `auto-commit=off`, etc.).
pub trait LogConsumerFactory: Send + Sync {
    fn create(&self, properties: &HashMap<String, String>) -> Result<Box<dyn LogConsumer>>;
}

/// An open column-file writer. `close` takes `self` by value because the
/// writer is not usable afterwards; callers must snapshot `data_size`/
/// `record_count` before calling it (§4.2 step 1).
#[async_trait]
pub trait ColumnFileWriter<R: Send>: Send {
    async fn write(&mut self, record: &R) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;

    fn data_size(&self) -> u64;

    fn record_count(&self) -> u64;

    fn creation_time(&self) -> SystemTime;
}

/// Column-file properties shared by every writer a factory opens.
#[derive(Debug, Clone)]
pub struct ColumnFileProperties {
    pub block_size:        u64,
    pub page_size:         u64,
    pub dictionary_enabled: bool,
    pub compression:       Compression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Uncompressed,
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

/// Opens a new [`ColumnFileWriter`] on a temp path.
#[async_trait]
pub trait ColumnFileWriterFactory<R: Send>: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        properties: &ColumnFileProperties,
    ) -> Result<Box<dyn ColumnFileWriter<R>>>;
}

/// The distributed filesystem the engine finalises files into.
///
/// `mkdirs` and `rename` are required to tolerate being called against a
/// path/target that already exists (§5 "shared resources").
#[async_trait]
pub trait DistributedFs: Send + Sync {
    async fn mkdirs(&self, path: &Path) -> Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn exists(&self, path: &Path) -> Result<bool>;
}

/// Parses on-wire bytes into the configured record type. Parse failure is
/// fatal to the worker unless overridden by [`crate::config::RecordErrorPolicy`].
pub trait RecordParser<R>: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> std::result::Result<R, String>;
}

/// Named counters only; the metric sink never surfaces gauges or histograms.
pub trait MetricSink: Send + Sync {
    fn increment(&self, name: &str, by: u64);
}

/// A sink that discards every increment, used when no sink is configured.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn increment(&self, _name: &str, _by: u64) {}
}
