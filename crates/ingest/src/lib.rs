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

//! Concurrent worker pool consuming length-delimited records off a
//! partitioned log and materialising them as column files in a distributed
//! filesystem, committing consumer-group offsets only after each file is
//! durably renamed into place.
//!
//! The engine depends only on the traits in [`collaborators`]; [`adapters`]
//! wires them to Kafka, a distributed filesystem, Parquet, and protobuf for a
//! real deployment, while [`testing`] provides in-memory fakes of the same
//! traits for unit tests.

pub mod adapters;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod finalize;
pub mod metrics;
pub mod retry;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod testing;

pub use collaborators::{
    ColumnFileProperties, ColumnFileWriter, ColumnFileWriterFactory, Compression, ConsumedRecord,
    DistributedFs, LogConsumer, LogConsumerFactory, MetricSink, NullMetricSink, PollOutcome,
    RebalanceListener, RecordParser,
};
pub use config::{IngestConfig, RawIngestConfig, RecordErrorPolicy};
pub use error::{IngestError, Result};
pub use finalize::Finalizer;
pub use metrics::PrometheusMetricSink;
pub use supervisor::WriterSupervisor;
pub use worker::{Worker, WorkerPhase};
