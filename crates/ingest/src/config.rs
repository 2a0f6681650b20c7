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

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use bon::Builder;
use sparq_base::ReadableSize;

use crate::{
    collaborators::{
        ColumnFileProperties, ColumnFileWriterFactory, Compression, DistributedFs,
        LogConsumerFactory, MetricSink, NullMetricSink, RecordParser,
    },
    error::{ConfigurationSnafu, IngestError, Result},
};

/// Minimum `max_file_bytes` below which column-file format overhead would
/// dominate the file (§4.5).
pub const MIN_MAX_FILE_BYTES: u64 = 102_400;

/// How a malformed record is handled (§9 open question, resolved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorPolicy {
    /// Abort the worker on the first malformed record (the taxonomy
    /// table's default behaviour).
    #[default]
    FailFast,
    /// Count the failure in a metric and skip the record.
    SkipAndCount,
}

impl Default for ColumnFileProperties {
    fn default() -> Self {
        Self {
            block_size:         ReadableSize::mb(128).as_bytes(),
            page_size:          ReadableSize::kb(64).as_bytes(),
            dictionary_enabled: true,
            compression:        Compression::Uncompressed,
        }
    }
}

/// Immutable, validated configuration for one ingest deployment.
///
/// Built through [`IngestConfig::builder`] and always finished through
/// [`RawIngestConfig::validate`] — the builder assembles, `validate`
/// enforces the range checks and defaulting rules from §4.5 and computes
/// the derived `poll_timeout_ms`.
#[derive(Builder)]
#[builder(finish_fn = build)]
pub struct RawIngestConfig<R> {
    pub instance_name: String,
    pub topic:         String,
    #[builder(default)]
    pub consumer_properties: HashMap<String, String>,
    pub target_directory: PathBuf,
    pub parser:            Arc<dyn RecordParser<R>>,
    pub writer_factory:    Arc<dyn ColumnFileWriterFactory<R>>,
    pub consumer_factory:  Arc<dyn LogConsumerFactory>,
    pub fs:                Arc<dyn DistributedFs>,
    #[builder(default)]
    pub column_file_properties: ColumnFileProperties,
    #[builder(default = 1)]
    pub worker_count: usize,
    #[builder(default = 0)]
    pub max_records_per_file: u64,
    #[builder(default = ReadableSize::gb(1))]
    pub max_file_bytes: ReadableSize,
    #[builder(default = 0)]
    pub max_file_open_duration_ms: u64,
    #[builder(default = None)]
    pub directory_date_pattern: Option<String>,
    #[builder(default = Arc::new(NullMetricSink))]
    pub metric_sink: Arc<dyn MetricSink>,
    #[builder(default)]
    pub record_error_policy: RecordErrorPolicy,
    /// Prefix used when defaulting `group.id` to `"<prefix>-<instance>"`.
    #[builder(default = "sparq".to_string())]
    pub group_id_prefix: String,
}

/// A [`RawIngestConfig`] that has passed [`RawIngestConfig::validate`].
///
/// Carries the derived `poll_timeout_ms` alongside the raw fields so workers
/// never recompute it.
pub struct IngestConfig<R> {
    pub raw:             RawIngestConfig<R>,
    pub poll_timeout_ms: u64,
}

impl<R> std::ops::Deref for IngestConfig<R> {
    type Target = RawIngestConfig<R>;

    fn deref(&self) -> &Self::Target { &self.raw }
}

impl<R> RawIngestConfig<R> {
    /// Runs the §4.5 validation rules, mutates `consumer_properties` to
    /// force the required overrides, and computes `poll_timeout_ms`.
    pub fn validate(mut self) -> Result<IngestConfig<R>> {
        if self.instance_name.trim().is_empty() {
            return ConfigurationSnafu {
                message: "instance_name must not be empty".to_string(),
            }
            .fail();
        }
        if self.topic.trim().is_empty() {
            return ConfigurationSnafu {
                message: "topic must not be empty".to_string(),
            }
            .fail();
        }
        if self.worker_count == 0 {
            return ConfigurationSnafu {
                message: "worker_count must be > 0".to_string(),
            }
            .fail();
        }
        if self.column_file_properties.block_size == 0 {
            return ConfigurationSnafu {
                message: "block_size must be > 0".to_string(),
            }
            .fail();
        }
        if self.column_file_properties.page_size == 0 {
            return ConfigurationSnafu {
                message: "page_size must be > 0".to_string(),
            }
            .fail();
        }
        let max_file_bytes = self.max_file_bytes.as_bytes();
        if max_file_bytes != 0 && max_file_bytes < MIN_MAX_FILE_BYTES {
            return ConfigurationSnafu {
                message: format!(
                    "max_file_bytes must be 0 or >= {MIN_MAX_FILE_BYTES}, got {max_file_bytes}"
                ),
            }
            .fail();
        }

        self.consumer_properties
            .insert("enable.auto.commit".to_string(), "false".to_string());
        self.consumer_properties
            .insert("value.deserializer".to_string(), "raw-bytes".to_string());
        self.consumer_properties
            .entry("group.id".to_string())
            .or_insert_with(|| format!("{}-{}", self.group_id_prefix, self.instance_name));

        let poll_timeout_ms = if self.max_file_open_duration_ms > 0 {
            self.max_file_open_duration_ms.min(1000)
        } else {
            1000
        };

        Ok(IngestConfig {
            raw: self,
            poll_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConsumerFactory, FakeFs, FakeParser, FakeWriterFactory};

    fn minimal_builder() -> RawIngestConfig<Vec<u8>> {
        RawIngestConfig::builder()
            .instance_name("writer-0".to_string())
            .topic("events".to_string())
            .target_directory(PathBuf::from("/tmp/sparq"))
            .parser(Arc::new(FakeParser))
            .writer_factory(Arc::new(FakeWriterFactory::default()))
            .consumer_factory(Arc::new(FakeConsumerFactory::default()))
            .fs(Arc::new(FakeFs::default()))
            .build()
    }

    #[test]
    fn rejects_empty_instance_name() {
        let raw = RawIngestConfig::builder()
            .instance_name(String::new())
            .topic("events".to_string())
            .target_directory(PathBuf::from("/tmp/sparq"))
            .parser(Arc::new(FakeParser))
            .writer_factory(Arc::new(FakeWriterFactory::default()))
            .consumer_factory(Arc::new(FakeConsumerFactory::default()))
            .fs(Arc::new(FakeFs::default()))
            .build();
        assert!(raw.validate().is_err());
    }

    #[test]
    fn rejects_small_nonzero_max_file_bytes() {
        let raw = minimal_builder();
        let mut raw = raw;
        raw.max_file_bytes = ReadableSize::b(1024);
        assert!(raw.validate().is_err());
    }

    #[test]
    fn zero_max_file_bytes_means_unbounded_and_is_accepted() {
        let mut raw = minimal_builder();
        raw.max_file_bytes = ReadableSize::b(0);
        assert!(raw.validate().is_ok());
    }

    #[test]
    fn forces_required_consumer_overrides_and_defaults_group_id() {
        let config = minimal_builder().validate().unwrap();
        assert_eq!(
            config.consumer_properties.get("enable.auto.commit").map(String::as_str),
            Some("false")
        );
        assert_eq!(
            config.consumer_properties.get("group.id").map(String::as_str),
            Some("sparq-writer-0")
        );
    }

    #[test]
    fn poll_timeout_is_capped_at_one_second() {
        let mut raw = minimal_builder();
        raw.max_file_open_duration_ms = 5000;
        let config = raw.validate().unwrap();
        assert_eq!(config.poll_timeout_ms, 1000);
    }

    #[test]
    fn poll_timeout_tracks_short_rollover_window() {
        let mut raw = minimal_builder();
        raw.max_file_open_duration_ms = 300;
        let config = raw.validate().unwrap();
        assert_eq!(config.poll_timeout_ms, 300);
    }
}
