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

//! Stable metric names (§4.4) and a `prometheus`-backed [`MetricSink`].

use std::sync::LazyLock;

use prometheus::{IntCounterVec, register_int_counter_vec};

use crate::collaborators::MetricSink;

pub const WRITTEN_RECORDS: &str = "written.records";
pub const FLUSHED_RECORDS: &str = "flushed.records";
pub const WRITTEN_BYTES: &str = "written.bytes";
pub const FLUSHED_BYTES: &str = "flushed.bytes";

static INGEST_COUNTERS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "sparq_ingest_counter_total",
        "sparq ingest engine counters, labelled by instance and metric name",
        &["instance", "metric"]
    )
    .unwrap()
});

/// Builds the stable `<prefix>.<instance>.<metric>` name used by sinks that
/// export to a flat namespace instead of using Prometheus label pairs.
#[must_use]
pub fn stable_name(prefix: &str, instance: &str, metric: &str) -> String {
    format!("{prefix}.{instance}.{metric}")
}

/// Default [`MetricSink`] backed by a process-global `prometheus` counter
/// vector, labelled by instance and metric name.
pub struct PrometheusMetricSink {
    instance: String,
}

impl PrometheusMetricSink {
    #[must_use]
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }
}

impl MetricSink for PrometheusMetricSink {
    fn increment(&self, name: &str, by: u64) {
        INGEST_COUNTERS
            .with_label_values(&[self.instance.as_str(), name])
            .inc_by(by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_name_matches_the_dotted_convention() {
        assert_eq!(
            stable_name("sparq", "writer-0", WRITTEN_RECORDS),
            "sparq.writer-0.written.records"
        );
    }
}
