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

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Error hierarchy for the ingest engine.
///
/// Every I/O-adjacent variant is tagged as transient, cancelled, or fatal so
/// the retry harness ([`crate::retry`]) can classify it mechanically instead
/// of pattern-matching on error messages. See `7. ERROR HANDLING DESIGN` for
/// the taxonomy this type encodes.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum IngestError {
    #[snafu(display("filesystem operation failed: {message}"))]
    FilesystemTransient {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("log I/O failed: {message}"))]
    LogTransient {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("column writer I/O failed: {message}"))]
    WriterTransient {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("operation cancelled"))]
    Cancelled {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("malformed record on partition {partition} offset {offset}: {message}"))]
    MalformedRecord {
        partition: i32,
        offset:    i64,
        message:   String,
        #[snafu(implicit)]
        loc:       snafu::Location,
    },

    #[snafu(display("consumer woke up while running flag was still true"))]
    UnexpectedWakeup {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("invalid configuration: {message}"))]
    Configuration {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("worker {index} failed to initialise: {message}"))]
    WorkerInit {
        index:   usize,
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("{message}"))]
    Fatal {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },
}

impl IngestError {
    /// Whether the retry harness should retry this error with a fresh
    /// attempt after sleeping the fixed back-off.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FilesystemTransient { .. } | Self::LogTransient { .. } | Self::WriterTransient { .. }
        )
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled { .. }) }

    #[must_use]
    pub fn is_fatal(&self) -> bool { !self.is_transient() && !self.is_cancelled() }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::Cancelled {
            loc: snafu::Location::new(file!(), line!(), column!()),
        }
    }
}
