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

use std::io::IsTerminal;

use bon::Builder;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracing_appender::{non_blocking::WorkerGuard, rolling::Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, prelude::*};

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Text or JSON event formatting for the fmt layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for the rolling log file. Empty means stdout only.
    #[default("".to_string())]
    pub dir: String,

    /// `EnvFilter` directive, e.g. "info" or "sparq_ingest=debug,info".
    #[default("info".to_string())]
    pub level: String,

    /// Output format for both stdout and file sinks.
    pub log_format: LogFormat,

    /// Whether to also emit to stdout when file logging is enabled.
    #[default = true]
    pub append_stdout: bool,
}

/// Initialise the global `tracing` subscriber for `app_name`.
///
/// Returns the `WorkerGuard`s that must be kept alive for the lifetime of the
/// process; dropping them flushes and stops the non-blocking file writer.
pub fn init_tracing_subscriber(app_name: &str, options: &LoggingOptions) -> Vec<WorkerGuard> {
    let _ = LogTracer::init();

    let env_filter = EnvFilter::try_new(&options.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let mut guards = Vec::new();

    let stdout_layer = (options.dir.is_empty() || options.append_stdout).then(|| {
        let ansi = std::io::stdout().is_terminal();
        match options.log_format {
            LogFormat::Text => fmt::layer().with_ansi(ansi).boxed(),
            LogFormat::Json => fmt::layer().json().with_ansi(false).boxed(),
        }
    });

    let file_layer = (!options.dir.is_empty()).then(|| {
        let appender = tracing_appender::rolling::Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(app_name)
            .filename_suffix("log")
            .build(&options.dir)
            .expect("failed to build rolling file appender");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        match options.log_format {
            LogFormat::Text => fmt::layer().with_ansi(false).with_writer(non_blocking).boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed(),
        }
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set, skipping re-init");
    }

    guards
}

/// Initialise a minimal stdout-only subscriber, useful for unit tests.
pub fn init_default_ut_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_stdout_text_info() {
        let opts = LoggingOptions::default();
        assert!(opts.dir.is_empty());
        assert_eq!(opts.level, "info");
        assert_eq!(opts.log_format, LogFormat::Text);
    }
}
