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

use clap::{Args, Parser, Subcommand};
use opendal::{Operator, services::Fs};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use sparq_app::AppConfig;
use sparq_base::ReadableSize;
use sparq_common_telemetry::logging::LoggingOptions;
use sparq_ingest::{
    RawIngestConfig, RecordErrorPolicy,
    adapters::{IdentityParser, KafkaConsumerFactory, OpendalFs, ParquetColumnFileWriterFactory},
};

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed to read config file {path:?}: {source}"))]
    ReadConfig { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse config file {path:?}: {source}"))]
    ParseConfig { path: PathBuf, source: toml::de::Error },

    #[snafu(display("invalid filesystem root {root:?}: {source}"))]
    BuildFs { root: String, source: opendal::Error },

    #[snafu(display("invalid ingest configuration: {source}"))]
    Validate { source: sparq_ingest::IngestError },

    #[snafu(display("application error: {source}"))]
    Run { source: sparq_app::AppError },
}

type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Parser)]
#[clap(name = "sparq", about = "sparq ingest engine", version)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
#[command(long_about = r"
Runs the ingest worker pool until interrupted.

Examples:

sparq run --config /etc/sparq/ingest.toml
")]
struct RunArgs {
    /// Path to a TOML file describing the ingest deployment.
    #[arg(long)]
    config: PathBuf,
}

/// On-disk shape of the deployment a single `sparq` process runs. Maps
/// directly onto the fields of [`RawIngestConfig`]; the trait-object fields
/// (parser, writer factory, consumer factory, filesystem) are always the
/// default bytes-passthrough adapters, since this binary has no generated
/// protobuf schema linked in.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConfigFile {
    instance_name:           String,
    topic:                   String,
    target_directory:        PathBuf,
    filesystem_root:         String,
    consumer_properties:     HashMap<String, String>,
    worker_count:            usize,
    max_records_per_file:    u64,
    max_file_bytes:          ReadableSize,
    max_file_open_duration_ms: u64,
    directory_date_pattern:  Option<String>,
    record_error_policy:     RecordErrorPolicy,
    group_id_prefix:         String,
    logging:                 LoggingOptions,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            instance_name:    String::new(),
            topic:            String::new(),
            target_directory: PathBuf::new(),
            filesystem_root:  "/".to_string(),
            consumer_properties: HashMap::new(),
            worker_count:     1,
            max_records_per_file: 0,
            max_file_bytes:   ReadableSize::gb(1),
            max_file_open_duration_ms: 0,
            directory_date_pattern: None,
            record_error_policy: RecordErrorPolicy::default(),
            group_id_prefix:  "sparq".to_string(),
            logging:          LoggingOptions::default(),
        }
    }
}

impl RunArgs {
    async fn run(&self) -> Result<()> {
        let text = std::fs::read_to_string(&self.config).context(ReadConfigSnafu {
            path: self.config.clone(),
        })?;
        let parsed: ConfigFile = toml::from_str(&text).context(ParseConfigSnafu {
            path: self.config.clone(),
        })?;

        let operator = Operator::new(Fs::default().root(&parsed.filesystem_root))
            .context(BuildFsSnafu {
                root: parsed.filesystem_root.clone(),
            })?
            .finish();
        let fs = Arc::new(OpendalFs::new(operator));

        let raw = RawIngestConfig::builder()
            .instance_name(parsed.instance_name)
            .topic(parsed.topic)
            .consumer_properties(parsed.consumer_properties)
            .target_directory(parsed.target_directory)
            .parser(Arc::new(IdentityParser))
            .writer_factory(Arc::new(ParquetColumnFileWriterFactory::<Vec<u8>>::default()))
            .consumer_factory(Arc::new(KafkaConsumerFactory))
            .fs(fs)
            .worker_count(parsed.worker_count)
            .max_records_per_file(parsed.max_records_per_file)
            .max_file_bytes(parsed.max_file_bytes)
            .max_file_open_duration_ms(parsed.max_file_open_duration_ms)
            .directory_date_pattern(parsed.directory_date_pattern)
            .record_error_policy(parsed.record_error_policy)
            .group_id_prefix(parsed.group_id_prefix)
            .build();
        let ingest_config = Arc::new(raw.validate().context(ValidateSnafu)?);

        sparq_common_runtime::init_global_runtimes(&sparq_common_runtime::GlobalRuntimeOptions::default());

        let app_config = AppConfig::builder().logging(parsed.logging).build();
        let app = app_config.open(ingest_config);
        app.run().await.context(RunSnafu)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Run(args) => args.run().await,
    }
}
