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

//! Production adapters over the external collaborators named in §1: the
//! log client, the distributed filesystem, the column-file encoder, and the
//! protobuf parser. The engine itself only depends on the traits in
//! [`crate::collaborators`]; these modules are the default wiring for a real
//! deployment.

pub mod bytes_record;
pub mod kafka;
pub mod opendal_fs;
pub mod parquet_writer;
pub mod prost_parser;

pub use bytes_record::IdentityParser;
pub use kafka::{KafkaConsumer, KafkaConsumerFactory};
pub use opendal_fs::OpendalFs;
pub use parquet_writer::{ParquetColumnFileWriter, ParquetColumnFileWriterFactory, ToArrowBatch};
pub use prost_parser::ProstRecordParser;
