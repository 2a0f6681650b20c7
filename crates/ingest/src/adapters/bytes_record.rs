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

//! Default record shape for deployments that have not linked a generated
//! protobuf schema: the on-wire bytes pass straight through to a single
//! binary column. Most deployments supply their own `R` (a generated
//! `prost::Message` type) plus a [`crate::adapters::ToArrowBatch`] impl with
//! a real schema; this is the fallback the CLI uses when none is configured.

use std::sync::{Arc, OnceLock};

use arrow::{
    array::{BinaryArray, RecordBatch},
    datatypes::{DataType, Field, Schema, SchemaRef},
};

use crate::{
    collaborators::RecordParser,
    error::{Result, WriterTransientSnafu},
};

static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();

fn bytes_schema() -> SchemaRef {
    SCHEMA
        .get_or_init(|| Arc::new(Schema::new(vec![Field::new("value", DataType::Binary, false)])))
        .clone()
}

impl super::ToArrowBatch for Vec<u8> {
    fn schema() -> SchemaRef { bytes_schema() }

    fn to_record_batch(&self) -> Result<RecordBatch> {
        let array = BinaryArray::from_vec(vec![self.as_slice()]);
        RecordBatch::try_new(bytes_schema(), vec![Arc::new(array)])
            .map_err(|err| WriterTransientSnafu { message: err.to_string() }.build())
    }
}

/// A [`RecordParser`] that treats the wire bytes as the record, matching the
/// "value deserialiser = identity" consumer-property override.
pub struct IdentityParser;

impl RecordParser<Vec<u8>> for IdentityParser {
    fn parse(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> { Ok(bytes.to_vec()) }
}
