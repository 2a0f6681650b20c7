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

//! Production [`RecordParser`] decoding length-delimited protobuf payloads
//! via `prost::Message`.

use std::marker::PhantomData;

use crate::collaborators::RecordParser;

pub struct ProstRecordParser<R> {
    _marker: PhantomData<R>,
}

impl<R> Default for ProstRecordParser<R> {
    fn default() -> Self { Self { _marker: PhantomData } }
}

impl<R: prost::Message + Default> RecordParser<R> for ProstRecordParser<R> {
    fn parse(&self, bytes: &[u8]) -> std::result::Result<R, String> {
        R::decode(bytes).map_err(|err| err.to_string())
    }
}
