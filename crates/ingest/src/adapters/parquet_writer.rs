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

//! Production [`ColumnFileWriter`] backed by `parquet::arrow::AsyncArrowWriter`.

use std::{marker::PhantomData, path::Path, sync::atomic::{AtomicU64, Ordering}, time::SystemTime};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use async_trait::async_trait;
use parquet::{
    arrow::AsyncArrowWriter,
    basic::{Compression as ParquetCompression, ZstdLevel},
    file::properties::WriterProperties,
};
use tokio::fs::File;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::{
    collaborators::{ColumnFileProperties, ColumnFileWriter, ColumnFileWriterFactory, Compression},
    error::{Result, WriterTransientSnafu},
};

/// Converts one in-memory record into a single-row Arrow batch. The writer
/// calls this once per `write`, matching the source interface's per-record
/// `write(record)` contract.
pub trait ToArrowBatch {
    fn schema() -> SchemaRef;
    fn to_record_batch(&self) -> Result<RecordBatch>;
}

fn writer_properties(properties: &ColumnFileProperties) -> WriterProperties {
    let compression = match properties.compression {
        Compression::Uncompressed => ParquetCompression::UNCOMPRESSED,
        Compression::Snappy => ParquetCompression::SNAPPY,
        Compression::Gzip => ParquetCompression::GZIP(Default::default()),
        Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
        Compression::Lz4 => ParquetCompression::LZ4,
    };

    WriterProperties::builder()
        .set_data_page_size_limit(properties.page_size as usize)
        .set_dictionary_enabled(properties.dictionary_enabled)
        .set_compression(compression)
        .set_max_row_group_size(properties.block_size as usize)
        .build()
}

pub struct ParquetColumnFileWriter<R: ToArrowBatch + Send> {
    inner:         AsyncArrowWriter<Compat<File>>,
    record_count:  AtomicU64,
    data_size:     AtomicU64,
    creation_time: SystemTime,
    _marker:       PhantomData<R>,
}

#[async_trait]
impl<R: ToArrowBatch + Send + Sync> ColumnFileWriter<R> for ParquetColumnFileWriter<R> {
    async fn write(&mut self, record: &R) -> Result<()> {
        let batch = record.to_record_batch()?;
        self.inner
            .write(&batch)
            .await
            .map_err(|err| WriterTransientSnafu { message: err.to_string() }.build())?;
        self.record_count.fetch_add(1, Ordering::SeqCst);
        self.data_size
            .store(self.inner.in_progress_size() as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.inner
            .close()
            .await
            .map(|_| ())
            .map_err(|err| WriterTransientSnafu { message: err.to_string() }.build())
    }

    fn data_size(&self) -> u64 { self.data_size.load(Ordering::SeqCst) }

    fn record_count(&self) -> u64 { self.record_count.load(Ordering::SeqCst) }

    fn creation_time(&self) -> SystemTime { self.creation_time }
}

pub struct ParquetColumnFileWriterFactory<R: ToArrowBatch + Send> {
    _marker: PhantomData<R>,
}

impl<R: ToArrowBatch + Send> Default for ParquetColumnFileWriterFactory<R> {
    fn default() -> Self { Self { _marker: PhantomData } }
}

#[async_trait]
impl<R: ToArrowBatch + Send + Sync + 'static> ColumnFileWriterFactory<R> for ParquetColumnFileWriterFactory<R> {
    async fn open(
        &self,
        path: &Path,
        properties: &ColumnFileProperties,
    ) -> Result<Box<dyn ColumnFileWriter<R>>> {
        let file = File::create(path)
            .await
            .map_err(|err| WriterTransientSnafu { message: err.to_string() }.build())?;
        let inner = AsyncArrowWriter::try_new(file.compat_write(), R::schema(), Some(writer_properties(properties)))
            .map_err(|err| WriterTransientSnafu { message: err.to_string() }.build())?;

        Ok(Box::new(ParquetColumnFileWriter {
            inner,
            record_count: AtomicU64::new(0),
            data_size: AtomicU64::new(0),
            creation_time: SystemTime::now(),
            _marker: PhantomData,
        }))
    }
}
