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

//! File finaliser (§4.2, C2).

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    collaborators::{ColumnFileWriter, DistributedFs, LogConsumer, MetricSink},
    error::Result,
    metrics::{FLUSHED_BYTES, FLUSHED_RECORDS},
    retry::retry,
};

/// Closes a worker's open column file, renames the temp path to a dated
/// final name, and commits the offsets it covers.
pub struct Finalizer {
    fs:                     Arc<dyn DistributedFs>,
    target_directory:       PathBuf,
    directory_date_pattern: Option<String>,
    instance:               String,
    index:                  usize,
}

impl Finalizer {
    #[must_use]
    pub fn new(
        fs: Arc<dyn DistributedFs>,
        target_directory: PathBuf,
        directory_date_pattern: Option<String>,
        instance: String,
        index: usize,
    ) -> Self {
        Self {
            fs,
            target_directory,
            directory_date_pattern,
            instance,
            index,
        }
    }

    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        self.target_directory
            .join(format!("{}_{}.tmp", self.instance, self.index))
    }

    /// `<yyyyMMdd-HHmmssSSS>_<instance>_<index>.parquet`, local time zone,
    /// millisecond resolution (§4.2).
    #[must_use]
    pub fn final_name(&self, now: DateTime<Local>) -> String {
        format!(
            "{}_{}_{}.parquet",
            now.format("%Y%m%d-%H%M%S%3f"),
            self.instance,
            self.index
        )
    }

    async fn destination_dir(&self, now: DateTime<Local>, cancel: &CancellationToken) -> Result<PathBuf> {
        let dir = match &self.directory_date_pattern {
            Some(pattern) => self.target_directory.join(now.format(pattern).to_string()),
            None => self.target_directory.clone(),
        };
        let fs = Arc::clone(&self.fs);
        let mkdirs_target = dir.clone();
        retry(cancel, || {
            let fs = Arc::clone(&fs);
            let target = mkdirs_target.clone();
            async move { fs.mkdirs(&target).await }
        })
        .await?;
        Ok(dir)
    }

    /// Runs the strict seven-step finalise ordering from §4.2. `writer` and
    /// `written_offsets` are taken by the caller so it can null/clear its own
    /// `current_file`/`written_offsets` slots afterwards (invariant 5).
    pub async fn finalize<R: Send>(
        &self,
        cancel: &CancellationToken,
        close_lock: &Mutex<()>,
        writer: Box<dyn ColumnFileWriter<R>>,
        written_offsets: &HashMap<i32, i64>,
        metrics: &dyn MetricSink,
        consumer: &mut dyn LogConsumer,
    ) -> Result<()> {
        // 1. Snapshot before close; the writer nulls these after close.
        let data_size = writer.data_size();
        let record_count = writer.record_count();

        // 2. Close under close-lock so the supervisor's interrupt never
        //    lands mid-close.
        {
            let _guard = close_lock.lock().await;
            writer.close().await?;
        }

        // 3. Flushed metrics reflect the snapshotted totals.
        metrics.increment(FLUSHED_RECORDS, record_count);
        metrics.increment(FLUSHED_BYTES, data_size);

        // 4. current_file is nulled by the caller after this returns.

        // 5. Resolve destination directory, creating it if absent.
        let now = Local::now();
        let dest_dir = self.destination_dir(now, cancel).await?;
        let final_path = dest_dir.join(self.final_name(now));

        // 6. rename(temp, final) under retry.
        let fs = Arc::clone(&self.fs);
        let temp_path = self.temp_path();
        let final_for_retry = final_path.clone();
        retry(cancel, || {
            let fs = Arc::clone(&fs);
            let from = temp_path.clone();
            let to = final_for_retry.clone();
            async move { fs.rename(&from, &to).await }
        })
        .await?;

        // 7. Commit `value + 1` for every partition this file covers. The
        //    commit takes `consumer` by unique reference, which does not fit
        //    the `Fn`-bound generic retry combinator, so it is retried with
        //    an explicit loop instead.
        if !written_offsets.is_empty() {
            let commit_offsets: HashMap<i32, i64> =
                written_offsets.iter().map(|(partition, offset)| (*partition, offset + 1)).collect();
            loop {
                match consumer.commit_async(&commit_offsets).await {
                    Ok(()) => break,
                    Err(err) if err.is_transient() => {
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Err(crate::error::IngestError::cancelled()),
                            () = tokio::time::sleep(crate::retry::RETRY_BACKOFF) => {}
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConsumer, FakeFs, FakeWriter};

    #[tokio::test]
    async fn final_name_uses_instance_index_and_parquet_suffix() {
        let finalizer = Finalizer::new(
            Arc::new(FakeFs::default()),
            PathBuf::from("/tmp/sparq"),
            None,
            "writer".to_string(),
            3,
        );
        let now: DateTime<Local> = Local::now();
        let name = finalizer.final_name(now);
        assert!(name.ends_with("_writer_3.parquet"));
    }

    #[tokio::test]
    async fn temp_path_is_stable_across_calls() {
        let finalizer = Finalizer::new(
            Arc::new(FakeFs::default()),
            PathBuf::from("/tmp/sparq"),
            None,
            "writer".to_string(),
            0,
        );
        assert_eq!(finalizer.temp_path(), finalizer.temp_path());
        assert_eq!(finalizer.temp_path(), PathBuf::from("/tmp/sparq/writer_0.tmp"));
    }

    #[tokio::test]
    async fn finalize_renames_and_commits_next_offsets() {
        let fs = Arc::new(FakeFs::default());
        let finalizer = Finalizer::new(Arc::clone(&fs) as _, PathBuf::from("/tmp/sparq"), None, "writer".to_string(), 0);
        let cancel = CancellationToken::new();
        let lock = Mutex::new(());
        let writer: Box<dyn ColumnFileWriter<Vec<u8>>> = Box::new(FakeWriter::with_totals(10, 100));
        let mut offsets = HashMap::new();
        offsets.insert(0, 41i64);
        let mut consumer = FakeConsumer::default();
        let metrics = crate::collaborators::NullMetricSink;

        finalizer
            .finalize(&cancel, &lock, writer, &offsets, &metrics, &mut consumer)
            .await
            .unwrap();

        assert_eq!(consumer.committed.get(&0).copied(), Some(42));
        assert!(fs.renamed.lock().unwrap().len() == 1);
    }
}
