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

//! Retry harness (§4.1, C1).
//!
//! Retries a fallible operation on transient filesystem/log I/O error with a
//! fixed 100ms back-off, forever. Cancellation aborts immediately without
//! retrying; any other error is fatal and propagates as-is.

use std::{future::Future, time::Duration};

use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

/// Fixed back-off between retry attempts (§4.1).
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Runs `op`, retrying indefinitely while it returns a transient error.
/// Returns early with [`IngestError::Cancelled`] if `cancel` fires, even
/// mid-backoff sleep. Non-transient errors (fatal, malformed record,
/// configuration) propagate on the first attempt without retrying.
pub async fn retry<F, Fut, T>(cancel: &CancellationToken, op: F) -> Result<T, IngestError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, IngestError>>,
{
    let backoff = ConstantBuilder::default()
        .with_delay(RETRY_BACKOFF)
        .without_max_times();

    let attempt = (|| op()).retry(backoff).when(IngestError::is_transient);

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(IngestError::cancelled()),
        result = attempt => result,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{FilesystemTransientSnafu, FatalSnafu};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let result = retry(&cancel, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                FilesystemTransientSnafu {
                    message: "not yet".to_string(),
                }
                .fail()
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let attempts = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), IngestError> = retry(&cancel, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            FatalSnafu {
                message: "programmer error".to_string(),
            }
            .fail()
        })
        .await;

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_without_waiting_for_success() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), IngestError> = retry(&cancel, || async {
            FilesystemTransientSnafu {
                message: "down".to_string(),
            }
            .fail()
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
