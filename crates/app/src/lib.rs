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

//! Process lifecycle around a [`WriterSupervisor`]: starts the worker pool,
//! waits for a shutdown signal, then drains it.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bon::Builder;
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu};
use sparq_common_telemetry as telemetry;
use sparq_ingest::{IngestConfig, WriterSupervisor};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Snafu)]
pub enum AppError {
    #[snafu(display("failed to start worker pool: {source}"))]
    Start { source: sparq_ingest::IngestError },
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Application configuration. `logging` controls the process-wide tracing
/// subscriber; `enable_graceful_shutdown` controls whether ctrl-c/SIGTERM are
/// honoured or the process only stops when explicitly told to.
#[derive(Debug, Clone, SmartDefault, Builder)]
pub struct AppConfig {
    #[default = true]
    #[builder(default = true)]
    pub enable_graceful_shutdown: bool,
    #[builder(default)]
    pub logging: telemetry::logging::LoggingOptions,
}

impl AppConfig {
    #[must_use]
    pub fn open<R: Send + 'static>(self, ingest_config: Arc<IngestConfig<R>>) -> App<R> {
        App {
            config: self,
            ingest_config,
            running: Arc::new(AtomicBool::new(false)),
            cancellation_token: CancellationToken::new(),
        }
    }
}

/// The running process: application-wide configuration plus the ingest
/// engine it drives.
pub struct App<R: Send + 'static> {
    pub config:             AppConfig,
    ingest_config:          Arc<IngestConfig<R>>,
    running:                Arc<AtomicBool>,
    cancellation_token:     CancellationToken,
}

/// Handle for controlling a running application.
pub struct AppHandle {
    shutdown_tx:        Option<oneshot::Sender<()>>,
    running:            Arc<AtomicBool>,
    cancellation_token: CancellationToken,
}

impl AppHandle {
    /// Triggers a graceful shutdown; idempotent.
    pub fn shutdown(&mut self) {
        info!("initiating graceful shutdown");
        self.running.store(false, Ordering::SeqCst);
        self.cancellation_token.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    pub async fn wait_for_shutdown(&self) { self.cancellation_token.cancelled().await; }
}

impl<R: Send + 'static> App<R> {
    /// Starts the worker pool and returns a handle for controlling it. The
    /// pool itself is spawned onto `sparq_common_runtime`'s dedicated
    /// execution carriers, not the caller's runtime.
    async fn start(&self) -> Result<AppHandle> {
        let _guards = telemetry::logging::init_tracing_subscriber("sparq", &self.config.logging);
        telemetry::panic_hook::set_panic_hook();
        info!("starting sparq ingest engine");

        self.running.store(true, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app_handle = AppHandle {
            shutdown_tx:        Some(shutdown_tx),
            running:            Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
        };

        let mut supervisor = WriterSupervisor::new(Arc::clone(&self.ingest_config));
        supervisor.start().await.context(StartSnafu)?;
        info!("worker pool started");

        let cancellation_token = self.cancellation_token.clone();
        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;

        tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                let _ = shutdown_rx.await;
            }
            cancellation_token.cancel();
            info!("shutting down worker pool");
            supervisor.close().await;
            info!("worker pool shut down");
        });

        Ok(app_handle)
    }

    /// Runs until shut down.
    pub async fn run(self) -> Result<()> {
        let handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received ctrl-c"); },
        () = terminate => { info!("received terminate signal"); },
        _ = shutdown_rx => { info!("received shutdown signal"); },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_graceful_shutdown() {
        let config = AppConfig::builder().build();
        assert!(config.enable_graceful_shutdown);
    }
}
