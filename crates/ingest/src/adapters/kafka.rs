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

//! Production [`LogConsumer`] backed by `rdkafka`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use rdkafka::{
    ClientConfig, ClientContext, Message, Offset, TopicPartitionList,
    config::RDKafkaLogLevel,
    consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer},
};
use tokio::sync::Notify;

use crate::{
    collaborators::{ConsumedRecord, LogConsumer, LogConsumerFactory, PollOutcome, RebalanceListener},
    error::{IngestError, LogTransientSnafu, Result},
};

#[derive(Clone)]
struct SparqContext {
    listener: Arc<Mutex<Option<Box<dyn RebalanceListener>>>>,
}

impl ClientContext for SparqContext {}

impl ConsumerContext for SparqContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(partitions) = rebalance {
            let ids: Vec<i32> = partitions.elements().iter().map(|tp| tp.partition()).collect();
            if let Some(listener) = self.listener.lock().unwrap().as_mut() {
                listener.on_revoke(&ids);
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(partitions) = rebalance {
            let ids: Vec<i32> = partitions.elements().iter().map(|tp| tp.partition()).collect();
            if let Some(listener) = self.listener.lock().unwrap().as_mut() {
                listener.on_assign(&ids);
            }
        }
    }
}

/// A `rdkafka` `StreamConsumer`-backed [`LogConsumer`]. Wakeup is modelled
/// with a [`Notify`] rather than librdkafka's native `consumer.wakeup()`
/// because the async `recv()` future does not expose a cancel handle.
pub struct KafkaConsumer {
    inner:   StreamConsumer<SparqContext>,
    context: SparqContext,
    topic:   Mutex<String>,
    woken:   Arc<Notify>,
}

impl KafkaConsumer {
    fn build(properties: &HashMap<String, String>) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config.set_log_level(RDKafkaLogLevel::Info);
        for (key, value) in properties {
            client_config.set(key.as_str(), value.as_str());
        }

        let context = SparqContext {
            listener: Arc::new(Mutex::new(None)),
        };

        let inner: StreamConsumer<SparqContext> = client_config
            .create_with_context(context.clone())
            .map_err(|err| IngestError::WorkerInit {
                index:   0,
                message: err.to_string(),
                loc:     snafu::Location::new(file!(), line!(), column!()),
            })?;

        Ok(Self {
            inner,
            context,
            topic: Mutex::new(String::new()),
            woken: Arc::new(Notify::new()),
        })
    }
}

/// Builds [`KafkaConsumer`]s from the construction-time consumer properties.
pub struct KafkaConsumerFactory;

impl LogConsumerFactory for KafkaConsumerFactory {
    fn create(&self, properties: &HashMap<String, String>) -> Result<Box<dyn LogConsumer>> {
        Ok(Box::new(KafkaConsumer::build(properties)?))
    }
}

#[async_trait]
impl LogConsumer for KafkaConsumer {
    async fn subscribe(&mut self, topic: &str, listener: Box<dyn RebalanceListener>) -> Result<()> {
        *self.context.listener.lock().unwrap() = Some(listener);
        *self.topic.lock().unwrap() = topic.to_string();
        self.inner.subscribe(&[topic]).map_err(|err| {
            IngestError::WorkerInit {
                index:   0,
                message: err.to_string(),
                loc:     snafu::Location::new(file!(), line!(), column!()),
            }
        })
    }

    async fn poll(&mut self, timeout_ms: u64) -> Result<PollOutcome> {
        let woken = Arc::clone(&self.woken);
        tokio::select! {
            biased;
            () = woken.notified() => Ok(PollOutcome::WokenUp),
            result = self.inner.recv() => match result {
                Ok(message) => Ok(PollOutcome::Records(vec![ConsumedRecord {
                    partition: message.partition(),
                    offset:    message.offset(),
                    value:     message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                }])),
                Err(err) => LogTransientSnafu { message: err.to_string() }.fail(),
            },
            () = tokio::time::sleep(Duration::from_millis(timeout_ms.max(1))) => {
                Ok(PollOutcome::Records(Vec::new()))
            }
        }
    }

    async fn commit_async(&mut self, offsets: &HashMap<i32, i64>) -> Result<()> {
        let topic = self.topic.lock().unwrap().clone();
        let mut list = TopicPartitionList::new();
        for (partition, offset) in offsets {
            list.add_partition_offset(&topic, *partition, Offset::Offset(*offset))
                .map_err(|err| LogTransientSnafu { message: err.to_string() }.build())?;
        }
        self.inner
            .commit(&list, CommitMode::Async)
            .map_err(|err| LogTransientSnafu { message: err.to_string() }.build())
    }

    fn wakeup_handle(&self) -> Arc<dyn Fn() + Send + Sync> {
        let woken = Arc::clone(&self.woken);
        Arc::new(move || woken.notify_one())
    }

    async fn close(&mut self) -> Result<()> {
        // Consumer-group membership is released when `inner` drops.
        Ok(())
    }
}
