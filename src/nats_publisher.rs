use anyhow::Result;
use async_nats::Client;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::working_set::DeltaPublisher;

/// NATS publisher for online-set delta events
///
/// Subjects carry the same names as the Redis channels (`PILOT:UPDATE`, `CONTROLLER:DELETE`, ...)
/// and the payload is the bare identifier.
#[derive(Clone)]
pub struct NatsDeltaPublisher {
    nats_client: Arc<Client>,
}

impl NatsDeltaPublisher {
    /// Connect to the NATS server
    pub async fn new(nats_url: &str) -> Result<Self> {
        info!("Connecting to NATS server at {}", nats_url);
        let nats_client = async_nats::ConnectOptions::new()
            .name("artcc-sync")
            .connect(nats_url)
            .await?;

        Ok(Self {
            nats_client: Arc::new(nats_client),
        })
    }
}

#[async_trait]
impl DeltaPublisher for NatsDeltaPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.nats_client
            .publish(channel.to_string(), payload.to_string().into())
            .await?;
        debug!("Published {} to NATS subject {}", payload, channel);
        Ok(())
    }
}
