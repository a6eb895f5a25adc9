//! Redis Event Mirror
//!
//! Publishes every bus event as JSON to a Redis pub/sub channel named after
//! its topic, so external consumers can follow the settlement lifecycle and
//! trade flow. Degrades gracefully: when Redis is unreachable at startup the
//! mirror is simply not spawned.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::{topics, EventBus};

/// Thin JSON publisher over a managed Redis connection.
#[derive(Clone)]
pub struct RedisPublisher {
    connection: ConnectionManager,
}

impl RedisPublisher {
    /// Connect to Redis, failing fast so the caller can degrade.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!("Redis event mirror connected to {}", url);
        Ok(Self { connection })
    }

    /// Publish a JSON-serialized message, returning the subscriber count.
    pub async fn publish_json<T: Serialize>(
        &self,
        channel: &str,
        message: &T,
    ) -> Result<i32, RedisError> {
        let json = serde_json::to_string(message).map_err(|e| {
            RedisError::from((
                redis::ErrorKind::IoError,
                "Serialization error",
                e.to_string(),
            ))
        })?;
        let mut conn = self.connection.clone();
        conn.publish(channel, json).await
    }
}

/// Spawn one mirror worker per topic. Each worker forwards bus events until
/// its channel closes; publish failures are logged and skipped.
pub fn spawn_mirror_workers(bus: &EventBus, publisher: RedisPublisher) {
    macro_rules! mirror {
        ($rx:expr, $publisher:expr, $topic:expr) => {{
            let mut rx = $rx;
            let publisher = $publisher;
            tokio::spawn(async move {
                tracing::info!("Redis mirror worker started for {}", $topic);
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            if let Err(e) = publisher.publish_json($topic, &event).await {
                                tracing::warn!("Failed to mirror {} event to Redis: {}", $topic, e);
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!("Redis mirror for {} lagged {} events", $topic, n);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                tracing::warn!("Redis mirror worker for {} stopped", $topic);
            });
        }};
    }

    mirror!(
        bus.subscribe_settlement_requests(),
        publisher.clone(),
        topics::SETTLEMENT_REQUESTS
    );
    mirror!(
        bus.subscribe_settlement_confirmed(),
        publisher.clone(),
        topics::SETTLEMENT_CONFIRMED
    );
    mirror!(
        bus.subscribe_settlement_failed(),
        publisher.clone(),
        topics::SETTLEMENT_FAILED
    );
    mirror!(bus.subscribe_trades(), publisher, topics::TRADES);
}

/// Try to connect and spawn the mirror; log and continue without it when
/// Redis is unavailable.
pub async fn try_spawn_mirror(bus: &Arc<EventBus>, redis_url: &str) {
    match RedisPublisher::connect(redis_url).await {
        Ok(publisher) => spawn_mirror_workers(bus, publisher),
        Err(e) => {
            tracing::warn!(
                "Redis unavailable at {} ({}), event mirror disabled",
                redis_url,
                e
            );
        }
    }
}
