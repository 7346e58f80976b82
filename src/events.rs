//! Fire-and-forget event publishing.
//!
//! Completed rounds are broadcast to external subscribers (leaderboards,
//! chat feed). Delivery is at-most-once with no ordering guarantee; a publish
//! must never block or fail the settlement path, so send errors (no
//! subscribers, lagging receivers) are simply dropped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::game::GameStatus;

pub const TOPIC_BET_SETTLED: &str = "bets.settled";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BetSettledEvent {
    pub game_id: Uuid,
    pub user_id: String,
    pub status: GameStatus,
    pub bet_amount: Decimal,
    pub payout: Decimal,
    pub multiplier: Decimal,
    pub completed_at: DateTime<Utc>,
}

/// An event as seen by subscribers.
#[derive(Clone, Debug)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Boundary contract for the pub/sub channel. Synchronous and infallible by
/// design: implementations must buffer or drop, never block settlement.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Broadcast-channel publisher. Subscribers that fall behind lose events,
/// which is acceptable for this at-most-once channel.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastPublisher {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        // No subscribers is not an error for fire-and-forget delivery.
        let _ = self.sender.send(PublishedEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let publisher = BroadcastPublisher::new(16);
        let mut rx = publisher.subscribe();

        publisher.publish(TOPIC_BET_SETTLED, serde_json::json!({"game": "g1"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, TOPIC_BET_SETTLED);
        assert_eq!(event.payload["game"], "g1");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let publisher = BroadcastPublisher::new(16);
        publisher.publish(TOPIC_BET_SETTLED, serde_json::json!({}));
    }

    #[tokio::test]
    async fn event_payload_round_trips() {
        let event = BetSettledEvent {
            game_id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            status: GameStatus::Completed,
            bet_amount: "10.00".parse().unwrap(),
            payout: "19.97".parse().unwrap(),
            multiplier: "1.997".parse().unwrap(),
            completed_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        let back: BetSettledEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.game_id, event.game_id);
        assert_eq!(back.payout, event.payout);
        assert_eq!(back.status, GameStatus::Completed);
    }
}
