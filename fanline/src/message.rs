//! Delivered messages and their total order.

use std::cmp::Ordering;

use crate::document::Document;
use crate::id::SubscriptionId;

/// One delivered message: the decoded unit a poll hands back.
#[derive(Debug, Clone)]
pub struct SubscriptionMessage {
    pub subscription_id: SubscriptionId,
    pub channel: String,
    pub body: Document,
    pub timestamp: u64,
}

// Ordering and equality consider the delivery key only — (subscriber,
// channel, timestamp) — never the body. `BinaryHeap` pops its greatest
// element, so "greater" here means "delivered earlier": ascending
// subscriber id, then ascending channel, then newest timestamp first
// within one (subscriber, channel) pair.

impl PartialEq for SubscriptionMessage {
    fn eq(&self, other: &Self) -> bool {
        self.subscription_id == other.subscription_id
            && self.channel == other.channel
            && self.timestamp == other.timestamp
    }
}

impl Eq for SubscriptionMessage {}

impl PartialOrd for SubscriptionMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubscriptionMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .subscription_id
            .cmp(&self.subscription_id)
            .then_with(|| other.channel.cmp(&self.channel))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
    }
}
