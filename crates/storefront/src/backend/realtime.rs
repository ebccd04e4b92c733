//! Change notification for new orders.
//!
//! The back office dashboard wants to hear about every order the moment it
//! lands. The transport is the collaborator's concern; this module exposes
//! the subscription as a broadcast channel fed by a background task that
//! watches the `orders` collection with a creation-time watermark.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use luxe_core::Order;

use super::rest::{Query, RestClient, SortDirection};

/// How many undelivered order events a slow subscriber may lag behind.
const CHANNEL_CAPACITY: usize = 64;

/// Subscription hub for insert events on the `orders` collection.
#[derive(Clone)]
pub struct OrderFeed {
    tx: broadcast::Sender<Order>,
}

impl Default for OrderFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFeed {
    /// Create a feed with no watcher attached yet.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to new-order events.
    ///
    /// Each subscriber receives every order inserted after the watcher's
    /// start; a subscriber that falls more than the channel capacity behind
    /// sees a lag error and continues from the current position.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Order> {
        self.tx.subscribe()
    }

    /// Deliver an order to all current subscribers.
    ///
    /// Used by the watcher task; also the seam tests publish through.
    pub fn publish(&self, order: Order) {
        // Send only fails when there are no subscribers, which is fine
        let _ = self.tx.send(order);
    }

    /// Spawn the background watcher.
    ///
    /// Polls the `orders` collection for records created after the watermark,
    /// publishing each and advancing the watermark. Query failures are logged
    /// and retried on the next tick; the task runs until aborted.
    pub fn spawn_watcher(&self, rest: RestClient, poll_interval: Duration) -> JoinHandle<()> {
        let feed = self.clone();
        info!(interval_secs = poll_interval.as_secs(), "starting order feed watcher");

        tokio::spawn(async move {
            let mut watermark: DateTime<Utc> = Utc::now();
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let query = Query::new()
                    .gt("created_at", watermark.to_rfc3339())
                    .order_by("created_at", SortDirection::Ascending);

                match rest.select::<Order>("orders", &query).await {
                    Ok(orders) => {
                        for order in orders {
                            debug!(order_id = %order.id, "new order observed");
                            watermark = watermark.max(order.created_at);
                            feed.publish(order);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "order feed poll failed; will retry");
                    }
                }
            }
        })
    }
}
