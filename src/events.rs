//! Optional order event publication.
//!
//! Fire-and-forget: the order is already committed when this runs, so a
//! publish failure is logged and swallowed, never surfaced to the buyer.

use crate::checkout::Receipt;

pub const ORDER_PLACED_SUBJECT: &str = "shop.orders.placed";

pub async fn order_placed(nats: &Option<async_nats::Client>, receipt: &Receipt) {
    let Some(client) = nats else { return };
    let payload = match serde_json::to_vec(receipt) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(%err, "order event serialization failed");
            return;
        }
    };
    if let Err(err) = client
        .publish(ORDER_PLACED_SUBJECT.to_string(), payload.into())
        .await
    {
        tracing::warn!(%err, "order event publish failed");
    }
}
