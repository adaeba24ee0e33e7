//! Stream Client Metrics
//!
//! Records client metrics through the `metrics` facade. The host application
//! installs the recorder (Prometheus or otherwise); without one every call
//! is a no-op.
//!
//! # Metrics Categories
//!
//! - **Messages**: Inbound messages by kind, malformed frames
//! - **Connection**: Connection state and reconnection attempts
//! - **Subscriptions**: Desired instrument count
//! - **Callbacks**: Consumer callback failures

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Describe all client metrics to the installed recorder.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(
        "price_stream_messages_received_total",
        "Total messages received from the price stream by kind"
    );
    describe_counter!(
        "price_stream_malformed_frames_total",
        "Total inbound frames dropped because they could not be decoded"
    );

    describe_gauge!(
        "price_stream_connected",
        "1 while the price stream connection is open, 0 otherwise"
    );
    describe_counter!(
        "price_stream_reconnects_total",
        "Total scheduled reconnection attempts"
    );

    describe_gauge!(
        "price_stream_subscriptions",
        "Number of instruments the client wants to receive"
    );

    describe_counter!(
        "price_stream_callback_failures_total",
        "Total price callbacks that returned an error or panicked"
    );
}

/// Record an inbound message of `kind`.
pub fn record_message_received(kind: &'static str) {
    counter!("price_stream_messages_received_total", "kind" => kind).increment(1);
}

/// Record a dropped malformed frame.
pub fn record_malformed_frame() {
    counter!("price_stream_malformed_frames_total").increment(1);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("price_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("price_stream_reconnects_total").increment(1);
}

/// Update the subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("price_stream_subscriptions").set(count as f64);
}

/// Record a failed price callback.
pub fn record_callback_failure() {
    counter!("price_stream_callback_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        describe_metrics();
        record_message_received("price_update");
        record_malformed_frame();
        set_connected(true);
        set_connected(false);
        record_reconnect();
        set_subscriptions(3);
        record_callback_failure();
    }
}
