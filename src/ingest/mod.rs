
// Ingestion: wireless transport → session state machine → decoded events.
// The worker thread owns the session; everything leaves it as an `Event`.
pub mod codec;
pub mod transport;
pub mod session;
pub mod event_channel;
pub mod worker;
