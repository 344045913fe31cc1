//! Network Module
//!
//! Byte channel, raw payload transfer and the binary connection.
//!
//! ## Architecture
//! - One channel per connection, never shared
//! - One outstanding exchange per channel
//! - Raw data announced by a result is drained before the next command

mod channel;
mod connection;
mod transfer;

pub use channel::Channel;
pub use connection::{BinaryConnection, DataReader, AUTH_PARAM};
pub use transfer::{drain_payload, send_payload, Payload, SeekRead};
