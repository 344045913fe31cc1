//! Protocol Module
//!
//! Wire codec for the binary API: command frames out, tagged values in.
//!
//! ## Request Format
//! ```text
//! ┌─────────┬─────────┬──────────────┬──────────┬───────────┬────────────┐
//! │ Len (2) │ Mlen(1) │ DataLen (8)? │ Method   │ Count (1) │ Params ... │
//! └─────────┴─────────┴──────────────┴──────────┴───────────┴────────────┘
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │     Tagged value tree       │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! A response may carry a raw-data marker; the announced bytes follow the
//! value on the stream and are handled by the network layer.

mod params;
mod value;
mod encoder;
mod decoder;

pub use params::{ParamValue, Params};
pub use value::Value;
pub use encoder::{encode, Frame, LENGTH_PREFIX_SIZE, MAX_FRAME_BODY, MAX_KEY_LEN, MAX_METHOD_LEN, MAX_PARAMS};
pub use decoder::{decode_response, decode_value, StringTable, RESPONSE_HEADER_SIZE, TERMINATOR};

pub(crate) use decoder::fill_exact;
