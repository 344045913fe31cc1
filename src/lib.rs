//! # pcloud-binapi
//!
//! Client codec for the pCloud binary RPC protocol:
//! - Compact command frames with typed parameters
//! - Self-describing responses with a per-response string table
//! - Raw payload streaming in both directions
//! - Strict, fail-fast channel semantics
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BinaryConnection                          │
//! │        (persistent params, one exchange at a time)           │
//! └──────────┬──────────────────┬───────────────────┬───────────┘
//!            │                  │                   │
//!            ▼                  ▼                   ▼
//!     ┌─────────────┐    ┌─────────────┐     ┌─────────────┐
//!     │   Encoder   │    │   Decoder   │     │  Transfer   │
//!     │  (Frame)    │    │ (Value tree)│     │  (payload)  │
//!     └──────┬──────┘    └──────┬──────┘     └──────┬──────┘
//!            │                  │                   │
//!            └──────────────────┼───────────────────┘
//!                               ▼
//!                        ┌─────────────┐
//!                        │   Channel   │
//!                        │ (TCP / TLS) │
//!                        └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use pcloud_binapi::{BinaryConnection, Config, Params};
//!
//! let config = Config::builder().auth("token").build();
//! let mut conn = BinaryConnection::new(config);
//! conn.connect()?;
//! let result = conn.send_command("listfolder", Params::new().with("path", "/"))?;
//! println!("{:?}", result.result_code());
//! # Ok::<(), pcloud_binapi::BinapiError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BinapiError, Result};
pub use config::Config;
pub use network::{BinaryConnection, Payload};
pub use protocol::{ParamValue, Params, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pcloud-binapi
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
