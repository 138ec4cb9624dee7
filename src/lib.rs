//! Client for the ABX market-data replay server.
//!
//! The server replays sequenced market updates over a fixed-frame TCP protocol. A run
//! streams everything the server has, finds holes in the sequence space, asks for each
//! missing sequence on its own connection, and hands back a gap-free ordered set.

pub mod config;
pub mod error;
pub mod output;
pub mod protocol;
pub mod recovery;
pub mod store;
pub mod transport;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use protocol::{Packet, Request, FRAME_LEN};
pub use recovery::{RecoveryCoordinator, RecoveryReport, Unresolved};
pub use store::SequenceStore;
pub use transport::{PacketSource, PacketStream, Transport};
