//! # packetwire
//!
//! Length-prefixed packet framing over a duplex byte transport.
//!
//! A [`PacketFramer`] wraps one [`Transport`](transport::Transport) and turns
//! its boundary-less byte stream into discrete packets of any size. It
//! handles partial reads and writes, keeps a ledger of unflushed bytes, offers
//! a blocking wait on top of the transport's readiness events, and stops
//! parsing for good when a header announces an out-of-range length.
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ frame_length │ payload                  │
//! │ 4 bytes      │ frame_length - 4 bytes   │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use packetwire::PacketFramer;
//! use packetwire::transport::MemoryTransport;
//!
//! let (a, b) = MemoryTransport::pair();
//! let mut client = PacketFramer::new(a);
//! let mut server = PacketFramer::new(b);
//!
//! client.send(b"ping").unwrap();
//!
//! assert!(server.wait_for_ready_read(Some(Duration::from_secs(1))).unwrap());
//! while let Some(packet) = server.read() {
//!     assert_eq!(&packet[..], b"ping");
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod protocol;
pub mod transport;

mod framer;

pub use config::FramerConfig;
pub use error::{FramerError, Result};
pub use framer::{FramerBuilder, FramerEvent, PacketFramer};
