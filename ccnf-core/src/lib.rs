//! The CCNF forwarding pipeline: the delay queue abstraction and the
//! three tables (FIB, PIT, Content Store) it drives, orchestrated by
//! the [`Forwarder`]. See spec.md §4.1–§4.5.

pub mod config;
pub mod connection;
pub mod content_store;
pub mod delay;
pub mod fib;
pub mod forwarder;
pub mod pit;

pub use connection::{Connection, ConnectionId, ConnectionTable};
pub use content_store::ContentStore;
pub use delay::DelayQueue;
pub use fib::Fib;
pub use forwarder::{ForwardError, Forwarder, RouteCallback};
pub use pit::Pit;
