//! Wire format, naming, and metrics primitives shared by the CCNF forwarder
//! and the NFP routing protocol.
//!
//! This crate has no knowledge of tables, delay queues, or the forwarding
//! pipeline — it only knows how to name things, how to turn them into bytes,
//! and how to count them.

pub mod error;
pub mod metrics;
pub mod name;
pub mod nfp_wire;
pub mod packet;
pub mod tlv;
pub mod wire;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use name::{HashValue, Name, NameComponent};
pub use packet::{ContentObject, Interest, InterestReturn, Packet};
