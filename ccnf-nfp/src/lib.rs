//! NFP: the name-flooding routing protocol. Neighbor discovery,
//! anchor-advertisement propagation, and FIB synchronization layered
//! on top of `ccnf-core`'s forwarder. See spec.md §4.6–§4.10.

pub mod advertisement;
pub mod config;
pub mod neighbor;
pub mod protocol;
pub mod seqnum;
pub mod timers;
pub mod workqueue;

pub use advertisement::{AdvertiseOutcome, AnchorAdvertisement, PrefixTable};
pub use config::NfpConfig;
pub use neighbor::{Neighbor, NeighborState};
pub use protocol::{nfp_root, RoutingProtocol};
pub use workqueue::WorkQueue;
