//! NFP timer and protocol configuration, with the defaults from
//! spec.md §4.9 and §6.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct NfpConfig {
    pub hello_interval: Duration,
    pub advertise_interval: Duration,
    pub anchor_route_interval: Duration,
    pub jitter: Duration,
    pub route_timeout: Duration,
    pub neighbor_timeout: Duration,
}

impl Default for NfpConfig {
    fn default() -> Self {
        Self {
            hello_interval: Duration::from_secs(2),
            advertise_interval: Duration::from_secs(5),
            anchor_route_interval: Duration::from_secs(5),
            jitter: Duration::from_millis(100),
            route_timeout: Duration::from_secs(15),
            neighbor_timeout: Duration::from_secs(6),
        }
    }
}
