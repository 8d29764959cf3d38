//! Per-component configuration structs with the defaults from
//! spec.md §6 ("Control surface").

use crate::delay::LinearDelay;
use std::time::Duration;

/// Shared defaults for the affine service-time formula
/// (`constant + slope × units`), as given for the Content Store in
/// spec.md §6 and applied uniformly to FIB/PIT/Forwarder per their
/// "same delay knobs" note.
const DEFAULT_LAYER_DELAY_CONSTANT: Duration = Duration::from_micros(1);
const DEFAULT_LAYER_DELAY_SLOPE: Duration = Duration::from_nanos(10);
const DEFAULT_LAYER_DELAY_SERVERS: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct ContentStoreConfig {
    pub object_capacity: usize,
    pub layer_delay_constant: Duration,
    pub layer_delay_slope: Duration,
    pub layer_delay_servers: usize,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            object_capacity: 10_000,
            layer_delay_constant: DEFAULT_LAYER_DELAY_CONSTANT,
            layer_delay_slope: DEFAULT_LAYER_DELAY_SLOPE,
            layer_delay_servers: DEFAULT_LAYER_DELAY_SERVERS,
        }
    }
}

impl ContentStoreConfig {
    pub fn delay(&self) -> LinearDelay {
        LinearDelay::new(self.layer_delay_constant, self.layer_delay_slope)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PitConfig {
    pub default_lifetime: Duration,
    pub layer_delay_constant: Duration,
    pub layer_delay_slope: Duration,
    pub layer_delay_servers: usize,
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            default_lifetime: Duration::from_millis(200),
            layer_delay_constant: DEFAULT_LAYER_DELAY_CONSTANT,
            layer_delay_slope: DEFAULT_LAYER_DELAY_SLOPE,
            layer_delay_servers: DEFAULT_LAYER_DELAY_SERVERS,
        }
    }
}

impl PitConfig {
    pub fn delay(&self) -> LinearDelay {
        LinearDelay::new(self.layer_delay_constant, self.layer_delay_slope)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FibConfig {
    pub layer_delay_constant: Duration,
    pub layer_delay_slope: Duration,
    pub layer_delay_servers: usize,
}

impl Default for FibConfig {
    fn default() -> Self {
        Self {
            layer_delay_constant: DEFAULT_LAYER_DELAY_CONSTANT,
            layer_delay_slope: DEFAULT_LAYER_DELAY_SLOPE,
            layer_delay_servers: DEFAULT_LAYER_DELAY_SERVERS,
        }
    }
}

impl FibConfig {
    pub fn delay(&self) -> LinearDelay {
        LinearDelay::new(self.layer_delay_constant, self.layer_delay_slope)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForwarderConfig {
    pub layer_delay_constant: Duration,
    pub layer_delay_slope: Duration,
    pub layer_delay_servers: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            layer_delay_constant: DEFAULT_LAYER_DELAY_CONSTANT,
            layer_delay_slope: DEFAULT_LAYER_DELAY_SLOPE,
            layer_delay_servers: DEFAULT_LAYER_DELAY_SERVERS,
        }
    }
}

impl ForwarderConfig {
    pub fn delay(&self) -> LinearDelay {
        LinearDelay::new(self.layer_delay_constant, self.layer_delay_slope)
    }
}
