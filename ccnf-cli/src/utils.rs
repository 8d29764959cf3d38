//! CLI-only formatting for content carried in a single CCNF packet.
//! Sizes here are measured against the wire format's own ceiling
//! (`ccnf_transport::MAX_PACKET_SIZE`), not generic file-size units —
//! a ContentObject too big for one packet is the caller's problem
//! (spec.md §7), but the CLI should say so plainly.

use std::time::Instant;

/// Content within this many bytes of the wire ceiling is worth
/// flagging: one extra hop header pushed on by the forwarder could
/// tip it over into the `Tlv` encode error `encode_packet` now
/// returns instead of panicking.
const NEAR_CEILING_MARGIN: usize = 4096;

/// Elapsed time since `start`, to millisecond precision. Interest
/// round trips on a local or LAN topology are expected to land well
/// under a second, so finer units aren't useful here.
pub fn elapsed_ms(start: Instant) -> String {
    format!("{:.1}ms", start.elapsed().as_secs_f64() * 1000.0)
}

/// One-line summary of a ContentObject's payload size, flagging
/// anything close enough to `MAX_PACKET_SIZE` to be at risk of not
/// surviving re-encoding.
pub fn describe_content_size(len: usize) -> String {
    if len + NEAR_CEILING_MARGIN >= ccnf_transport::MAX_PACKET_SIZE {
        format!("{len} bytes (near the {}-byte wire ceiling)", ccnf_transport::MAX_PACKET_SIZE)
    } else {
        format!("{len} bytes")
    }
}

/// Print a section header in CLI output.
pub fn print_section(title: &str) {
    println!("\n[{title}]");
}
