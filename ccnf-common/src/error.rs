//! Error types shared across the CCNF workspace.

use thiserror::Error;

/// All possible errors that can occur while encoding, decoding, or
/// otherwise manipulating CCNF wire structures.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to packet encoding/decoding.
    #[error("packet error: {0}")]
    Packet(String),

    /// Error related to NFP message encoding/decoding.
    #[error("NFP protocol error: {0}")]
    Nfp(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors.
    #[error("{0}")]
    Other(String),
}
