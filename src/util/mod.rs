//! Utility Functions Module
//!
//! Small helpers shared across the client: the `bacnet_enum!` generator and
//! payload rendering for log lines.

pub mod enum_macros;

/// Number of payload bytes rendered by [`payload_preview`]
pub const PREVIEW_LIMIT: usize = 64;

/// Render a datagram as hex for logging, truncated to `PREVIEW_LIMIT` bytes
pub fn payload_preview(data: &[u8]) -> String {
    if data.len() <= PREVIEW_LIMIT {
        hex::encode(data)
    } else {
        format!(
            "{}... ({} bytes)",
            hex::encode(&data[..PREVIEW_LIMIT]),
            data.len()
        )
    }
}
