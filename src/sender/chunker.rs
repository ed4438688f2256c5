//! Transaction chunking.

/// Split a transaction hex string into ordered chunk payloads.
///
/// Fixed-size pieces; the last may be shorter. The piece count is
/// `ceil(len / chunk_size)`, so an empty input yields no chunks and the
/// caller must reject it before opening a session.
pub fn split_hex(tx_hex: &str, chunk_size: usize) -> Vec<String> {
    debug_assert!(chunk_size > 0);
    debug_assert!(tx_hex.is_ascii());

    tx_hex
        .as_bytes()
        .chunks(chunk_size.max(1))
        .map(|piece| String::from_utf8_lossy(piece).into_owned())
        .collect()
}
