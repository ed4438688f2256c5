//! Mapping backend errors to wire-safe short reasons.

/// Longest reason allowed to pass through unmapped.
const MAX_PASSTHROUGH_CHARS: usize = 120;

/// Substring match table, first hit wins.
///
/// Left side is matched case-insensitively against the backend's raw error
/// text; right side is what crosses the wire.
const REASON_TABLE: &[(&str, &str)] = &[
    ("already in mempool", "TX already in UTXO set"),
    ("txn-already-known", "TX already in UTXO set"),
    ("already in block chain", "TX already confirmed"),
    ("insufficient fee", "Insufficient fee"),
    ("min relay fee not met", "Insufficient fee"),
    ("mempool min fee not met", "Insufficient fee"),
    ("missing inputs", "Missing inputs"),
    ("bad-txns-inputs-missingorspent", "Missing inputs"),
    ("txn-mempool-conflict", "Mempool conflict"),
    ("bad-txns-in-belowout", "Output value exceeds input"),
    ("dust", "Dust output"),
    ("tx decode failed", "TX decode failed"),
];

/// Compress a backend error into a short reason fit for the transport.
///
/// Unmatched errors pass through truncated; the full text belongs in local
/// logs, not on the wire.
pub fn short_reason(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    for (needle, reason) in REASON_TABLE {
        if lowered.contains(needle) {
            return (*reason).to_string();
        }
    }

    if raw.len() <= MAX_PASSTHROUGH_CHARS {
        return raw.to_string();
    }
    let mut cut = MAX_PASSTHROUGH_CHARS;
    while cut > 0 && !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &raw[..cut], crate::core::constants::TRUNCATION_MARKER)
}
