#![forbid(unsafe_code)]

//! Transport-level envelope stripping.
//!
//! Gateway payloads arrive wrapped in a fixed ActionCable envelope:
//! `{"identifier":"{\"channel\":\"GatewayChannel\"}","message":<body>}`.
//! The wrapper is constant-width, so the body is recovered by offset rather
//! than by structural parsing; the body's own shape varies per category and a
//! structural strip must not depend on it. The offsets are coupled to a wire
//! format outside our control, so `prefix_matches_offsets` in the test module
//! pins them against the literal prefix and fails loudly on drift.

/// The fixed wrapper prefix every enveloped payload starts with.
pub const ENVELOPE_PREFIX: &str = r#"{"identifier":"{\"channel\":\"GatewayChannel\"}","message":"#;

/// Characters occupied by the wrapper prefix.
pub const ENVELOPE_PREFIX_LEN: usize = 59;

/// Characters occupied by the wrapper suffix (the closing `}`).
pub const ENVELOPE_SUFFIX_LEN: usize = 1;

/// Payloads shorter than this carry no wrapper: control frames, handshake
/// acks and rejections are delivered bare.
pub const ENVELOPE_MIN_LEN: usize = ENVELOPE_PREFIX_LEN + ENVELOPE_SUFFIX_LEN;

/// Strip the transport envelope from a raw payload.
///
/// Identity for payloads shorter than [`ENVELOPE_MIN_LEN`]; otherwise returns
/// the slice between the fixed prefix and suffix. Inputs where the offsets do
/// not land on char boundaries are returned unchanged rather than panicking.
pub fn strip_envelope(raw: &str) -> &str {
	if raw.len() < ENVELOPE_MIN_LEN {
		return raw;
	}

	raw.get(ENVELOPE_PREFIX_LEN..raw.len() - ENVELOPE_SUFFIX_LEN).unwrap_or(raw)
}
