#![forbid(unsafe_code)]

//! Textual message classification.
//!
//! Categories are assigned by ordered literal containment checks on the raw,
//! unstripped payload. Classification deliberately happens before any JSON
//! decode: the categories do not share a schema, and a payload with a missing
//! nested object must still classify so the decode fallback in
//! [`crate::extract`] can apply per category.

use joystick_domain::StreamEventKind;

/// Marker ping payloads start with.
const PING_PREFIX: &str = r#"{"type":"ping""#;

/// Bare control frames (welcome, confirm_subscription, rejections) start with
/// a top-level `type` and carry nothing addressed to the caller.
const CONTROL_PREFIX: &str = r#"{"type""#;

const CHAT_MARKER: &str = r#""event":"ChatMessage""#;
const BOT_MARKER: &str = r#""event":"BotMessage""#;
const STREAM_EVENT_MARKER: &str = r#""event":"StreamEvent""#;
const ENTER_MARKER: &str = r#""type":"enter_stream""#;
const LEAVE_MARKER: &str = r#""type":"leave_stream""#;

/// The classified kind of an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
	Ping,
	Bot,
	Chat,
	UserEnter,
	UserLeave,
	Stream(StreamEventKind),
	UnknownStream,
	Unknown,
}

/// Classify a raw payload by literal content, case-sensitively.
pub fn classify(raw: &str) -> Category {
	if raw.starts_with(PING_PREFIX) {
		return Category::Ping;
	}
	if raw.starts_with(CONTROL_PREFIX) {
		return Category::Unknown;
	}

	if raw.contains(CHAT_MARKER) {
		return Category::Chat;
	}
	if raw.contains(BOT_MARKER) {
		return Category::Bot;
	}

	if raw.contains(ENTER_MARKER) {
		return Category::UserEnter;
	}
	if raw.contains(LEAVE_MARKER) {
		return Category::UserLeave;
	}

	if raw.contains(STREAM_EVENT_MARKER) {
		for kind in StreamEventKind::ALL {
			if raw.contains(&subtype_marker(kind)) {
				return Category::Stream(kind);
			}
		}
		return Category::UnknownStream;
	}

	Category::Unknown
}

/// The literal a stream event subtype is recognized by, e.g. `"type":"Tipped"`.
fn subtype_marker(kind: StreamEventKind) -> String {
	format!(r#""type":"{}""#, kind.as_wire())
}
