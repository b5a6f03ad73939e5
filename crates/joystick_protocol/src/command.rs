#![forbid(unsafe_code)]

//! Outbound command encoding.
//!
//! Every command travels as JSON-in-JSON: the ActionCable envelope carries a
//! `data` field whose value is itself a JSON document encoded into a string.
//! Free text therefore sits two string levels deep and needs the three
//! character escape runs produced by [`escape_text`]; a single escaping pass
//! yields payloads the service fails to parse.

use joystick_domain::{ChannelId, MessageId};

/// The fixed subscribe command sent once after connecting.
pub const SUBSCRIBE_COMMAND: &str = r#"{"command":"subscribe","identifier":"{\"channel\":\"GatewayChannel\"}"}"#;

/// The exact confirmation the service must answer the subscribe with.
pub const SUBSCRIBE_CONFIRMATION: &str =
	r#"{"type":"confirm_subscription","identifier":"{\"channel\":\"GatewayChannel\"}"}"#;

/// An outbound moderation or chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Silence the sender of a message in a channel.
	MuteUser {
		message_id: MessageId,
		channel_id: ChannelId,
	},
	/// Block the sender of a message from a channel.
	BlockUser {
		message_id: MessageId,
		channel_id: ChannelId,
	},
	/// Lift a mute by username.
	UnmuteUser {
		username: String,
		channel_id: ChannelId,
	},
	/// Whisper a user in a channel.
	SendWhisper {
		username: String,
		text: String,
		channel_id: ChannelId,
	},
	/// Post a chat message to a channel.
	SendMessage {
		text: String,
		channel_id: ChannelId,
	},
	/// Remove a message from a channel.
	DeleteMessage {
		message_id: MessageId,
		channel_id: ChannelId,
	},
}

impl Command {
	/// The wire action literal.
	pub fn action(&self) -> &'static str {
		match self {
			Self::MuteUser { .. } => "mute_user",
			Self::BlockUser { .. } => "block_user",
			Self::UnmuteUser { .. } => "unmute_user",
			Self::SendWhisper { .. } => "send_whisper",
			Self::SendMessage { .. } => "send_message",
			Self::DeleteMessage { .. } => "delete_message",
		}
	}

	/// Encode into the outbound envelope, escaping free text.
	pub fn encode(&self) -> String {
		let action = self.action();
		match self {
			Self::MuteUser { message_id, channel_id }
			| Self::BlockUser { message_id, channel_id }
			| Self::DeleteMessage { message_id, channel_id } => envelope(&format!(
				r#"\"action\":\"{action}\",\"messageId\":\"{message_id}\",\"channelId\":\"{channel_id}\""#
			)),
			Self::UnmuteUser { username, channel_id } => envelope(&format!(
				r#"\"action\":\"{action}\",\"username\":\"{username}\",\"channelId\":\"{channel_id}\""#
			)),
			Self::SendWhisper {
				username,
				text,
				channel_id,
			} => {
				let text = escape_text(text);
				envelope(&format!(
					r#"\"action\":\"{action}\",\"username\":\"{username}\",\"text\":\"{text}\",\"channelId\":\"{channel_id}\""#
				))
			}
			Self::SendMessage { text, channel_id } => {
				let text = escape_text(text);
				envelope(&format!(
					r#"\"action\":\"{action}\",\"text\":\"{text}\",\"channelId\":\"{channel_id}\""#
				))
			}
		}
	}
}

/// Wrap already-escaped action fields in the fixed command envelope.
fn envelope(fields: &str) -> String {
	format!(r#"{{"command":"message","identifier":"{{\"channel\":\"GatewayChannel\"}}","data":"{{{fields}}}"}}"#)
}

/// Escape free text for embedding two JSON string levels deep.
///
/// Each `"` and `\` gains a three character `\\\` run in front of it; each
/// newline becomes the three character run `\\n`. The result survives exactly
/// two JSON string unwraps and decodes back to the original text.
pub fn escape_text(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'"' | '\\' => {
				out.push_str(r"\\\");
				out.push(c);
			}
			'\n' => out.push_str(r"\\n"),
			_ => out.push(c),
		}
	}
	out
}
