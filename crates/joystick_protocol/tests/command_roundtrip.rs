use joystick_domain::{ChannelId, MessageId};
use joystick_protocol::{Command, escape_text};
use proptest::prelude::*;

fn channel() -> ChannelId {
	ChannelId::new("0123456789abcdef".repeat(4)).expect("valid channel id")
}

fn message() -> MessageId {
	MessageId::new("01234567-89ab-cdef-0123-456789abcdef").expect("valid message id")
}

/// Unwrap an encoded command through both JSON string levels and return the
/// inner action document.
fn unwrap_twice(encoded: &str) -> serde_json::Value {
	let outer: serde_json::Value = serde_json::from_str(encoded).expect("outer envelope parses");
	assert_eq!(outer["command"], "message");

	let identifier: serde_json::Value =
		serde_json::from_str(outer["identifier"].as_str().expect("identifier is a string")).expect("identifier parses");
	assert_eq!(identifier["channel"], "GatewayChannel");

	serde_json::from_str(outer["data"].as_str().expect("data is a string")).expect("data parses")
}

#[test]
fn moderation_commands_carry_ids() {
	for (cmd, action) in [
		(
			Command::MuteUser {
				message_id: message(),
				channel_id: channel(),
			},
			"mute_user",
		),
		(
			Command::BlockUser {
				message_id: message(),
				channel_id: channel(),
			},
			"block_user",
		),
		(
			Command::DeleteMessage {
				message_id: message(),
				channel_id: channel(),
			},
			"delete_message",
		),
	] {
		let inner = unwrap_twice(&cmd.encode());
		assert_eq!(inner["action"], action);
		assert_eq!(inner["messageId"], message().as_str());
		assert_eq!(inner["channelId"], channel().as_str());
	}
}

#[test]
fn unmute_carries_username() {
	let inner = unwrap_twice(
		&Command::UnmuteUser {
			username: "alice".to_string(),
			channel_id: channel(),
		}
		.encode(),
	);
	assert_eq!(inner["action"], "unmute_user");
	assert_eq!(inner["username"], "alice");
	assert_eq!(inner["channelId"], channel().as_str());
}

#[test]
fn whisper_carries_username_and_text() {
	let inner = unwrap_twice(
		&Command::SendWhisper {
			username: "alice".to_string(),
			text: "psst: \"secret\"".to_string(),
			channel_id: channel(),
		}
		.encode(),
	);
	assert_eq!(inner["action"], "send_whisper");
	assert_eq!(inner["username"], "alice");
	assert_eq!(inner["text"], "psst: \"secret\"");
}

#[test]
fn message_text_survives_quotes_backslashes_and_newlines() {
	let text = "line one\nhe said \"hi\" and typed C:\\tmp";
	let inner = unwrap_twice(
		&Command::SendMessage {
			text: text.to_string(),
			channel_id: channel(),
		}
		.encode(),
	);
	assert_eq!(inner["action"], "send_message");
	assert_eq!(inner["text"], text);
}

proptest! {
	/// Any free text built from the escaped characters and plain filler must
	/// survive the two JSON unwraps byte for byte.
	#[test]
	fn escaped_text_round_trips(text in r#"[a-zA-Z0-9 "\\\n:,{}\[\]]{0,64}"#) {
		let encoded = Command::SendMessage {
			text: text.clone(),
			channel_id: channel(),
		}
		.encode();
		let inner = unwrap_twice(&encoded);
		prop_assert_eq!(inner["text"].as_str(), Some(text.as_str()));
	}

	/// No escaped output can close the enclosing JSON string prematurely.
	#[test]
	fn escaped_quotes_never_close_the_data_string(text in r#"[ -~\n]{0,64}"#) {
		let once = escape_text(&text);
		// Every quote in the escaped output is preceded by a backslash run of
		// length 4k+3 (three for the quote itself, four per escaped backslash
		// before it), so a lone `"` can never terminate the data string early.
		let bytes = once.as_bytes();
		for (i, b) in bytes.iter().enumerate() {
			if *b == b'"' {
				let run = bytes[..i].iter().rev().take_while(|b| **b == b'\\').count();
				prop_assert_eq!(run % 4, 3);
			}
		}
	}
}
