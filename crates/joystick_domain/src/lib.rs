#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid channel id: {0}")]
	InvalidChannelId(String),
	#[error("invalid message id: {0}")]
	InvalidMessageId(String),
}

/// Channel identifier as issued by the gateway: exactly 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
	/// Create a validated `ChannelId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if id.len() != 64 || !id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
			return Err(ParseIdError::InvalidChannelId(id));
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for ChannelId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ChannelId::new(s.to_string())
	}
}

/// Message identifier as issued by the gateway: 36 characters of lowercase hex
/// with literal `-` at positions 8, 13, 18 and 23.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
	const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

	/// Create a validated `MessageId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if id.len() != 36 {
			return Err(ParseIdError::InvalidMessageId(id));
		}
		for (i, b) in id.bytes().enumerate() {
			let ok = if Self::DASH_POSITIONS.contains(&i) {
				b == b'-'
			} else {
				b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
			};
			if !ok {
				return Err(ParseIdError::InvalidMessageId(id));
			}
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for MessageId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		MessageId::new(s.to_string())
	}
}

/// One message received from the gateway, classified and decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayMessage {
	/// The payload exactly as the socket delivered it.
	pub raw: String,

	/// Server event time when the payload carries one; local receipt time otherwise.
	pub time: DateTime<Utc>,

	pub event: Event,
}

/// Decoded event payload, one variant per message category.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
	/// Keepalive carrying only a server timestamp (surfaced as `GatewayMessage::time`).
	Ping,

	/// Message posted by the channel bot.
	Bot {
		text: String,
	},

	Chat(ChatEvent),

	Presence(PresenceEvent),

	Stream(StreamEvent),

	/// Stream event whose subtype is not in the known set.
	UnknownStream(UnknownStreamEvent),

	/// Category could not be determined (handshake acks, malformed payloads).
	Unknown,
}

/// A chat message posted in a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
	pub author: String,
	pub streamer: String,

	pub is_streamer: bool,
	pub is_moderator: bool,
	pub is_subscriber: bool,

	pub text: String,
	pub channel_id: Option<String>,
	pub message_id: Option<String>,

	/// Emotes used in the message, in receipt order. Empty when none.
	pub emotes: Vec<Emote>,
}

/// A single emote reference: chat code plus its signed image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emote {
	pub code: String,
	pub url: String,
}

/// A viewer entering or leaving a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
	pub direction: PresenceDirection,
	pub username: String,
	pub channel_id: Option<String>,
	pub message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceDirection {
	Enter,
	Leave,
}

/// A stream event with a recognized subtype.
///
/// `subtype` and `metadata` are kept verbatim for forward compatibility; the
/// remaining optional fields are projected from the metadata blob only where
/// the subtype defines them.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
	pub kind: StreamEventKind,

	/// Subtype string exactly as received.
	pub subtype: String,

	/// Metadata blob exactly as received (itself a JSON document in a string).
	pub metadata: Option<String>,

	pub channel_id: Option<String>,
	pub message_id: Option<String>,
	pub text: String,

	/// Acting or destination username, for subtypes that name one.
	pub user: Option<String>,

	/// Token amount, for tips and wheel spins.
	pub amount: Option<i64>,

	/// Viewer/follower/subscriber count, for count-update subtypes.
	pub count: Option<i64>,

	/// Tip menu item, wheel prize or tip goal title, depending on subtype.
	pub prize: Option<String>,

	pub timer_name: Option<String>,
	pub timer_ends_at: Option<DateTime<Utc>>,
}

/// Stream event whose subtype was not recognized; only the outer envelope is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStreamEvent {
	pub subtype: String,
	pub metadata: Option<String>,
	pub channel_id: Option<String>,
	pub message_id: Option<String>,
}

/// Known stream event subtypes.
///
/// New subtypes added by the service fail safe into `Event::UnknownStream`
/// rather than forcing every consumer match to be exhaustive by wire literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
	StreamStarted,
	StreamEnded,
	Tip,
	WheelSpin,
	Follow,
	FollowerCountUpdate,
	Subscription,
	Resubscription,
	GiftedSubs,
	SubCountUpdate,
	DropIn,
	OutgoingDropIn,
	TipGoalMet,
	TipGoalUpdated,
	TipGoalIncreased,
	StreamModeUpdated,
	ViewerCountUpdate,
	TimerStarted,
	TipMenuItemLocked,
	TipMenuItemUnlocked,
	SettingsUpdated,
	DeviceConnected,
	DeviceDisconnected,
	DeviceSettingsUpdated,
	VerifiedOnlyStarted,
	VerifiedOnlyEnded,
	MilestoneCompleted,
	UserMuted,
	UserUnmuted,
	PvpRequested,
	PvpReady,
	PvpStarted,
	PvpEnded,
}

impl StreamEventKind {
	/// All known kinds, in classification order.
	pub const ALL: [StreamEventKind; 33] = [
		Self::StreamStarted,
		Self::StreamEnded,
		Self::Tip,
		Self::WheelSpin,
		Self::Follow,
		Self::FollowerCountUpdate,
		Self::Subscription,
		Self::Resubscription,
		Self::GiftedSubs,
		Self::SubCountUpdate,
		Self::DropIn,
		Self::OutgoingDropIn,
		Self::TipGoalMet,
		Self::TipGoalUpdated,
		Self::TipGoalIncreased,
		Self::StreamModeUpdated,
		Self::ViewerCountUpdate,
		Self::TimerStarted,
		Self::TipMenuItemLocked,
		Self::TipMenuItemUnlocked,
		Self::SettingsUpdated,
		Self::DeviceConnected,
		Self::DeviceDisconnected,
		Self::DeviceSettingsUpdated,
		Self::VerifiedOnlyStarted,
		Self::VerifiedOnlyEnded,
		Self::MilestoneCompleted,
		Self::UserMuted,
		Self::UserUnmuted,
		Self::PvpRequested,
		Self::PvpReady,
		Self::PvpStarted,
		Self::PvpEnded,
	];

	/// The subtype literal the service sends for this kind.
	pub const fn as_wire(self) -> &'static str {
		match self {
			Self::StreamStarted => "Started",
			Self::StreamEnded => "Ended",
			Self::Tip => "Tipped",
			Self::WheelSpin => "WheelSpinClaimed",
			Self::Follow => "Followed",
			Self::FollowerCountUpdate => "FollowerCountUpdated",
			Self::Subscription => "Subscribed",
			Self::Resubscription => "Resubscribed",
			Self::GiftedSubs => "GiftedSubscriptions",
			Self::SubCountUpdate => "SubscriberCountUpdated",
			Self::DropIn => "StreamDroppedIn",
			Self::OutgoingDropIn => "DropinStream",
			Self::TipGoalMet => "TipGoalMet",
			Self::TipGoalUpdated => "TipGoalUpdated",
			Self::TipGoalIncreased => "TipGoalIncreased",
			Self::StreamModeUpdated => "StreamModeUpdated",
			Self::ViewerCountUpdate => "ViewerCountUpdated",
			Self::TimerStarted => "ChatTimerStarted",
			Self::TipMenuItemLocked => "TipMenuItemLocked",
			Self::TipMenuItemUnlocked => "TipMenuItemUnlocked",
			Self::SettingsUpdated => "SettingsUpdated",
			Self::DeviceConnected => "DeviceConnected",
			Self::DeviceDisconnected => "DeviceDisconnected",
			Self::DeviceSettingsUpdated => "DeviceSettingsUpdated",
			Self::VerifiedOnlyStarted => "VerifiedOnlyChatStarted",
			Self::VerifiedOnlyEnded => "VerifiedOnlyChatEnded",
			Self::MilestoneCompleted => "MilestoneCompleted",
			Self::UserMuted => "UserMuted",
			Self::UserUnmuted => "UserUnmuted",
			Self::PvpRequested => "PvpSessionRequested",
			Self::PvpReady => "PvpSessionReady",
			Self::PvpStarted => "PvpSessionStarted",
			Self::PvpEnded => "PvpSessionEnded",
		}
	}

	/// Map a subtype literal back to a kind; `None` for anything unrecognized.
	pub fn from_wire(subtype: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.as_wire() == subtype)
	}
}

impl fmt::Display for StreamEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_wire())
	}
}
