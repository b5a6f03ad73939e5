#![forbid(unsafe_code)]

//! Category-specific field extraction.
//!
//! [`extract`] turns a classified payload into a [`GatewayMessage`] and never
//! fails: any decode fault for a known category downgrades the message to
//! [`Event::Unknown`] with the local receipt time, so one malformed payload
//! can never take down a receive loop.
//!
//! Stream events decode in two independent stages. The outer body is ordinary
//! JSON; its `metadata` field is a second JSON document encoded inside a
//! string. A malformed outer body yields `Unknown`, while a malformed
//! metadata blob keeps the stream event and merely leaves the projected
//! fields absent, so the two failure modes stay distinguishable.

use chrono::{DateTime, TimeZone, Utc};
use joystick_domain::{
	ChatEvent, Emote, Event, GatewayMessage, PresenceDirection, PresenceEvent, StreamEvent, StreamEventKind,
	UnknownStreamEvent,
};
use serde::Deserialize;

use crate::classify::{Category, classify};
use crate::envelope::strip_envelope;

#[derive(Debug, Deserialize)]
struct PingBody {
	#[serde(default)]
	message: Option<i64>,
}

/// Outer event body, shared by every enveloped category. All fields optional;
/// each category enforces its own requirements after decoding.
#[derive(Debug, Deserialize)]
struct EventBody {
	#[serde(default, rename = "messageId")]
	message_id: Option<String>,
	#[serde(default)]
	id: Option<String>,
	#[serde(default, rename = "type")]
	subtype: Option<String>,
	#[serde(default)]
	text: Option<String>,
	#[serde(default)]
	metadata: Option<String>,
	#[serde(default, rename = "createdAt")]
	created_at: Option<String>,
	#[serde(default, rename = "channelId")]
	channel_id: Option<String>,
	#[serde(default)]
	author: Option<AuthorBlock>,
	#[serde(default)]
	streamer: Option<StreamerBlock>,
	#[serde(default, rename = "emotesUsed")]
	emotes_used: Option<Vec<EmoteEntry>>,
}

#[derive(Debug, Deserialize)]
struct AuthorBlock {
	#[serde(default)]
	username: Option<String>,
	#[serde(default, rename = "isStreamer")]
	is_streamer: Option<bool>,
	#[serde(default, rename = "isModerator")]
	is_moderator: Option<bool>,
	#[serde(default, rename = "isSubscriber")]
	is_subscriber: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StreamerBlock {
	#[serde(default)]
	username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmoteEntry {
	#[serde(default)]
	code: Option<String>,
	#[serde(default, rename = "signedUrl")]
	signed_url: Option<String>,
}

/// Stream event metadata, the inner document of the double decode.
#[derive(Debug, Deserialize)]
struct StreamEventMetadata {
	#[serde(default)]
	who: Option<String>,
	#[serde(default)]
	destination_username: Option<String>,
	#[serde(default)]
	how_much: Option<i64>,
	#[serde(default)]
	prize: Option<String>,
	#[serde(default)]
	tip_menu_item: Option<String>,
	#[serde(default)]
	number_of_viewers: Option<i64>,
	#[serde(default)]
	number_of_followers: Option<i64>,
	#[serde(default)]
	number_of_subscribers: Option<i64>,
	#[serde(default)]
	title: Option<String>,
	#[serde(default)]
	name: Option<String>,
	#[serde(default, rename = "endsAt")]
	ends_at: Option<String>,
}

/// Classify, strip and extract a raw payload in one step.
pub fn decode_message(raw: &str, received_at: DateTime<Utc>) -> GatewayMessage {
	let category = classify(raw);
	extract(category, strip_envelope(raw), raw, received_at)
}

/// Decode the category-specific shape of a stripped body into a
/// [`GatewayMessage`]. Never fails; see the module docs for the fallback
/// rules.
pub fn extract(category: Category, body: &str, raw: &str, received_at: DateTime<Utc>) -> GatewayMessage {
	let decoded = match category {
		Category::Ping => extract_ping(body),
		Category::Bot => extract_bot(body, received_at),
		Category::Chat => extract_chat(body, received_at),
		Category::UserEnter => extract_presence(body, PresenceDirection::Enter),
		Category::UserLeave => extract_presence(body, PresenceDirection::Leave),
		Category::Stream(kind) => extract_stream(body, kind, received_at),
		Category::UnknownStream => extract_unknown_stream(body, received_at),
		Category::Unknown => None,
	};

	let (time, event) = decoded.unwrap_or((received_at, Event::Unknown));
	GatewayMessage {
		raw: raw.to_string(),
		time,
		event,
	}
}

fn extract_ping(body: &str) -> Option<(DateTime<Utc>, Event)> {
	let ping: PingBody = serde_json::from_str(body).ok()?;
	let time = Utc.timestamp_opt(ping.message?, 0).single()?;
	Some((time, Event::Ping))
}

fn extract_bot(body: &str, received_at: DateTime<Utc>) -> Option<(DateTime<Utc>, Event)> {
	let body: EventBody = serde_json::from_str(body).ok()?;
	let time = event_time(&body, received_at)?;
	Some((
		time,
		Event::Bot {
			text: body.text.unwrap_or_default(),
		},
	))
}

fn extract_chat(body: &str, received_at: DateTime<Utc>) -> Option<(DateTime<Utc>, Event)> {
	let body: EventBody = serde_json::from_str(body).ok()?;
	let time = event_time(&body, received_at)?;

	let message_id = message_id(&body);

	let author = body.author?;
	let streamer = body.streamer?;

	let emotes = body
		.emotes_used
		.unwrap_or_default()
		.into_iter()
		.map(|e| Emote {
			code: e.code.unwrap_or_default(),
			url: e.signed_url.unwrap_or_default(),
		})
		.collect();

	Some((
		time,
		Event::Chat(ChatEvent {
			author: author.username.unwrap_or_default(),
			streamer: streamer.username.unwrap_or_default(),
			is_streamer: author.is_streamer.unwrap_or(false),
			is_moderator: author.is_moderator.unwrap_or(false),
			is_subscriber: author.is_subscriber.unwrap_or(false),
			text: body.text.unwrap_or_default(),
			channel_id: body.channel_id,
			message_id,
			emotes,
		}),
	))
}

fn extract_presence(body: &str, direction: PresenceDirection) -> Option<(DateTime<Utc>, Event)> {
	let body: EventBody = serde_json::from_str(body).ok()?;

	// Presence is the one category whose created time is required.
	let time = parse_rfc3339(body.created_at.as_deref()?)?;

	// The wire reuses the chat `text` field for the acting username here.
	let username = body.text.clone().unwrap_or_default();

	Some((
		time,
		Event::Presence(PresenceEvent {
			direction,
			username,
			channel_id: body.channel_id.clone(),
			message_id: message_id(&body),
		}),
	))
}

fn extract_stream(body: &str, kind: StreamEventKind, received_at: DateTime<Utc>) -> Option<(DateTime<Utc>, Event)> {
	let body: EventBody = serde_json::from_str(body).ok()?;
	let time = event_time(&body, received_at)?;

	let mut event = StreamEvent {
		kind,
		subtype: body.subtype.clone().unwrap_or_else(|| kind.as_wire().to_string()),
		metadata: body.metadata.clone(),
		channel_id: body.channel_id.clone(),
		message_id: message_id(&body),
		text: body.text.clone().unwrap_or_default(),
		user: None,
		amount: None,
		count: None,
		prize: None,
		timer_name: None,
		timer_ends_at: None,
	};

	// Second decode stage: the metadata blob. Failure here keeps the event
	// with its projections absent rather than downgrading to Unknown.
	if let Some(blob) = body.metadata.as_deref()
		&& let Ok(meta) = serde_json::from_str::<StreamEventMetadata>(blob)
	{
		project_metadata(kind, meta, &mut event);
	}

	Some((time, Event::Stream(event)))
}

fn extract_unknown_stream(body: &str, received_at: DateTime<Utc>) -> Option<(DateTime<Utc>, Event)> {
	let body: EventBody = serde_json::from_str(body).ok()?;
	let time = event_time(&body, received_at)?;

	// No metadata double-decode for unrecognized subtypes: keep the blob
	// verbatim so callers can inspect shapes we do not model yet.
	Some((
		time,
		Event::UnknownStream(UnknownStreamEvent {
			subtype: body.subtype.clone().unwrap_or_default(),
			metadata: body.metadata.clone(),
			channel_id: body.channel_id.clone(),
			message_id: message_id(&body),
		}),
	))
}

/// Project metadata fields selectively by subtype. Fields outside the active
/// subtype's rows stay absent even when present in the blob, so unrelated
/// subtypes sharing a metadata shape cannot leak fields into each other.
fn project_metadata(kind: StreamEventKind, meta: StreamEventMetadata, event: &mut StreamEvent) {
	use StreamEventKind as K;

	if names_a_user(kind) {
		event.user = meta.destination_username.or(meta.who);
	}

	if matches!(kind, K::Tip | K::WheelSpin) {
		event.amount = meta.how_much;
	}

	if matches!(kind, K::ViewerCountUpdate | K::FollowerCountUpdate | K::SubCountUpdate) {
		event.count = meta
			.number_of_viewers
			.or(meta.number_of_followers)
			.or(meta.number_of_subscribers);
	}

	event.prize = match kind {
		K::TipMenuItemLocked | K::TipMenuItemUnlocked | K::TipGoalMet | K::TipGoalUpdated | K::TipGoalIncreased => {
			meta.title
		}
		K::Tip => meta.tip_menu_item,
		K::WheelSpin => meta.prize,
		_ => None,
	};

	if kind == K::TimerStarted {
		event.timer_name = meta.name;
		event.timer_ends_at = meta.ends_at.as_deref().and_then(parse_rfc3339);
	}
}

/// Subtypes whose metadata names an acting or destination user.
fn names_a_user(kind: StreamEventKind) -> bool {
	use StreamEventKind as K;
	matches!(
		kind,
		K::Tip
			| K::WheelSpin
			| K::Follow
			| K::Subscription
			| K::Resubscription
			| K::GiftedSubs
			| K::DropIn
			| K::OutgoingDropIn
			| K::UserMuted
			| K::UserUnmuted
			| K::MilestoneCompleted
	)
}

fn message_id(body: &EventBody) -> Option<String> {
	body.message_id.clone().or_else(|| body.id.clone())
}

/// Event time: `createdAt` when present and well formed, receipt time when
/// absent. A present but malformed timestamp is a decode failure.
fn event_time(body: &EventBody, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
	match body.created_at.as_deref() {
		Some(ts) => parse_rfc3339(ts),
		None => Some(received_at),
	}
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
	chrono::DateTime::parse_from_rfc3339(ts).ok().map(|dt| dt.with_timezone(&Utc))
}
