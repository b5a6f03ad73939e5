#![forbid(unsafe_code)]

//! Wire layer for the joystick.tv gateway: envelope stripping, textual
//! classification, category-specific extraction and outbound command
//! encoding.

pub mod classify;
pub mod command;
pub mod envelope;
pub mod extract;

pub use classify::{Category, classify};
pub use command::{Command, SUBSCRIBE_COMMAND, SUBSCRIBE_CONFIRMATION, escape_text};
pub use envelope::{ENVELOPE_MIN_LEN, ENVELOPE_PREFIX, ENVELOPE_PREFIX_LEN, ENVELOPE_SUFFIX_LEN, strip_envelope};
pub use extract::{decode_message, extract};
