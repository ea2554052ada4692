#![forbid(unsafe_code)]

pub mod command;
pub mod framing;
pub mod message;

pub use command::ClientCommand;
pub use framing::{
	DEFAULT_MAX_LINE_BYTES, FRAME_TERMINATOR, FramingError, LineReader, encode_line, encode_line_into,
	try_decode_line_from_buffer,
};
pub use message::{DELIMITER, DecodeError, ServerMessage, ServerNotice, try_decode};

/// Frame tags of the tilde protocol.
pub mod tag {
	/// Inbound: `SERVER~<cmd>`.
	pub const SERVER: &str = "SERVER";
	/// Inbound: `FRIENDS~<csv>`.
	pub const FRIENDS: &str = "FRIENDS";
	/// Inbound: `REQUESTS~<csv>`.
	pub const REQUESTS: &str = "REQUESTS";
	/// Both directions: `DM~<user>~<text>`.
	pub const DM: &str = "DM";
	/// Both directions: `IMAGE~<user>~<base64>`.
	pub const IMAGE: &str = "IMAGE";
	/// Inbound: `HISTORY_DM~<sender>~<content>~<timestamp>`.
	pub const HISTORY_DM: &str = "HISTORY_DM";

	pub const LOGIN: &str = "LOGIN";
	pub const REGISTER: &str = "REGISTER";
	pub const PING: &str = "PING";
	pub const ADD_FRIENDS: &str = "ADD_FRIENDS";
	pub const ACCEPT_FRIEND: &str = "ACCEPT_FRIEND";
	pub const GET_HISTORY_DM: &str = "GET_HISTORY_DM";
}
