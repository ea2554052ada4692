#![forbid(unsafe_code)]

use core::fmt;

use thiserror::Error;

use crate::tag;

/// Field separator of the tilde protocol.
pub const DELIMITER: char = '~';

/// `SERVER~<cmd>` payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotice {
	LoginOk,
	LoginFail,
	RegisterOk,
	RegisterFail,
	Other(String),
}

impl ServerNotice {
	pub fn parse(cmd: &str) -> Self {
		match cmd {
			"LOGIN_OK" => ServerNotice::LoginOk,
			"LOGIN_FAIL" => ServerNotice::LoginFail,
			"REGISTER_OK" => ServerNotice::RegisterOk,
			"REGISTER_FAIL" => ServerNotice::RegisterFail,
			other => ServerNotice::Other(other.to_string()),
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			ServerNotice::LoginOk => "LOGIN_OK",
			ServerNotice::LoginFail => "LOGIN_FAIL",
			ServerNotice::RegisterOk => "REGISTER_OK",
			ServerNotice::RegisterFail => "REGISTER_FAIL",
			ServerNotice::Other(cmd) => cmd,
		}
	}
}

impl fmt::Display for ServerNotice {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
	Notice(ServerNotice),
	FriendsList {
		names: Vec<String>,
	},
	RequestsList {
		names: Vec<String>,
	},
	DirectMessage {
		sender: String,
		text: String,
	},
	/// `payload` is the base64 text as received; it is never decoded here.
	DirectImage {
		sender: String,
		payload: String,
	},
	HistoryEntry {
		sender: String,
		content: String,
		timestamp: String,
	},
	Unrecognized {
		raw: String,
	},
}

impl ServerMessage {
	/// Decode a frame, folding every [`DecodeError`] into `Unrecognized`.
	pub fn decode(line: &str) -> Self {
		try_decode(line).unwrap_or_else(|_| ServerMessage::Unrecognized { raw: line.to_string() })
	}

	/// Short label for logs.
	pub fn kind(&self) -> &'static str {
		match self {
			ServerMessage::Notice(_) => "server_notice",
			ServerMessage::FriendsList { .. } => "friends_list",
			ServerMessage::RequestsList { .. } => "requests_list",
			ServerMessage::DirectMessage { .. } => "direct_message",
			ServerMessage::DirectImage { .. } => "direct_image",
			ServerMessage::HistoryEntry { .. } => "history_entry",
			ServerMessage::Unrecognized { .. } => "unrecognized",
		}
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	/// Tag is not part of the inbound grammar.
	#[error("unrecognized frame tag: {tag:?}")]
	UnknownTag { tag: String },

	/// Tag matched but the frame has too few fields.
	#[error("malformed {tag} frame: expected {expected} fields, found {found}")]
	Malformed {
		tag: &'static str,
		expected: usize,
		found: usize,
	},
}

/// Decode one frame (terminator already stripped).
///
/// Each tag has a fixed split count; delimiters past the last field stay
/// in that field, so `DM~a~x~y` carries text `x~y`.
pub fn try_decode(line: &str) -> Result<ServerMessage, DecodeError> {
	let Some((head, _)) = line.split_once(DELIMITER) else {
		return Err(DecodeError::UnknownTag { tag: line.to_string() });
	};

	match head {
		tag::SERVER => {
			let f = fields(line, tag::SERVER, 2)?;
			Ok(ServerMessage::Notice(ServerNotice::parse(f[1])))
		}
		tag::FRIENDS => {
			let f = fields(line, tag::FRIENDS, 2)?;
			Ok(ServerMessage::FriendsList { names: split_csv(f[1]) })
		}
		tag::REQUESTS => {
			let f = fields(line, tag::REQUESTS, 2)?;
			Ok(ServerMessage::RequestsList { names: split_csv(f[1]) })
		}
		tag::DM => {
			let f = fields(line, tag::DM, 3)?;
			Ok(ServerMessage::DirectMessage {
				sender: f[1].to_string(),
				text: f[2].to_string(),
			})
		}
		tag::IMAGE => {
			let f = fields(line, tag::IMAGE, 3)?;
			Ok(ServerMessage::DirectImage {
				sender: f[1].to_string(),
				payload: f[2].to_string(),
			})
		}
		tag::HISTORY_DM => {
			let f = fields(line, tag::HISTORY_DM, 4)?;
			Ok(ServerMessage::HistoryEntry {
				sender: f[1].to_string(),
				content: f[2].to_string(),
				timestamp: f[3].to_string(),
			})
		}
		other => Err(DecodeError::UnknownTag { tag: other.to_string() }),
	}
}

fn fields<'a>(line: &'a str, tag: &'static str, count: usize) -> Result<Vec<&'a str>, DecodeError> {
	let parts: Vec<&'a str> = line.splitn(count, DELIMITER).collect();
	if parts.len() < count {
		return Err(DecodeError::Malformed {
			tag,
			expected: count,
			found: parts.len(),
		});
	}
	Ok(parts)
}

// No escaping: a comma inside a username cannot be represented.
fn split_csv(s: &str) -> Vec<String> {
	s.split(',')
		.filter(|name| !name.trim().is_empty())
		.map(str::to_string)
		.collect()
}
