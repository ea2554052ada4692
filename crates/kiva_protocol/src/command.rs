#![forbid(unsafe_code)]

use core::fmt;

use crate::message::DELIMITER;
use crate::tag;

/// Outbound command, formatted as one protocol line (no terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
	Login { username: String, password: String },
	Register { username: String, password: String },
	Ping,
	AddFriend { username: String },
	AcceptFriend { username: String },
	DirectMessage { peer: String, text: String },
	Image { peer: String, payload: String },
	GetHistory { peer: String, limit: u32 },
}

impl ClientCommand {
	pub fn tag(&self) -> &'static str {
		match self {
			ClientCommand::Login { .. } => tag::LOGIN,
			ClientCommand::Register { .. } => tag::REGISTER,
			ClientCommand::Ping => tag::PING,
			ClientCommand::AddFriend { .. } => tag::ADD_FRIENDS,
			ClientCommand::AcceptFriend { .. } => tag::ACCEPT_FRIEND,
			ClientCommand::DirectMessage { .. } => tag::DM,
			ClientCommand::Image { .. } => tag::IMAGE,
			ClientCommand::GetHistory { .. } => tag::GET_HISTORY_DM,
		}
	}

	pub fn encode(&self) -> String {
		self.to_string()
	}
}

impl fmt::Display for ClientCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let d = DELIMITER;
		let t = self.tag();
		match self {
			ClientCommand::Login { username, password } | ClientCommand::Register { username, password } => {
				write!(f, "{t}{d}{username}{d}{password}")
			}
			ClientCommand::Ping => f.write_str(t),
			ClientCommand::AddFriend { username } | ClientCommand::AcceptFriend { username } => {
				write!(f, "{t}{d}{username}")
			}
			ClientCommand::DirectMessage { peer, text } => write!(f, "{t}{d}{peer}{d}{text}"),
			ClientCommand::Image { peer, payload } => write!(f, "{t}{d}{peer}{d}{payload}"),
			ClientCommand::GetHistory { peer, limit } => write!(f, "{t}{d}{peer}{d}{limit}"),
		}
	}
}
