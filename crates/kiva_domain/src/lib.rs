#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown view: {0}")]
	UnknownView(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Account name as typed by the user or pushed by the server.
///
/// Stored trimmed; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
	/// Create a non-empty `Username` (surrounding whitespace removed).
	pub fn new(name: impl Into<String>) -> Result<Self, ParseIdError> {
		let name = name.into();
		let trimmed = name.trim();
		if trimmed.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if trimmed.contains(['\n', '\r']) {
			return Err(ParseIdError::InvalidFormat("username must be a single line".into()));
		}
		if trimmed.len() == name.len() {
			Ok(Self(name))
		} else {
			Ok(Self(trimmed.to_string()))
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for Username {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for Username {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Username::new(s.to_string())
	}
}

impl AsRef<str> for Username {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl PartialEq<str> for Username {
	fn eq(&self, other: &str) -> bool {
		self.0 == other
	}
}

impl PartialEq<&str> for Username {
	fn eq(&self, other: &&str) -> bool {
		self.0 == *other
	}
}

/// Screens the presentation layer can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum View {
	#[default]
	Login,
	Friends,
	Conversation,
}

impl View {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			View::Login => "login",
			View::Friends => "friends",
			View::Conversation => "chat",
		}
	}
}

impl fmt::Display for View {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for View {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"login" => Ok(View::Login),
			"friends" => Ok(View::Friends),
			"chat" | "conversation" => Ok(View::Conversation),
			other => Err(ParseIdError::UnknownView(other.to_string())),
		}
	}
}
