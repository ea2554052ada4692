#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod session;
pub mod ui;

pub use client::Client;
pub use config::{ClientConfig, LoginPolicy, load_client_config, load_client_config_from_path};
pub use connection::{ConnectionManager, InboundEvent};
pub use dispatcher::Dispatcher;
pub use session::{LoginAttempt, LoginAttemptId, SessionHandle, SessionPhase, SessionState};
pub use ui::{HeadlessUi, SessionUi, UiEffect};

pub use kiva_domain::View;
pub use kiva_protocol::{ClientCommand, ServerMessage, ServerNotice};

/// Errors for client core operations. None of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	/// Connect timed out or was refused.
	#[error("failed to connect: {0}")]
	Connect(String),

	/// A send was attempted and the implicit reconnect failed.
	#[error("not connected: {0}")]
	NotConnected(String),

	/// Outbound conversation action without an open conversation.
	#[error("no conversation is open")]
	NoActivePeer,

	/// A login is still pending and the policy refuses a second one.
	#[error("login already in flight for {username}")]
	LoginInFlight { username: String },

	/// Rejected before anything was sent.
	#[error("invalid input: {0}")]
	InvalidInput(String),

	/// IO error on an established connection.
	#[error("io error: {0}")]
	Io(String),
}
