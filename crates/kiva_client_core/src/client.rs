#![forbid(unsafe_code)]

use kiva_domain::{Username, View};
use kiva_protocol::ClientCommand;
use kiva_util::endpoint::TcpEndpoint;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, InboundEvent};
use crate::dispatcher::Dispatcher;
use crate::session::{LoginAttemptId, SessionHandle};
use crate::ui::SessionUi;

pub const GUEST_IDENTITY: &str = "Guest";

/// One client session: connection, session state, inbound queue and UI.
///
/// Outbound actions are methods on this type. Inbound events are applied
/// only by [`Client::next_inbound`] / [`Client::drain_inbound`], so every
/// UI call happens on the task that owns the client.
#[derive(Debug)]
pub struct Client<U: SessionUi> {
	config: ClientConfig,
	connection: ConnectionManager,
	session: SessionHandle,
	dispatcher: Dispatcher,
	inbound_rx: mpsc::Receiver<InboundEvent>,
	ui: U,
}

impl<U: SessionUi> Client<U> {
	pub fn new(config: ClientConfig, ui: U) -> Self {
		let (connection, inbound_rx) = ConnectionManager::with_channel(&config);
		let session = SessionHandle::new(config.login_policy);
		let dispatcher = Dispatcher::new(session.clone());
		Self {
			config,
			connection,
			session,
			dispatcher,
			inbound_rx,
			ui,
		}
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	pub fn session(&self) -> &SessionHandle {
		&self.session
	}

	pub fn connection(&self) -> &ConnectionManager {
		&self.connection
	}

	pub fn ui(&self) -> &U {
		&self.ui
	}

	pub fn ui_mut(&mut self) -> &mut U {
		&mut self.ui
	}

	pub fn into_ui(self) -> U {
		self.ui
	}

	pub async fn is_connected(&self) -> bool {
		self.connection.is_connected().await
	}

	/// Connect to the configured (or last used) endpoint.
	pub async fn connect(&mut self) -> Result<(), ClientError> {
		let res = self.connection.connect().await;
		self.report_connect(res)
	}

	pub async fn connect_to(&mut self, endpoint: TcpEndpoint) -> Result<(), ClientError> {
		let res = self.connection.connect_to(endpoint).await;
		self.report_connect(res)
	}

	fn report_connect(&mut self, res: Result<(), ClientError>) -> Result<(), ClientError> {
		if let Err(e) = &res {
			warn!(error = %e, "connect failed");
			self.ui.show_notice("Unable to connect to server");
		}
		res
	}

	/// Send `LOGIN`. The result arrives later as `SERVER~LOGIN_OK|LOGIN_FAIL`.
	pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginAttemptId, ClientError> {
		let (username, password) = self.credentials(username, password)?;
		self.connect().await?;

		let attempt = match self.session.begin_login_attempt(username) {
			Ok(attempt) => attempt,
			Err(e) => {
				self.ui.show_notice("Login already in progress");
				return Err(e);
			}
		};

		self.ui.show_notice("Logging in...");
		let cmd = ClientCommand::Login {
			username: attempt.username.to_string(),
			password,
		};
		if let Err(e) = self.send_command(&cmd).await {
			self.session.cancel_login_attempt(attempt.id);
			return Err(e);
		}
		Ok(attempt.id)
	}

	pub async fn register(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
		let (username, password) = self.credentials(username, password)?;
		self.connect().await?;

		let cmd = ClientCommand::Register {
			username: username.into_string(),
			password,
		};
		self.send_command(&cmd).await?;
		self.ui.show_notice("Register sent");
		Ok(())
	}

	/// Skip login. Nothing is sent.
	pub fn continue_as_guest(&mut self) {
		info!("continuing as guest");
		self.session.authenticate(Some(GUEST_IDENTITY.to_string()));
		self.ui.show_notice("Continuing as Guest");
		self.ui.navigate_to(View::Friends);
	}

	/// Send `PING`; the server answers by pushing the friends and requests lists.
	pub async fn refresh(&mut self) -> Result<(), ClientError> {
		self.send_command(&ClientCommand::Ping).await
	}

	pub async fn add_friend(&mut self, username: &str) -> Result<(), ClientError> {
		let username = self.username(username)?;
		self.send_command(&ClientCommand::AddFriend {
			username: username.to_string(),
		})
		.await?;
		self.ui.show_notice(&format!("Requested {username}"));
		Ok(())
	}

	pub async fn accept_request(&mut self, username: &str) -> Result<(), ClientError> {
		let username = self.username(username)?;
		self.send_command(&ClientCommand::AcceptFriend {
			username: username.to_string(),
		})
		.await?;
		self.ui.show_notice(&format!("Accepted {username}"));
		Ok(())
	}

	/// Make `peer` the active peer, request its history and show the conversation.
	pub async fn open_conversation(&mut self, peer: &str) -> Result<(), ClientError> {
		let peer = self.username(peer)?.into_string();
		debug!(peer = %peer, "opening conversation");

		self.session.set_active_peer(Some(peer.clone()));
		self.ui.begin_conversation(&peer);

		let cmd = ClientCommand::GetHistory {
			peer,
			limit: self.config.history_limit,
		};
		let sent = self.send_command(&cmd).await;
		self.ui.navigate_to(View::Conversation);
		sent
	}

	pub fn close_conversation(&mut self) {
		if let Some(peer) = self.session.active_peer() {
			debug!(peer = %peer, "closing conversation");
		}
		self.session.set_active_peer(None);
		self.ui.navigate_to(View::Friends);
	}

	/// Send a direct message to the active peer. Blank text is ignored.
	pub async fn send_direct(&mut self, text: &str) -> Result<(), ClientError> {
		let text = text.trim();
		if text.is_empty() {
			return Ok(());
		}
		self.single_line("Message", text)?;

		let peer = self.require_active_peer()?;
		self.send_command(&ClientCommand::DirectMessage {
			peer,
			text: text.to_string(),
		})
		.await?;
		self.ui.append_conversation_message(&format!("You: {text}"));
		Ok(())
	}

	/// Send a base64 image payload to the active peer.
	pub async fn send_image(&mut self, payload_base64: &str) -> Result<(), ClientError> {
		let peer = self.require_active_peer()?;
		if payload_base64.is_empty() {
			return Err(ClientError::InvalidInput("empty image payload".to_string()));
		}
		self.single_line("Image", payload_base64)?;

		self.send_command(&ClientCommand::Image {
			peer,
			payload: payload_base64.to_string(),
		})
		.await?;
		self.ui.append_conversation_image("You", payload_base64);
		Ok(())
	}

	/// Write one command, surfacing failures as a notice.
	pub async fn send_command(&mut self, cmd: &ClientCommand) -> Result<(), ClientError> {
		match self.connection.send(&cmd.encode()).await {
			Ok(()) => Ok(()),
			Err(e) => {
				warn!(error = %e, tag = cmd.tag(), "send failed");
				self.ui.show_notice("Send failed / disconnected");
				Err(e)
			}
		}
	}

	/// Wait for the next inbound event and apply it.
	///
	/// Returns `false` once the inbound queue is closed.
	pub async fn next_inbound(&mut self) -> bool {
		match self.inbound_rx.recv().await {
			Some(event) => {
				self.dispatcher.dispatch(event, &mut self.ui);
				true
			}
			None => false,
		}
	}

	/// Apply every inbound event already queued, without waiting.
	pub fn drain_inbound(&mut self) -> usize {
		let mut applied = 0;
		while let Ok(event) = self.inbound_rx.try_recv() {
			self.dispatcher.dispatch(event, &mut self.ui);
			applied += 1;
		}
		applied
	}

	pub async fn close(&mut self) {
		self.connection.close().await;
	}

	fn credentials(&mut self, username: &str, password: &str) -> Result<(Username, String), ClientError> {
		let password = password.trim();
		self.single_line("Password", password)?;
		match Username::new(username) {
			Ok(username) if !password.is_empty() => Ok((username, password.to_string())),
			Ok(_) | Err(_) => {
				self.ui.show_notice("Fill username & password");
				Err(ClientError::InvalidInput("username and password are required".to_string()))
			}
		}
	}

	fn username(&mut self, name: &str) -> Result<Username, ClientError> {
		Username::new(name).map_err(|e| {
			self.ui.show_notice("Enter a username");
			ClientError::InvalidInput(format!("username: {e}"))
		})
	}

	// A line break would end the frame early and start another one.
	fn single_line(&mut self, field: &str, value: &str) -> Result<(), ClientError> {
		if value.contains(['\n', '\r']) {
			self.ui.show_notice(&format!("{field} must be a single line"));
			return Err(ClientError::InvalidInput(format!("{} contains a line break", field.to_lowercase())));
		}
		Ok(())
	}

	fn require_active_peer(&mut self) -> Result<String, ClientError> {
		self.session.active_peer().ok_or_else(|| {
			self.ui.show_notice("Choose a friend first");
			ClientError::NoActivePeer
		})
	}
}
