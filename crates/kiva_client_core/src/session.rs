#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use kiva_domain::Username;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::config::LoginPolicy;

/// Monotonically increasing id of a login attempt within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoginAttemptId(u64);

impl LoginAttemptId {
	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for LoginAttemptId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Correlation token for a login whose result has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
	pub id: LoginAttemptId,
	pub username: Username,
}

/// Coarse routing state derived from [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
	Anonymous,
	Authenticated,
	ConversationOpen { peer: String },
}

/// Client-local session data: identity, pending login and active peer.
#[derive(Debug)]
pub struct SessionState {
	identity: Option<String>,
	authenticated: bool,
	pending_login: Option<LoginAttempt>,
	active_peer: Option<String>,
	next_attempt_id: u64,
	policy: LoginPolicy,
}

impl Default for SessionState {
	fn default() -> Self {
		Self::new(LoginPolicy::default())
	}
}

impl SessionState {
	pub fn new(policy: LoginPolicy) -> Self {
		Self {
			identity: None,
			authenticated: false,
			pending_login: None,
			active_peer: None,
			next_attempt_id: 1,
			policy,
		}
	}

	/// Record a login about to be sent.
	///
	/// Must be called before the `LOGIN` frame is written so a fast reply
	/// always finds the token.
	pub fn begin_login_attempt(&mut self, username: Username) -> Result<LoginAttempt, ClientError> {
		if let Some(pending) = &self.pending_login {
			match self.policy {
				LoginPolicy::Reject => {
					return Err(ClientError::LoginInFlight {
						username: pending.username.to_string(),
					});
				}
				LoginPolicy::Supersede => {
					warn!(
						superseded = %pending.id,
						superseded_user = %pending.username,
						user = %username,
						"login attempt superseded before its result arrived"
					);
				}
			}
		}

		let attempt = LoginAttempt {
			id: LoginAttemptId(self.next_attempt_id),
			username,
		};
		self.next_attempt_id += 1;
		self.pending_login = Some(attempt.clone());
		debug!(attempt = %attempt.id, user = %attempt.username, "login attempt started");
		Ok(attempt)
	}

	/// Take the pending attempt a login result applies to. Resolves at most once.
	pub fn resolve_login(&mut self, success: bool) -> Option<LoginAttempt> {
		let attempt = self.pending_login.take();
		match &attempt {
			Some(a) => info!(attempt = %a.id, user = %a.username, success, "login resolved"),
			None => warn!(success, "login result without a pending attempt"),
		}
		attempt
	}

	/// Drop `id` if it is still the pending attempt. Returns whether it was.
	pub fn cancel_login_attempt(&mut self, id: LoginAttemptId) -> bool {
		if self.pending_login.as_ref().is_some_and(|a| a.id == id) {
			self.pending_login = None;
			debug!(attempt = %id, "login attempt cancelled");
			true
		} else {
			false
		}
	}

	pub fn pending_login(&self) -> Option<&LoginAttempt> {
		self.pending_login.as_ref()
	}

	/// Mark the session authenticated. `identity` may be `None` when the
	/// result could not be correlated with an attempt.
	pub fn authenticate(&mut self, identity: Option<String>) {
		self.identity = identity;
		self.authenticated = true;
	}

	pub fn set_identity(&mut self, identity: Option<String>) {
		self.identity = identity;
	}

	pub fn identity(&self) -> Option<&str> {
		self.identity.as_deref()
	}

	pub fn is_authenticated(&self) -> bool {
		self.authenticated
	}

	pub fn set_active_peer(&mut self, peer: Option<String>) {
		self.active_peer = peer;
	}

	pub fn active_peer(&self) -> Option<&str> {
		self.active_peer.as_deref()
	}

	pub fn is_active_peer(&self, name: &str) -> bool {
		self.active_peer.as_deref() == Some(name)
	}

	pub fn login_policy(&self) -> LoginPolicy {
		self.policy
	}

	pub fn phase(&self) -> SessionPhase {
		match (&self.active_peer, self.authenticated) {
			(Some(peer), _) => SessionPhase::ConversationOpen { peer: peer.clone() },
			(None, true) => SessionPhase::Authenticated,
			(None, false) => SessionPhase::Anonymous,
		}
	}
}

/// Shared handle used by both the outbound path and the dispatcher.
///
/// Every method takes the lock once, so each call is atomic.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
	inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
	pub fn new(policy: LoginPolicy) -> Self {
		Self {
			inner: Arc::new(Mutex::new(SessionState::new(policy))),
		}
	}

	pub fn begin_login_attempt(&self, username: Username) -> Result<LoginAttempt, ClientError> {
		self.inner.lock().begin_login_attempt(username)
	}

	pub fn resolve_login(&self, success: bool) -> Option<LoginAttempt> {
		self.inner.lock().resolve_login(success)
	}

	/// Resolve the pending attempt and, on success, authenticate with its
	/// username under the same lock.
	pub fn complete_login(&self, success: bool) -> Option<LoginAttempt> {
		let mut state = self.inner.lock();
		let attempt = state.resolve_login(success);
		if success {
			state.authenticate(attempt.as_ref().map(|a| a.username.to_string()));
		}
		attempt
	}

	pub fn cancel_login_attempt(&self, id: LoginAttemptId) -> bool {
		self.inner.lock().cancel_login_attempt(id)
	}

	pub fn authenticate(&self, identity: Option<String>) {
		self.inner.lock().authenticate(identity);
	}

	pub fn set_identity(&self, identity: Option<String>) {
		self.inner.lock().set_identity(identity);
	}

	pub fn identity(&self) -> Option<String> {
		self.inner.lock().identity().map(str::to_string)
	}

	pub fn is_authenticated(&self) -> bool {
		self.inner.lock().is_authenticated()
	}

	pub fn set_active_peer(&self, peer: Option<String>) {
		self.inner.lock().set_active_peer(peer);
	}

	pub fn active_peer(&self) -> Option<String> {
		self.inner.lock().active_peer().map(str::to_string)
	}

	pub fn is_active_peer(&self, name: &str) -> bool {
		self.inner.lock().is_active_peer(name)
	}

	pub fn has_pending_login(&self) -> bool {
		self.inner.lock().pending_login().is_some()
	}

	pub fn phase(&self) -> SessionPhase {
		self.inner.lock().phase()
	}
}
