#![forbid(unsafe_code)]

use kiva_domain::View;
use kiva_protocol::{ServerMessage, ServerNotice};
use tracing::{debug, info, warn};

use crate::connection::InboundEvent;
use crate::session::SessionHandle;
use crate::ui::SessionUi;

/// Applies inbound events to the session and the UI, one at a time.
#[derive(Debug, Clone)]
pub struct Dispatcher {
	session: SessionHandle,
}

impl Dispatcher {
	pub fn new(session: SessionHandle) -> Self {
		Self { session }
	}

	pub fn session(&self) -> &SessionHandle {
		&self.session
	}

	pub fn dispatch<U: SessionUi + ?Sized>(&self, event: InboundEvent, ui: &mut U) {
		match event {
			InboundEvent::Message(msg) => self.apply(msg, ui),
			InboundEvent::Disconnected { reason } => {
				info!(reason = %reason, "disconnected from server");
				ui.show_notice("Disconnected from server");
			}
		}
	}

	pub fn apply<U: SessionUi + ?Sized>(&self, msg: ServerMessage, ui: &mut U) {
		match msg {
			ServerMessage::Notice(notice) => self.on_notice(notice, ui),
			ServerMessage::FriendsList { names } => {
				debug!(count = names.len(), "friends list replaced");
				ui.populate_friends(&names);
			}
			ServerMessage::RequestsList { names } => {
				debug!(count = names.len(), "requests list replaced");
				ui.populate_requests(&names);
			}
			ServerMessage::DirectMessage { sender, text } => {
				if self.is_showing_conversation_with(&sender, ui) {
					ui.append_conversation_message(&format!("{sender}: {text}"));
				} else {
					debug!(sender = %sender, "direct message outside the open conversation");
					ui.show_notice(&format!("New DM from {sender}"));
				}
			}
			ServerMessage::DirectImage { sender, payload } => {
				if self.is_showing_conversation_with(&sender, ui) {
					ui.append_conversation_image(&sender, &payload);
				} else {
					debug!(sender = %sender, bytes = payload.len(), "image outside the open conversation");
					ui.show_notice(&format!("Image from {sender}"));
				}
			}
			ServerMessage::HistoryEntry {
				sender,
				content,
				timestamp,
			} => {
				debug!(sender = %sender, timestamp = %timestamp, "history entry");
				ui.append_conversation_message(&format!("(history) {sender}: {content}"));
			}
			ServerMessage::Unrecognized { raw } => {
				debug!(bytes = raw.len(), "ignoring unrecognized frame");
			}
		}
	}

	fn on_notice<U: SessionUi + ?Sized>(&self, notice: ServerNotice, ui: &mut U) {
		match notice {
			ServerNotice::LoginOk => {
				let attempt = self.session.complete_login(true);
				match attempt {
					Some(attempt) => {
						info!(attempt = %attempt.id, user = %attempt.username, "logged in");
						ui.show_notice(&format!("Logged in as {}", attempt.username));
					}
					None => {
						warn!("LOGIN_OK without a pending attempt; identity unknown");
						ui.show_notice("Logged in");
					}
				}
				ui.navigate_to(View::Friends);
			}
			ServerNotice::LoginFail => {
				self.session.complete_login(false);
				ui.show_notice("Login failed");
			}
			ServerNotice::RegisterOk => ui.show_notice("Registration OK, please login"),
			ServerNotice::RegisterFail => ui.show_notice("Registration failed"),
			ServerNotice::Other(cmd) => ui.show_notice(&format!("Server: {cmd}")),
		}
	}

	fn is_showing_conversation_with<U: SessionUi + ?Sized>(&self, sender: &str, ui: &U) -> bool {
		ui.active_view() == View::Conversation && self.session.is_active_peer(sender)
	}
}

#[cfg(test)]
mod tests {
	use kiva_domain::Username;

	use super::*;
	use crate::ui::{HeadlessUi, UiEffect};

	fn setup() -> (Dispatcher, HeadlessUi) {
		(Dispatcher::new(SessionHandle::default()), HeadlessUi::new())
	}

	fn open_chat(d: &Dispatcher, ui: &mut HeadlessUi, peer: &str) {
		d.session().set_active_peer(Some(peer.to_string()));
		ui.navigate_to(View::Conversation);
		ui.take_effects();
	}

	#[test]
	fn login_ok_uses_pending_username() {
		let (d, mut ui) = setup();
		d.session().begin_login_attempt(Username::new("bob").unwrap()).unwrap();

		d.apply(ServerMessage::Notice(ServerNotice::LoginOk), &mut ui);

		assert_eq!(d.session().identity().as_deref(), Some("bob"));
		assert!(d.session().is_authenticated());
		assert_eq!(ui.navigations_to(View::Friends), 1);
		assert_eq!(ui.notices(), vec!["Logged in as bob"]);
	}

	#[test]
	fn login_fail_clears_token_and_stays_anonymous() {
		let (d, mut ui) = setup();
		d.session().begin_login_attempt(Username::new("bob").unwrap()).unwrap();

		d.apply(ServerMessage::Notice(ServerNotice::LoginFail), &mut ui);

		assert!(!d.session().has_pending_login());
		assert!(!d.session().is_authenticated());
		assert_eq!(ui.notices(), vec!["Login failed"]);
		assert_eq!(ui.navigations_to(View::Friends), 0);
	}

	#[test]
	fn register_and_other_notices_do_not_change_state() {
		let (d, mut ui) = setup();
		d.apply(ServerMessage::Notice(ServerNotice::RegisterOk), &mut ui);
		d.apply(ServerMessage::Notice(ServerNotice::RegisterFail), &mut ui);
		d.apply(ServerMessage::Notice(ServerNotice::Other("FRIEND_ADDED".into())), &mut ui);

		assert_eq!(
			ui.notices(),
			vec!["Registration OK, please login", "Registration failed", "Server: FRIEND_ADDED"]
		);
		assert!(!d.session().is_authenticated());
	}

	#[test]
	fn dm_from_active_peer_is_appended() {
		let (d, mut ui) = setup();
		open_chat(&d, &mut ui, "amy");

		d.apply(
			ServerMessage::DirectMessage {
				sender: "amy".into(),
				text: "hi~there".into(),
			},
			&mut ui,
		);

		assert_eq!(ui.effects(), &[UiEffect::Message("amy: hi~there".into())]);
	}

	#[test]
	fn dm_from_other_peer_is_a_notice() {
		let (d, mut ui) = setup();
		open_chat(&d, &mut ui, "amy");

		d.apply(
			ServerMessage::DirectMessage {
				sender: "zed".into(),
				text: "yo".into(),
			},
			&mut ui,
		);
		assert_eq!(ui.effects(), &[UiEffect::Notice("New DM from zed".into())]);
	}

	#[test]
	fn dm_from_active_peer_outside_conversation_view_is_a_notice() {
		let (d, mut ui) = setup();
		d.session().set_active_peer(Some("amy".into()));
		ui.navigate_to(View::Friends);
		ui.take_effects();

		d.apply(
			ServerMessage::DirectMessage {
				sender: "amy".into(),
				text: "hi".into(),
			},
			&mut ui,
		);
		assert_eq!(ui.notices(), vec!["New DM from amy"]);
	}

	#[test]
	fn image_routing_forwards_payload_untouched() {
		let (d, mut ui) = setup();
		open_chat(&d, &mut ui, "amy");

		d.apply(
			ServerMessage::DirectImage {
				sender: "amy".into(),
				payload: "not-base64!".into(),
			},
			&mut ui,
		);
		d.apply(
			ServerMessage::DirectImage {
				sender: "zed".into(),
				payload: "aGk=".into(),
			},
			&mut ui,
		);

		assert_eq!(
			ui.effects(),
			&[
				UiEffect::Image {
					sender: "amy".into(),
					payload: "not-base64!".into()
				},
				UiEffect::Notice("Image from zed".into()),
			]
		);
	}

	#[test]
	fn history_is_always_appended() {
		let (d, mut ui) = setup();
		d.apply(
			ServerMessage::HistoryEntry {
				sender: "zed".into(),
				content: "old".into(),
				timestamp: "2024-01-01 10:00:00".into(),
			},
			&mut ui,
		);
		assert_eq!(ui.messages(), vec!["(history) zed: old"]);
	}

	#[test]
	fn lists_replace_and_unrecognized_is_silent() {
		let (d, mut ui) = setup();
		d.apply(
			ServerMessage::FriendsList {
				names: vec!["a".into(), "b".into()],
			},
			&mut ui,
		);
		d.apply(ServerMessage::FriendsList { names: vec!["c".into()] }, &mut ui);
		d.apply(ServerMessage::RequestsList { names: vec![] }, &mut ui);
		d.apply(ServerMessage::Unrecognized { raw: "WAT".into() }, &mut ui);

		assert_eq!(
			ui.effects(),
			&[
				UiEffect::Friends(vec!["a".into(), "b".into()]),
				UiEffect::Friends(vec!["c".into()]),
				UiEffect::Requests(vec![]),
			]
		);
	}

	#[test]
	fn disconnect_keeps_identity_and_peer() {
		let (d, mut ui) = setup();
		d.session().authenticate(Some("bob".into()));
		d.session().set_active_peer(Some("amy".into()));

		d.dispatch(
			InboundEvent::Disconnected {
				reason: "connection closed by server".into(),
			},
			&mut ui,
		);

		assert_eq!(d.session().identity().as_deref(), Some("bob"));
		assert_eq!(d.session().active_peer().as_deref(), Some("amy"));
		assert_eq!(ui.notices(), vec!["Disconnected from server"]);
	}
}
