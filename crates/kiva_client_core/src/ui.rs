#![forbid(unsafe_code)]

use kiva_domain::View;

/// Presentation-layer calls made by the session core.
///
/// Implementations run on the context that drains the inbound queue, so
/// they may touch toolkit-owned state directly.
pub trait SessionUi {
	/// Transient, non-blocking message.
	fn show_notice(&mut self, text: &str);

	fn navigate_to(&mut self, view: View);

	/// Replace the friends list wholesale.
	fn populate_friends(&mut self, names: &[String]);

	/// Replace the pending requests list wholesale.
	fn populate_requests(&mut self, names: &[String]);

	/// Reset the conversation view for `peer`.
	fn begin_conversation(&mut self, peer: &str);

	fn append_conversation_message(&mut self, text: &str);

	/// `payload` is base64 text; decoding is up to the implementation.
	fn append_conversation_image(&mut self, sender: &str, payload: &str);

	fn active_view(&self) -> View;
}

/// One call recorded by [`HeadlessUi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
	Notice(String),
	Navigate(View),
	Friends(Vec<String>),
	Requests(Vec<String>),
	BeginConversation(String),
	Message(String),
	Image { sender: String, payload: String },
}

/// UI that records every call. Used by tests and non-interactive embedders.
#[derive(Debug, Default)]
pub struct HeadlessUi {
	view: View,
	effects: Vec<UiEffect>,
}

impl HeadlessUi {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn effects(&self) -> &[UiEffect] {
		&self.effects
	}

	pub fn take_effects(&mut self) -> Vec<UiEffect> {
		std::mem::take(&mut self.effects)
	}

	pub fn notices(&self) -> Vec<&str> {
		self.effects
			.iter()
			.filter_map(|e| match e {
				UiEffect::Notice(text) => Some(text.as_str()),
				_ => None,
			})
			.collect()
	}

	pub fn messages(&self) -> Vec<&str> {
		self.effects
			.iter()
			.filter_map(|e| match e {
				UiEffect::Message(text) => Some(text.as_str()),
				_ => None,
			})
			.collect()
	}

	pub fn navigations_to(&self, view: View) -> usize {
		self.effects
			.iter()
			.filter(|e| matches!(e, UiEffect::Navigate(v) if *v == view))
			.count()
	}
}

impl SessionUi for HeadlessUi {
	fn show_notice(&mut self, text: &str) {
		self.effects.push(UiEffect::Notice(text.to_string()));
	}

	fn navigate_to(&mut self, view: View) {
		self.view = view;
		self.effects.push(UiEffect::Navigate(view));
	}

	fn populate_friends(&mut self, names: &[String]) {
		self.effects.push(UiEffect::Friends(names.to_vec()));
	}

	fn populate_requests(&mut self, names: &[String]) {
		self.effects.push(UiEffect::Requests(names.to_vec()));
	}

	fn begin_conversation(&mut self, peer: &str) {
		self.effects.push(UiEffect::BeginConversation(peer.to_string()));
	}

	fn append_conversation_message(&mut self, text: &str) {
		self.effects.push(UiEffect::Message(text.to_string()));
	}

	fn append_conversation_image(&mut self, sender: &str, payload: &str) {
		self.effects.push(UiEffect::Image {
			sender: sender.to_string(),
			payload: payload.to_string(),
		});
	}

	fn active_view(&self) -> View {
		self.view
	}
}
