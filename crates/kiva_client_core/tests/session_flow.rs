#![forbid(unsafe_code)]

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use kiva_client_core::{
	Client, ClientConfig, ClientError, HeadlessUi, LoginPolicy, SessionPhase, SessionUi, UiEffect, View,
};
use kiva_util::endpoint::TcpEndpoint;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

const WAIT: Duration = Duration::from_secs(5);

static LOG_INIT: OnceLock<()> = OnceLock::new();

fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("KIVA_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

/// In-process stand-in for the messaging server.
struct FakeServer {
	listener: TcpListener,
}

impl FakeServer {
	async fn bind() -> anyhow::Result<Self> {
		init_test_logging();
		let listener = TcpListener::bind("127.0.0.1:0").await.context("bind fake server")?;
		Ok(Self { listener })
	}

	fn config(&self) -> anyhow::Result<ClientConfig> {
		let port = self.listener.local_addr()?.port();
		Ok(ClientConfig::default().with_endpoint(TcpEndpoint::new("127.0.0.1", port)))
	}

	async fn accept(&self) -> anyhow::Result<FakePeer> {
		let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
			.await
			.context("timeout waiting for client connection")??;
		Ok(FakePeer::new(stream))
	}
}

struct FakePeer {
	lines: Lines<BufReader<OwnedReadHalf>>,
	writer: OwnedWriteHalf,
}

impl FakePeer {
	fn new(stream: TcpStream) -> Self {
		let (r, w) = stream.into_split();
		Self {
			lines: BufReader::new(r).lines(),
			writer: w,
		}
	}

	async fn expect_line(&mut self) -> anyhow::Result<String> {
		tokio::time::timeout(WAIT, self.lines.next_line())
			.await
			.context("timeout waiting for client frame")??
			.ok_or_else(|| anyhow!("client closed the connection"))
	}

	async fn push(&mut self, frames: &str) -> anyhow::Result<()> {
		self.writer.write_all(frames.as_bytes()).await.context("write frames")?;
		self.writer.flush().await?;
		Ok(())
	}
}

async fn pump(client: &mut Client<HeadlessUi>, n: usize) -> anyhow::Result<()> {
	for _ in 0..n {
		let alive = tokio::time::timeout(WAIT, client.next_inbound())
			.await
			.context("timeout waiting for inbound event")?;
		anyhow::ensure!(alive, "inbound queue closed");
	}
	Ok(())
}

async fn connected(server: &FakeServer, cfg: ClientConfig) -> anyhow::Result<(Client<HeadlessUi>, FakePeer)> {
	let mut client = Client::new(cfg, HeadlessUi::new());
	client.connect().await?;
	let peer = server.accept().await?;
	Ok((client, peer))
}

#[tokio::test]
async fn login_ok_sets_identity_and_navigates_once() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;

	client.login("bob", "pw").await?;
	assert_eq!(peer.expect_line().await?, "LOGIN~bob~pw");

	peer.push("SERVER~LOGIN_OK\n").await?;
	pump(&mut client, 1).await?;

	assert_eq!(client.session().identity().as_deref(), Some("bob"));
	assert_eq!(client.session().phase(), SessionPhase::Authenticated);
	assert_eq!(client.ui().navigations_to(View::Friends), 1);
	assert!(client.ui().notices().contains(&"Logged in as bob"));
	Ok(())
}

#[tokio::test]
async fn second_login_supersedes_first() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;

	let a = client.login("a", "x").await?;
	let b = client.login("b", "y").await?;
	assert!(b > a);
	assert_eq!(peer.expect_line().await?, "LOGIN~a~x");
	assert_eq!(peer.expect_line().await?, "LOGIN~b~y");

	peer.push("SERVER~LOGIN_OK\n").await?;
	pump(&mut client, 1).await?;

	assert_eq!(client.session().identity().as_deref(), Some("b"));
	assert!(!client.session().has_pending_login());
	Ok(())
}

#[tokio::test]
async fn reject_policy_refuses_second_login_without_sending() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let mut cfg = server.config()?;
	cfg.login_policy = LoginPolicy::Reject;
	let (mut client, mut peer) = connected(&server, cfg).await?;

	client.login("a", "x").await?;
	let err = client.login("b", "y").await.unwrap_err();
	assert!(matches!(err, ClientError::LoginInFlight { ref username } if username == "a"));

	client.refresh().await?;
	assert_eq!(peer.expect_line().await?, "LOGIN~a~x");
	assert_eq!(peer.expect_line().await?, "PING");

	peer.push("SERVER~LOGIN_OK\n").await?;
	pump(&mut client, 1).await?;
	assert_eq!(client.session().identity().as_deref(), Some("a"));
	Ok(())
}

#[tokio::test]
async fn blank_credentials_send_nothing() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;

	assert!(matches!(client.login("  ", "pw").await, Err(ClientError::InvalidInput(_))));
	assert!(matches!(client.register("bob", " ").await, Err(ClientError::InvalidInput(_))));
	assert_eq!(client.ui().notices(), vec!["Fill username & password"; 2]);

	client.register("bob", "pw").await?;
	assert_eq!(peer.expect_line().await?, "REGISTER~bob~pw");
	Ok(())
}

#[tokio::test]
async fn send_direct_without_peer_writes_nothing() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;

	assert!(matches!(client.send_direct("hi").await, Err(ClientError::NoActivePeer)));
	assert!(matches!(client.send_image("aGk=").await, Err(ClientError::NoActivePeer)));
	assert!(client.ui().notices().contains(&"Choose a friend first"));

	client.refresh().await?;
	assert_eq!(peer.expect_line().await?, "PING");
	Ok(())
}

#[tokio::test]
async fn open_conversation_requests_history_and_routes_messages() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;
	client.continue_as_guest();

	client.open_conversation("amy").await?;
	assert_eq!(peer.expect_line().await?, "GET_HISTORY_DM~amy~200");
	assert_eq!(client.ui().active_view(), View::Conversation);
	client.ui_mut().take_effects();

	peer.push(concat!(
		"HISTORY_DM~amy~old~2024-01-01 10:00:00\n",
		"DM~amy~hi~there\n",
		"DM~zed~psst\n",
		"IMAGE~amy~aGk=\n",
		"GARBAGE\n",
	))
	.await?;
	pump(&mut client, 5).await?;

	assert_eq!(
		client.ui().effects(),
		&[
			UiEffect::Message("(history) amy: old".into()),
			UiEffect::Message("amy: hi~there".into()),
			UiEffect::Notice("New DM from zed".into()),
			UiEffect::Image {
				sender: "amy".into(),
				payload: "aGk=".into()
			},
		]
	);

	client.send_direct("  hello  ").await?;
	assert_eq!(peer.expect_line().await?, "DM~amy~hello");
	assert_eq!(client.ui().messages().last().copied(), Some("You: hello"));

	client.close_conversation();
	assert_eq!(client.session().active_peer(), None);
	assert_eq!(client.ui().navigations_to(View::Friends), 1);
	Ok(())
}

#[tokio::test]
async fn server_close_keeps_session_and_next_send_reconnects() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;

	client.login("bob", "pw").await?;
	assert_eq!(peer.expect_line().await?, "LOGIN~bob~pw");
	peer.push("SERVER~LOGIN_OK\n").await?;
	pump(&mut client, 1).await?;
	client.open_conversation("amy").await?;
	assert_eq!(peer.expect_line().await?, "GET_HISTORY_DM~amy~200");

	peer.push("DM~amy~partial-without-terminator").await?;
	drop(peer);
	pump(&mut client, 1).await?;

	assert!(client.ui().notices().contains(&"Disconnected from server"));
	assert!(!client.is_connected().await);
	assert_eq!(client.session().identity().as_deref(), Some("bob"));
	assert_eq!(client.session().active_peer().as_deref(), Some("amy"));
	assert!(!client.ui().messages().iter().any(|m| m.contains("partial")));

	client.send_direct("back").await?;
	let mut peer = server.accept().await?;
	assert_eq!(peer.expect_line().await?, "DM~amy~back");
	assert!(client.is_connected().await);
	Ok(())
}

#[tokio::test]
async fn connect_failure_is_a_notice() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let cfg = server.config()?;
	drop(server);

	let mut client = Client::new(cfg, HeadlessUi::new());
	assert!(matches!(client.connect().await, Err(ClientError::Connect(_))));
	assert!(client.login("bob", "pw").await.is_err());
	assert!(!client.session().has_pending_login());

	assert!(matches!(client.refresh().await, Err(ClientError::NotConnected(_))));
	assert_eq!(
		client.ui().notices(),
		vec![
			"Unable to connect to server",
			"Unable to connect to server",
			"Send failed / disconnected"
		]
	);
	Ok(())
}

#[tokio::test]
async fn lists_are_replaced_wholesale() -> anyhow::Result<()> {
	let server = FakeServer::bind().await?;
	let (mut client, mut peer) = connected(&server, server.config()?).await?;

	client.add_friend("amy").await?;
	client.accept_request("zed").await?;
	assert_eq!(peer.expect_line().await?, "ADD_FRIENDS~amy");
	assert_eq!(peer.expect_line().await?, "ACCEPT_FRIEND~zed");
	client.ui_mut().take_effects();

	peer.push("FRIENDS~alice,bob,\nREQUESTS~carol\nFRIENDS~dave\n").await?;
	pump(&mut client, 3).await?;

	assert_eq!(
		client.ui().effects(),
		&[
			UiEffect::Friends(vec!["alice".into(), "bob".into()]),
			UiEffect::Requests(vec!["carol".into()]),
			UiEffect::Friends(vec!["dave".into()]),
		]
	);
	assert_eq!(client.drain_inbound(), 0);
	Ok(())
}
