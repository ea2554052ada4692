#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use kiva_client_core::{Client, ClientConfig, SessionUi, View, load_client_config, load_client_config_from_path};
use kiva_util::endpoint::TcpEndpoint;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: kiva_client [--connect host:port] [--config path]\n\
\n\
Options:\n\
	--connect   Server endpoint (default: from config, else 127.0.0.1:12345)\n\
	            Format: host:port or tcp://host:port\n\
	--config    Config file (default: ~/.kiva/client.toml)\n\
	--help      Show this help\n\
\n\
Commands:\n\
	/login <user> <pass>     /register <user> <pass>   /guest\n\
	/add <user>              /accept <user>            /refresh\n\
	/open <user>             /close                    /image <path>\n\
	/quit\n\
	Any other line is sent to the open conversation.\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,kiva_client_core=debug".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

struct Args {
	endpoint: Option<TcpEndpoint>,
	config: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args {
		endpoint: None,
		config: None,
	};

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				let e = TcpEndpoint::parse(&v).unwrap_or_else(|e| {
					eprintln!("Invalid --connect value: {v}\n{e}");
					usage_and_exit()
				});
				args.endpoint = Some(e);
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				args.config = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

/// Line-oriented presentation: everything goes to stdout.
#[derive(Debug, Default)]
struct TerminalUi {
	view: View,
	peer: Option<String>,
}

impl SessionUi for TerminalUi {
	fn show_notice(&mut self, text: &str) {
		println!("* {text}");
	}

	fn navigate_to(&mut self, view: View) {
		self.view = view;
		match (view, &self.peer) {
			(View::Conversation, Some(peer)) => println!("== chat with {peer} =="),
			_ => println!("== {view} =="),
		}
	}

	fn populate_friends(&mut self, names: &[String]) {
		println!("friends: {}", display_list(names));
	}

	fn populate_requests(&mut self, names: &[String]) {
		println!("requests: {}", display_list(names));
	}

	fn begin_conversation(&mut self, peer: &str) {
		self.peer = Some(peer.to_string());
	}

	fn append_conversation_message(&mut self, text: &str) {
		println!("{text}");
	}

	fn append_conversation_image(&mut self, sender: &str, payload: &str) {
		match BASE64.decode(payload) {
			Ok(bytes) => println!("{sender}: <image, {} bytes>", bytes.len()),
			Err(e) => println!("{sender}: <image failed: {e}>"),
		}
	}

	fn active_view(&self) -> View {
		self.view
	}
}

fn display_list(names: &[String]) -> String {
	if names.is_empty() { "(none)".to_string() } else { names.join(", ") }
}

/// Returns `false` when the user asked to quit.
async fn handle_line(client: &mut Client<TerminalUi>, line: &str) -> bool {
	let line = line.trim();
	if line.is_empty() {
		return true;
	}

	let Some(rest) = line.strip_prefix('/') else {
		if let Err(e) = client.send_direct(line).await {
			warn!(error = %e, "message not sent");
		}
		return true;
	};

	let mut parts = rest.split_whitespace();
	let cmd = parts.next().unwrap_or_default();
	let arg1 = parts.next().unwrap_or_default();
	let arg2 = parts.next().unwrap_or_default();

	// Failures were already shown as notices.
	let res = match cmd {
		"quit" | "q" => return false,
		"login" => client.login(arg1, arg2).await.map(|_| ()),
		"register" => client.register(arg1, arg2).await,
		"guest" => {
			client.continue_as_guest();
			client.refresh().await
		}
		"add" => client.add_friend(arg1).await,
		"accept" => client.accept_request(arg1).await,
		"open" => client.open_conversation(arg1).await,
		"close" => {
			client.close_conversation();
			Ok(())
		}
		"refresh" => client.refresh().await,
		"image" => match read_image(arg1).await {
			Ok(payload) => client.send_image(&payload).await,
			Err(e) => {
				println!("* {e:#}");
				Ok(())
			}
		},
		other => {
			println!("* unknown command: /{other}");
			Ok(())
		}
	};

	if let Err(e) = res {
		warn!(error = %e, command = cmd, "command failed");
	}
	true
}

async fn read_image(path: &str) -> anyhow::Result<String> {
	if path.is_empty() {
		anyhow::bail!("usage: /image <path>");
	}
	let bytes = tokio::fs::read(path).await.with_context(|| format!("read image {path}"))?;
	Ok(BASE64.encode(bytes))
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
	let cfg = match &args.config {
		Some(path) => load_client_config_from_path(path)?,
		None => load_client_config()?,
	};
	Ok(match &args.endpoint {
		Some(endpoint) => cfg.with_endpoint(endpoint.clone()),
		None => cfg,
	})
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();

	let cfg = load_config(&args).context("load client config")?;
	info!(endpoint = %cfg.endpoint(), "kiva_client starting");

	let mut client = Client::new(cfg, TerminalUi::default());
	// A failed connect is shown as a notice; sends retry it.
	let _ = client.connect().await;
	client.ui_mut().navigate_to(View::Login);

	let mut stdin = BufReader::new(tokio::io::stdin()).lines();
	loop {
		tokio::select! {
			line = stdin.next_line() => {
				match line.context("read stdin")? {
					Some(line) => {
						if !handle_line(&mut client, &line).await {
							break;
						}
					}
					None => break,
				}
			}
			alive = client.next_inbound() => {
				if !alive {
					break;
				}
			}
		}
	}

	client.close().await;
	info!("kiva_client exiting");
	Ok(())
}
