#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use kiva_protocol::DEFAULT_MAX_LINE_BYTES;
use kiva_util::endpoint::TcpEndpoint;
use serde::Deserialize;
use tracing::{info, warn};

use crate::ClientError;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 12345;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_HISTORY_LIMIT: u32 = 200;
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 256;

/// What to do when a login is submitted while another is still unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPolicy {
	/// The newer attempt replaces the pending one; the next result is
	/// attributed to the newer attempt.
	#[default]
	Supersede,
	/// The newer attempt is refused until the pending one resolves.
	Reject,
}

impl FromStr for LoginPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"supersede" => Ok(LoginPolicy::Supersede),
			"reject" => Ok(LoginPolicy::Reject),
			other => Err(format!("unknown login policy: {other} (expected supersede|reject)")),
		}
	}
}

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Remote server host (DNS name or IP literal).
	pub server_host: String,

	/// Remote server TCP port.
	pub server_port: u16,

	/// Bound on connection establishment.
	pub connect_timeout: Duration,

	/// Number of history entries requested when a conversation opens.
	pub history_limit: u32,

	/// Capacity of the receive loop -> dispatcher queue.
	pub inbound_queue_capacity: usize,

	/// Maximum length of one inbound frame.
	pub max_line_bytes: usize,

	pub login_policy: LoginPolicy,
}

impl ClientConfig {
	pub fn endpoint(&self) -> TcpEndpoint {
		TcpEndpoint::new(self.server_host.clone(), self.server_port)
	}

	pub fn with_endpoint(mut self, endpoint: TcpEndpoint) -> Self {
		self.server_host = endpoint.host;
		self.server_port = endpoint.port;
		self
	}

	/// Convenience: create a config from `host:port`.
	pub fn from_endpoint(endpoint: &str) -> Result<Self, ClientError> {
		let e = TcpEndpoint::parse(endpoint).map_err(ClientError::InvalidInput)?;
		Ok(Self::default().with_endpoint(e))
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server_host: DEFAULT_SERVER_HOST.to_string(),
			server_port: DEFAULT_SERVER_PORT,
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			history_limit: DEFAULT_HISTORY_LIMIT,
			inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
			max_line_bytes: DEFAULT_MAX_LINE_BYTES,
			login_policy: LoginPolicy::Supersede,
		}
	}
}

/// Default config path: `~/.kiva/client.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".kiva").join("client.toml"))
}

/// Load the client config from TOML and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	load_client_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load from `path`, resolving overrides through `env` instead of the process environment.
pub fn load_client_config_with_env<F>(path: &Path, env: F) -> anyhow::Result<ClientConfig>
where
	F: Fn(&str) -> Option<String>,
{
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg)?;

	apply_env_overrides(&mut cfg, env)?;

	Ok(cfg)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	session: FileSessionSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	endpoint: Option<String>,
	host: Option<String>,
	port: Option<u16>,
	connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileSessionSettings {
	history_limit: Option<u32>,
	inbound_queue_capacity: Option<usize>,
	max_line_bytes: Option<usize>,
	login_policy: Option<LoginPolicy>,
}

impl ClientConfig {
	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let mut cfg = ClientConfig::default();

		if let Some(endpoint) = file.server.endpoint.filter(|s| !s.trim().is_empty()) {
			let e = TcpEndpoint::parse(&endpoint).map_err(|msg| anyhow!(msg)).context("server.endpoint")?;
			cfg = cfg.with_endpoint(e);
		}
		if let Some(host) = file.server.host.filter(|s| !s.trim().is_empty()) {
			cfg.server_host = host.trim().to_string();
		}
		if let Some(port) = file.server.port.filter(|p| *p != 0) {
			cfg.server_port = port;
		}
		if let Some(secs) = file.server.connect_timeout_secs {
			if secs == 0 {
				warn!("client config: connect_timeout_secs = 0 ignored");
			} else {
				cfg.connect_timeout = Duration::from_secs(secs);
			}
		}

		if let Some(limit) = file.session.history_limit {
			cfg.history_limit = limit;
		}
		if let Some(capacity) = file.session.inbound_queue_capacity.filter(|c| *c > 0) {
			cfg.inbound_queue_capacity = capacity;
		}
		if let Some(max) = file.session.max_line_bytes.filter(|m| *m > 0) {
			cfg.max_line_bytes = max;
		}
		if let Some(policy) = file.session.login_policy {
			cfg.login_policy = policy;
		}

		Ok(cfg)
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn non_empty(v: Option<String>) -> Option<String> {
	v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn apply_env_overrides<F>(cfg: &mut ClientConfig, env: F) -> anyhow::Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	if let Some(v) = non_empty(env("KIVA_SERVER_ENDPOINT")) {
		let e = TcpEndpoint::parse(&v)
			.map_err(|msg| anyhow!(msg))
			.context("KIVA_SERVER_ENDPOINT")?;
		cfg.server_host = e.host;
		cfg.server_port = e.port;
		info!(endpoint = %v, "client config: server endpoint overridden by env");
	}

	if let Some(v) = non_empty(env("KIVA_SERVER_HOST")) {
		cfg.server_host = v;
		info!("client config: server_host overridden by env");
	}

	if let Some(v) = non_empty(env("KIVA_SERVER_PORT"))
		&& let Ok(port) = v.parse::<u16>()
		&& port != 0
	{
		cfg.server_port = port;
		info!(port, "client config: server_port overridden by env");
	}

	if let Some(v) = non_empty(env("KIVA_CONNECT_TIMEOUT_SECS"))
		&& let Ok(secs) = v.parse::<u64>()
		&& secs > 0
	{
		cfg.connect_timeout = Duration::from_secs(secs);
		info!(secs, "client config: connect_timeout overridden by env");
	}

	if let Some(v) = non_empty(env("KIVA_HISTORY_LIMIT"))
		&& let Ok(limit) = v.parse::<u32>()
	{
		cfg.history_limit = limit;
		info!(limit, "client config: history_limit overridden by env");
	}

	if let Some(v) = non_empty(env("KIVA_INBOUND_QUEUE_CAPACITY"))
		&& let Ok(capacity) = v.parse::<usize>()
		&& capacity > 0
	{
		cfg.inbound_queue_capacity = capacity;
		info!(capacity, "client config: inbound_queue_capacity overridden by env");
	}

	if let Some(v) = non_empty(env("KIVA_LOGIN_POLICY")) {
		match v.parse::<LoginPolicy>() {
			Ok(policy) => {
				cfg.login_policy = policy;
				info!(?policy, "client config: login_policy overridden by env");
			}
			Err(e) => warn!(error = %e, "client config: ignoring KIVA_LOGIN_POLICY"),
		}
	}

	Ok(())
}
