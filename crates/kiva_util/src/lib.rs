#![forbid(unsafe_code)]

pub mod endpoint {
	use std::fmt;

	/// Scheme accepted (and ignored) in front of `host:port`.
	pub const TCP_SCHEME: &str = "tcp://";

	/// Parsed `host:port` endpoint of a line-protocol server.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct TcpEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl TcpEndpoint {
		pub fn new(host: impl Into<String>, port: u16) -> Self {
			Self { host: host.into(), port }
		}

		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Parse `host:port`, optionally prefixed with `tcp://`.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected host:port)".to_string());
			}

			let rest = s.strip_prefix(TCP_SCHEME).unwrap_or(s);

			if rest.contains("://") {
				return Err(format!("unsupported endpoint scheme (expected host:port or tcp://host:port): {s}"));
			}

			if rest.contains('/') || rest.contains('?') || rest.contains('#') {
				return Err(format!(
					"invalid endpoint (expected host:port without path/query/fragment): {s}"
				));
			}

			let (host, port_str) = rest
				.rsplit_once(':')
				.ok_or_else(|| format!("invalid endpoint (missing :port, expected host:port): {s}"))?;

			let host = host.trim();
			if host.is_empty() {
				return Err(format!("invalid endpoint host (expected host:port): {s}"));
			}

			if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
				return Err(format!(
					"invalid endpoint host (IPv6 must be bracketed like [::1]:12345): {s}"
				));
			}

			let port: u16 = port_str
				.trim()
				.parse()
				.map_err(|_| format!("invalid endpoint port (expected 1..=65535): {s}"))?;

			if port == 0 {
				return Err(format!("invalid endpoint port (expected 1..=65535): {s}"));
			}

			Ok(Self {
				host: host.to_string(),
				port,
			})
		}
	}

	impl fmt::Display for TcpEndpoint {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "{}:{}", self.host, self.port)
		}
	}

}
