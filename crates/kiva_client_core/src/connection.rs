#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use kiva_protocol::{DecodeError, LineReader, ServerMessage, encode_line, try_decode};
use kiva_util::endpoint::TcpEndpoint;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::config::ClientConfig;

const READ_CHUNK_BYTES: usize = 4096;
const LOG_PREVIEW_CHARS: usize = 120;

/// What the receive loop hands to the dispatcher, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
	Message(ServerMessage),
	/// The receive loop ended and the connection was released.
	Disconnected { reason: String },
}

#[derive(Debug)]
struct LiveConnection {
	generation: u64,
	writer: OwnedWriteHalf,
	reader_task: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<LiveConnection>>>;

/// Owns the socket. At most one live connection and one receive loop at a time.
#[derive(Debug)]
pub struct ConnectionManager {
	slot: Slot,
	endpoint: parking_lot::Mutex<TcpEndpoint>,
	connect_timeout: Duration,
	max_line_bytes: usize,
	inbound_tx: mpsc::Sender<InboundEvent>,
	generation: AtomicU64,
}

impl ConnectionManager {
	pub fn new(config: &ClientConfig, inbound_tx: mpsc::Sender<InboundEvent>) -> Self {
		Self {
			slot: Arc::new(Mutex::new(None)),
			endpoint: parking_lot::Mutex::new(config.endpoint()),
			connect_timeout: config.connect_timeout,
			max_line_bytes: config.max_line_bytes,
			inbound_tx,
			generation: AtomicU64::new(0),
		}
	}

	/// Manager plus the receiving end of its inbound queue.
	pub fn with_channel(config: &ClientConfig) -> (Self, mpsc::Receiver<InboundEvent>) {
		let (tx, rx) = mpsc::channel(config.inbound_queue_capacity.max(1));
		(Self::new(config, tx), rx)
	}

	/// Last endpoint used (or configured).
	pub fn endpoint(&self) -> TcpEndpoint {
		self.endpoint.lock().clone()
	}

	pub async fn is_connected(&self) -> bool {
		self.slot.lock().await.is_some()
	}

	/// Connect to the last known endpoint. No-op if already connected.
	pub async fn connect(&self) -> Result<(), ClientError> {
		let endpoint = self.endpoint();
		self.connect_to(endpoint).await
	}

	/// Connect to `endpoint`, which becomes the endpoint for later reconnects.
	/// No-op if already connected.
	pub async fn connect_to(&self, endpoint: TcpEndpoint) -> Result<(), ClientError> {
		let mut slot = self.slot.lock().await;
		if slot.is_some() {
			debug!("connect: already connected");
			return Ok(());
		}

		*self.endpoint.lock() = endpoint.clone();
		let conn = self.open(&endpoint).await?;
		*slot = Some(conn);
		Ok(())
	}

	/// Write one frame, reconnecting first if there is no live connection.
	///
	/// A write error releases the connection so the next send reconnects.
	pub async fn send(&self, line: &str) -> Result<(), ClientError> {
		let mut slot = self.slot.lock().await;

		let mut conn = match slot.take() {
			Some(conn) => conn,
			None => {
				let endpoint = self.endpoint();
				debug!(endpoint = %endpoint, "send: no connection, reconnecting");
				self.open(&endpoint)
					.await
					.map_err(|e| ClientError::NotConnected(e.to_string()))?
			}
		};

		let bytes = encode_line(line);
		match conn.writer.write_all(&bytes).await {
			Ok(()) => {
				debug!(bytes = bytes.len(), frame = %preview(line), "frame sent");
				*slot = Some(conn);
				Ok(())
			}
			Err(e) => {
				warn!(error = %e, generation = conn.generation, "write failed; closing connection");
				conn.reader_task.abort();
				Err(ClientError::Io(e.to_string()))
			}
		}
	}

	/// Drop the live connection, if any. The receive loop is stopped without
	/// reporting a disconnect.
	pub async fn close(&self) {
		if let Some(conn) = self.slot.lock().await.take() {
			conn.reader_task.abort();
			info!(generation = conn.generation, "connection closed");
		}
	}

	// Caller holds the slot lock, so the new receive loop cannot clear the
	// slot before the connection is stored in it.
	async fn open(&self, endpoint: &TcpEndpoint) -> Result<LiveConnection, ClientError> {
		let hostport = endpoint.hostport();
		let connect_timeout = self.connect_timeout;

		let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(hostport.as_str())).await {
			Ok(Ok(stream)) => stream,
			Ok(Err(e)) => return Err(ClientError::Connect(format!("connect failed ({hostport}): {e}"))),
			Err(_) => {
				return Err(ClientError::Connect(format!(
					"connect timeout after {connect_timeout:?} ({hostport})"
				)));
			}
		};

		if let Err(e) = stream.set_nodelay(true) {
			debug!(error = %e, "set_nodelay failed");
		}

		let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
		let remote = stream.peer_addr().map(|a| a.to_string()).unwrap_or(hostport);
		info!(remote = %remote, generation, "connected");

		let (reader, writer) = stream.into_split();
		let reader_task = tokio::spawn(receive_loop(
			reader,
			self.max_line_bytes,
			self.inbound_tx.clone(),
			Arc::clone(&self.slot),
			generation,
		));

		Ok(LiveConnection {
			generation,
			writer,
			reader_task,
		})
	}
}

#[cfg(test)]
impl ConnectionManager {
	/// Half-close the live writer so the next write fails while the receive
	/// loop keeps running.
	pub(crate) async fn shutdown_writer(&self) -> std::io::Result<()> {
		if let Some(conn) = self.slot.lock().await.as_mut() {
			conn.writer.shutdown().await?;
		}
		Ok(())
	}
}

async fn receive_loop(
	mut reader: OwnedReadHalf,
	max_line_bytes: usize,
	tx: mpsc::Sender<InboundEvent>,
	slot: Slot,
	generation: u64,
) {
	let mut frames = LineReader::new(max_line_bytes);
	let reason = read_frames(&mut reader, &mut frames, &tx).await;

	let discarded = frames.discard_partial();
	if discarded > 0 {
		debug!(bytes = discarded, "discarded unterminated trailing frame");
	}
	drop(reader);

	{
		let mut slot = slot.lock().await;
		if slot.as_ref().is_some_and(|c| c.generation == generation) {
			*slot = None;
		}
	}

	info!(generation, reason = %reason, "receive loop ended");
	if tx.send(InboundEvent::Disconnected { reason }).await.is_err() {
		debug!("inbound queue closed; disconnect not reported");
	}
}

async fn read_frames(reader: &mut OwnedReadHalf, frames: &mut LineReader, tx: &mpsc::Sender<InboundEvent>) -> String {
	let mut tmp = [0u8; READ_CHUNK_BYTES];

	loop {
		let n = match reader.read(&mut tmp).await {
			Ok(0) => return "connection closed by server".to_string(),
			Ok(n) => n,
			Err(e) => return format!("read error: {e}"),
		};

		frames.push(&tmp[..n]);

		for line in frames.lines() {
			let line = match line {
				Ok(line) => line,
				Err(e) => {
					warn!(error = %e, "framing error; closing connection");
					return e.to_string();
				}
			};

			let msg = decode_frame(line);
			if tx.send(InboundEvent::Message(msg)).await.is_err() {
				return "inbound queue closed".to_string();
			}
		}
	}
}

fn decode_frame(line: String) -> ServerMessage {
	match try_decode(&line) {
		Ok(msg) => {
			debug!(kind = msg.kind(), "frame decoded");
			msg
		}
		Err(e @ DecodeError::Malformed { .. }) => {
			warn!(error = %e, frame = %preview(&line), "malformed frame");
			ServerMessage::Unrecognized { raw: line }
		}
		Err(e @ DecodeError::UnknownTag { .. }) => {
			debug!(error = %e, "unrecognized frame");
			ServerMessage::Unrecognized { raw: line }
		}
	}
}

// Frames can hold whole images; keep log lines short.
fn preview(line: &str) -> String {
	if line.chars().count() <= LOG_PREVIEW_CHARS {
		return line.to_string();
	}
	let mut out: String = line.chars().take(LOG_PREVIEW_CHARS).collect();
	out.push_str("...");
	out
}
