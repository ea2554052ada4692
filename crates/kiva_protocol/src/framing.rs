#![forbid(unsafe_code)]

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Byte that ends every frame on the wire.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Default maximum length of one buffered frame.
///
/// Image frames carry a whole base64 file, so this is generous.
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},
}

/// Encode one protocol line (terminator appended).
pub fn encode_line(line: &str) -> Vec<u8> {
	let mut out = Vec::with_capacity(line.len() + 1);
	out.extend_from_slice(line.as_bytes());
	out.push(FRAME_TERMINATOR);
	out
}

/// Append an encoded line into the provided buffer.
pub fn encode_line_into(buf: &mut BytesMut, line: &str) {
	buf.reserve(line.len() + 1);
	buf.put_slice(line.as_bytes());
	buf.put_u8(FRAME_TERMINATOR);
}

/// Try to take one complete, non-blank line from a growable buffer.
///
/// Blank (whitespace-only) lines are consumed and skipped. Incomplete
/// trailing data stays in `buf`. Returned lines are trimmed and decoded
/// as UTF-8, replacing invalid sequences.
pub fn try_decode_line_from_buffer(buf: &mut BytesMut, max_line_bytes: usize) -> Result<Option<String>, FramingError> {
	let mut scanned = 0;
	take_line(buf, max_line_bytes, &mut scanned)
}

// `scanned` is how many leading bytes of `buf` are known to hold no
// terminator; it is reset whenever a frame is split off.
fn take_line(buf: &mut BytesMut, max_line_bytes: usize, scanned: &mut usize) -> Result<Option<String>, FramingError> {
	loop {
		let start = (*scanned).min(buf.len());
		let Some(pos) = buf[start..].iter().position(|b| *b == FRAME_TERMINATOR).map(|i| start + i) else {
			*scanned = buf.len();
			if buf.len() > max_line_bytes {
				return Err(FramingError::FrameTooLarge {
					len: buf.len(),
					max: max_line_bytes,
				});
			}
			return Ok(None);
		};

		if pos > max_line_bytes {
			*scanned = pos;
			return Err(FramingError::FrameTooLarge {
				len: pos,
				max: max_line_bytes,
			});
		}

		let frame = buf.split_to(pos + 1);
		*scanned = 0;
		let line = decode_text(&frame[..pos]);
		if line.is_empty() {
			continue;
		}
		return Ok(Some(line));
	}
}

fn decode_text(raw: &[u8]) -> String {
	match std::str::from_utf8(raw) {
		Ok(s) => s.trim().to_string(),
		Err(_) => String::from_utf8_lossy(raw).trim().to_string(),
	}
}

/// Accumulates raw socket reads and yields complete frames.
#[derive(Debug)]
pub struct LineReader {
	buf: BytesMut,
	max_line_bytes: usize,
	scanned: usize,
}

impl Default for LineReader {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_LINE_BYTES)
	}
}

impl LineReader {
	pub fn new(max_line_bytes: usize) -> Self {
		Self {
			buf: BytesMut::with_capacity(8 * 1024),
			max_line_bytes,
			scanned: 0,
		}
	}

	/// Append freshly read bytes.
	pub fn push(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	/// Next complete frame, if one is buffered.
	///
	/// Bytes already searched for a terminator are not searched again.
	pub fn next_line(&mut self) -> Result<Option<String>, FramingError> {
		take_line(&mut self.buf, self.max_line_bytes, &mut self.scanned)
	}

	/// Lazily drain every complete frame currently buffered.
	pub fn lines(&mut self) -> Lines<'_> {
		Lines {
			reader: self,
			failed: false,
		}
	}

	/// Bytes held back waiting for a terminator.
	pub fn buffered_len(&self) -> usize {
		self.buf.len()
	}

	/// Drop an unterminated trailing frame (stream ended). Returns the
	/// number of bytes discarded.
	pub fn discard_partial(&mut self) -> usize {
		let n = self.buf.len();
		self.buf.clear();
		self.scanned = 0;
		n
	}
}

/// Iterator returned by [`LineReader::lines`]. Stops after the first error.
pub struct Lines<'a> {
	reader: &'a mut LineReader,
	failed: bool,
}

impl Iterator for Lines<'_> {
	type Item = Result<String, FramingError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}
		match self.reader.next_line() {
			Ok(Some(line)) => Some(Ok(line)),
			Ok(None) => None,
			Err(e) => {
				self.failed = true;
				Some(Err(e))
			}
		}
	}
}
