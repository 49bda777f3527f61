//! Incremental decoder for the relayed event stream
//!
//! The relayed byte stream is UTF-8 text framed in the common
//! text-event-stream convention: increments separated by a blank line,
//! each line optionally prefixed with `data: `, and a literal `[DONE]`
//! increment marking logical completion. Network chunk boundaries fall
//! anywhere, including inside a multi-byte UTF-8 character or inside
//! the blank-line delimiter itself, so the decoder carries partial
//! bytes and partial increments across `push` calls.

/// Literal increment marking logical end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Chunk-boundary-invariant event stream decoder
///
/// Feed raw network chunks with [`StreamDecoder::push`]; complete
/// increments come back in arrival order. After the sentinel is seen,
/// all further input is ignored.
///
/// # Examples
///
/// ```
/// use chatrelay::stream::StreamDecoder;
///
/// let mut decoder = StreamDecoder::new();
/// let increments = decoder.push(b"data: hello\n\ndata: [DONE]\n\nignored");
/// assert_eq!(increments, vec!["hello".to_string()]);
/// assert!(decoder.is_done());
/// ```
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Carry for an incomplete UTF-8 sequence split across chunks
    bytes: Vec<u8>,
    /// Carry for an incomplete increment split across chunks
    text: String,
    /// Sentinel seen; everything after is discarded
    done: bool,
}

impl StreamDecoder {
    /// Create a fresh decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the completion sentinel has been observed
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk, returning the complete increments it
    /// finished
    ///
    /// Empty increments are skipped; the sentinel increment is consumed
    /// (never returned) and terminates decoding.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.bytes.extend_from_slice(chunk);
        let decoded = self.drain_utf8();
        self.text.push_str(&decoded);

        let mut increments = Vec::new();
        while let Some((pos, delimiter_len)) = find_delimiter(&self.text) {
            let block = self.text[..pos].to_string();
            self.text.drain(..pos + delimiter_len);
            match parse_increment(&block) {
                Increment::Sentinel => {
                    self.done = true;
                    self.text.clear();
                    self.bytes.clear();
                    return increments;
                }
                Increment::Payload(payload) => increments.push(payload),
                Increment::Empty => {}
            }
        }
        increments
    }

    /// Flush the trailing partial increment at end of stream
    ///
    /// Transport-level stream closure without a sentinel is legal; any
    /// buffered partial increment is treated as complete. An incomplete
    /// trailing UTF-8 sequence is dropped.
    pub fn finish(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        self.bytes.clear();
        let remainder = std::mem::take(&mut self.text);
        if remainder.is_empty() {
            return None;
        }
        match parse_increment(&remainder) {
            Increment::Sentinel => {
                self.done = true;
                None
            }
            Increment::Payload(payload) => Some(payload),
            Increment::Empty => None,
        }
    }

    /// Decode the maximal valid UTF-8 prefix of the byte carry
    ///
    /// An incomplete trailing sequence stays in the carry for the next
    /// chunk; an invalid sequence is replaced with U+FFFD so a corrupt
    /// byte never wedges the stream.
    fn drain_utf8(&mut self) -> String {
        let mut out = String::new();
        let mut input = std::mem::take(&mut self.bytes);
        loop {
            match std::str::from_utf8(&input) {
                Ok(s) => {
                    out.push_str(s);
                    input.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&input[..valid]) {
                        out.push_str(prefix);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push('\u{FFFD}');
                            input.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence: carry it forward.
                            input.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        self.bytes = input;
        out
    }
}

/// Find the earliest blank-line delimiter, LF or CRLF framed
///
/// Returns the delimiter's byte position and length. When a CRLF
/// delimiter starts before any LF one, it wins so the carriage returns
/// are consumed with it rather than leaking into the next block.
fn find_delimiter(text: &str) -> Option<(usize, usize)> {
    let lf = text.find("\n\n");
    let crlf = text.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(l), Some(c)) if c < l => Some((c, 4)),
        (Some(l), _) => Some((l, 2)),
        (None, Some(c)) => Some((c, 4)),
        (None, None) => None,
    }
}

/// Classification of one framed increment
enum Increment {
    /// The literal `[DONE]` completion marker
    Sentinel,
    /// Increment content
    Payload(String),
    /// Nothing left after prefix stripping
    Empty,
}

/// Parse one increment block (the text between blank-line delimiters)
///
/// A leading `data: ` prefix is stripped from each line and the
/// remaining lines are rejoined with newlines, reconstituting
/// multi-line payloads.
fn parse_increment(block: &str) -> Increment {
    let mut lines = Vec::new();
    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let value = line
            .strip_prefix("data: ")
            .or_else(|| line.strip_prefix("data:"))
            .unwrap_or(line);
        lines.push(value);
    }
    let payload = lines.join("\n");
    if payload.trim() == DONE_SENTINEL {
        Increment::Sentinel
    } else if payload.is_empty() {
        Increment::Empty
    } else {
        Increment::Payload(payload)
    }
}
