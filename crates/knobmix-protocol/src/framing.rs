//! Line framing over a byte stream.
//!
//! Lines end with `\r` or `\n`. A `\r\n` pair produces one line: the empty
//! line between the two terminators is skipped, as is any blank line.
//!
//! ```text
//! "KNOBMIX:HELLO\n1|2|3\r4|5|6\r\n" -> ["KNOBMIX:HELLO", "1|2|3", "4|5|6"]
//! ```
//!
//! A line longer than the limit is reported once, and the rest of it, up to
//! its terminator, is skipped.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::MAX_LINE_LENGTH;
use crate::error::{ProtocolError, ProtocolResult};

/// Strips trailing carriage returns and newlines.
pub fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Reads terminated lines from, and writes lines to, a duplex byte stream.
///
/// [`LineStream::read_line`] is cancel-safe: bytes of a partially received
/// line are kept across calls, so it can be raced against a timer or a
/// shutdown signal without losing data.
pub struct LineStream<S> {
    inner: BufReader<S>,
    pending: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl<S> LineStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with the default maximum line length.
    pub fn new(stream: S) -> Self {
        Self::with_max_len(stream, MAX_LINE_LENGTH)
    }

    /// Wraps a stream with a custom maximum line length.
    pub fn with_max_len(stream: S, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(stream),
            pending: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Reads the next non-empty line, without its terminator.
    ///
    /// Returns `Ok(None)` on end of stream. A final unterminated line is
    /// returned before `None`. Invalid UTF-8 is replaced lossily.
    pub async fn read_line(&mut self) -> ProtocolResult<Option<String>> {
        loop {
            let (consumed, complete) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(self.take_pending()));
                }
                let terminator = available.iter().position(|b| matches!(b, b'\r' | b'\n'));
                if self.discarding {
                    let consumed = match terminator {
                        Some(pos) => {
                            self.discarding = false;
                            pos + 1
                        }
                        None => available.len(),
                    };
                    self.inner.consume(consumed);
                    continue;
                }
                match terminator {
                    Some(pos) => {
                        self.pending.extend_from_slice(&available[..pos]);
                        (pos + 1, true)
                    }
                    None => {
                        self.pending.extend_from_slice(available);
                        (available.len(), false)
                    }
                }
            };
            self.inner.consume(consumed);

            if self.pending.len() > self.max_len {
                let length = self.pending.len();
                self.pending.clear();
                self.discarding = !complete;
                return Err(ProtocolError::LineTooLong {
                    length,
                    max: self.max_len,
                });
            }

            if complete && !self.pending.is_empty() {
                return Ok(Some(self.take_pending()));
            }
        }
    }

    /// Writes `line` followed by `\n` and flushes.
    pub async fn write_line(&mut self, line: &str) -> ProtocolResult<()> {
        let stream = self.inner.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        Ok(())
    }

    fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn splits_on_both_terminators() {
        let (mut device, host) = duplex(256);
        device
            .write_all(b"KNOBMIX:HELLO\n1|2|3\r4|5|6\r\n")
            .await
            .unwrap();
        drop(device);

        let mut stream = LineStream::new(host);
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("KNOBMIX:HELLO"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("1|2|3"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("4|5|6"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn skips_blank_lines() {
        let (mut device, host) = duplex(64);
        device.write_all(b"\r\n\n\ra\r\r\nb\n").await.unwrap();
        drop(device);

        let mut stream = LineStream::new(host);
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn returns_unterminated_tail_at_eof() {
        let (mut device, host) = duplex(64);
        device.write_all(b"1|2\rpartial").await.unwrap();
        drop(device);

        let mut stream = LineStream::new(host);
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("1|2"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("partial"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_split_across_writes() {
        let (mut device, host) = duplex(64);
        let mut stream = LineStream::new(host);

        device.write_all(b"10|2").await.unwrap();
        let read = tokio::spawn(async move {
            let line = stream.read_line().await.unwrap();
            (line, stream)
        });
        tokio::task::yield_now().await;
        device.write_all(b"0|30\r").await.unwrap();

        let (line, _stream) = read.await.unwrap();
        assert_eq!(line.as_deref(), Some("10|20|30"));
    }

    #[tokio::test]
    async fn partial_line_survives_cancellation() {
        let (mut device, host) = duplex(64);
        let mut stream = LineStream::new(host);

        device.write_all(b"KNOB").await.unwrap();
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            stream.read_line(),
        )
        .await;
        assert!(timed_out.is_err());

        device.write_all(b"MIX:PING\n").await.unwrap();
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("KNOBMIX:PING"));
    }

    #[tokio::test]
    async fn rejects_overlong_line() {
        let (mut device, host) = duplex(1024);
        device.write_all(&[b'7'; 40]).await.unwrap();
        device.write_all(b"\r1|2\r").await.unwrap();
        drop(device);

        let mut stream = LineStream::with_max_len(host, 16);
        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { max: 16, .. }));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("1|2"));
    }

    #[tokio::test]
    async fn overlong_tail_in_later_write_is_skipped() {
        let (mut device, host) = duplex(256);
        let mut stream = LineStream::with_max_len(host, 16);

        device.write_all(b"GARBAGEGARBAGEGARBAGE").await.unwrap();
        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { length: 21, max: 16 }));

        device.write_all(b"1|2|3\r4|5|6\r").await.unwrap();
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("4|5|6"));
    }

    #[tokio::test]
    async fn overlong_terminated_line_keeps_next() {
        let (mut device, host) = duplex(256);
        device.write_all(&[b'9'; 20]).await.unwrap();
        device.write_all(b"\n1|2\r").await.unwrap();
        drop(device);

        let mut stream = LineStream::with_max_len(host, 16);
        assert!(stream.read_line().await.is_err());
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("1|2"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_line_appends_newline() {
        let (mut device, host) = duplex(64);
        let mut stream = LineStream::new(host);

        stream.write_line("KNOBMIX:READY").await.unwrap();

        let mut buf = [0u8; 14];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"KNOBMIX:READY\n");
    }

    #[test]
    fn trims_line_endings() {
        assert_eq!(trim_line_end("1|2|3\r"), "1|2|3");
        assert_eq!(trim_line_end("1|2|3\r\n"), "1|2|3");
        assert_eq!(trim_line_end("1|2|3"), "1|2|3");
    }
}
