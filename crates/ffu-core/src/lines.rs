//! Line splitting for streamed process output.
//!
//! Updater tools redraw progress bars with bare carriage returns, so `\r`
//! terminates a line just like `\n`. Bytes that are not valid UTF-8 are
//! replaced rather than rejected.

use std::io::{ErrorKind, Read};

use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;

/// Incremental splitter that turns byte chunks into trimmed, non-blank lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every line it terminates.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush an unterminated trailing fragment.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

/// Read `reader` to EOF, sending each line to `tx`.
///
/// Blocking; run it on a blocking thread. Stops early without error if the
/// receiving side has gone away.
pub fn pump_lines<R: Read>(mut reader: R, tx: mpsc::Sender<String>) -> std::io::Result<()> {
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for line in splitter.push(&buf[..n]) {
            if tx.blocking_send(line).is_err() {
                return Ok(());
            }
        }
    }

    if let Some(line) = splitter.finish() {
        let _ = tx.blocking_send(line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_newlines_and_carriage_returns() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"first\nsecond\r\nthird\r10.0 KiB\r20.0 KiB\n");
        assert_eq!(lines, vec!["first", "second", "third", "10.0 KiB", "20.0 KiB"]);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_lines_spanning_chunks() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"===== Processing ").is_empty());
        let lines = splitter.push(b"device: dev1\nLog ");
        assert_eq!(lines, vec!["===== Processing device: dev1"]);
        assert_eq!(splitter.finish().as_deref(), Some("Log"));
    }

    #[test]
    fn test_blank_lines_are_skipped_and_text_trimmed() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"\n\n   \n  padded line  \n");
        assert_eq!(lines, vec!["padded line"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"bad \xff byte\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("bad "));
        assert!(lines[0].ends_with(" byte"));
    }

    #[test]
    fn test_pump_flushes_unterminated_tail() {
        let (tx, mut rx) = mpsc::channel(16);
        let input: &[u8] = b"Upload completed successfully\nFlash process completed for dev1";
        pump_lines(input, tx).unwrap();

        assert_eq!(rx.blocking_recv().as_deref(), Some("Upload completed successfully"));
        assert_eq!(rx.blocking_recv().as_deref(), Some("Flash process completed for dev1"));
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_pump_stops_when_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let input: &[u8] = b"one\ntwo\nthree\n";
        assert!(pump_lines(input, tx).is_ok());
    }
}
