//! Shared helpers
//!
//! Helpers shared by the codec and the engine: a bounds-checked reader for
//! untrusted datagrams, hex formatting for diagnostics, and traffic counters.
//!
//! # Example
//!
//! ```
//! use echonet_rs::util::Buffer;
//!
//! let mut buffer = Buffer::new(&[0x10, 0x81, 0x00, 0x01]);
//! assert_eq!(buffer.read_u8(), Some(0x10));
//! assert_eq!(buffer.read_u8(), Some(0x81));
//! assert_eq!(buffer.read_u16(), Some(1));
//! assert_eq!(buffer.read_u8(), None);
//! ```

#[macro_use]
pub mod enum_macros;

use std::fmt::Write;

/// Forward-only reader over a byte slice.
///
/// Reads split off the front of the unread slice and return `None` when it
/// is too short, so a corrupt length field can never index past the end of
/// the datagram.
pub struct Buffer<'a> {
    rest: &'a [u8],
    consumed: usize,
}

impl<'a> Buffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            rest: data,
            consumed: 0,
        }
    }

    /// Unread byte count
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Take the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.rest.len() < n {
            return None;
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        self.consumed += n;
        Some(head)
    }

    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.read_bytes(N)?.try_into().ok()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    /// Big-endian, as every ECHONET Lite multi-byte field
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_array::<2>().map(u16::from_be_bytes)
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.consumed
    }
}

/// Classic 16-bytes-per-row dump (offset, hex columns, printable ASCII),
/// every row starting with `prefix`
pub fn hex_dump(data: &[u8], prefix: &str) -> String {
    let mut out = String::new();

    for (row, chunk) in data.chunks(16).enumerate() {
        let mut columns = String::with_capacity(49);
        for (i, byte) in chunk.iter().enumerate() {
            if i == 8 {
                columns.push(' ');
            }
            let _ = write!(columns, "{:02X} ", byte);
        }
        let printable: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();

        let _ = writeln!(
            out,
            "{}{:04X}: {:<49} |{}|",
            prefix,
            row * 16,
            columns,
            printable
        );
    }

    out
}

/// Property data as lowercase hex, `-` when empty.
pub fn edt_hex(data: &[u8]) -> String {
    if data.is_empty() {
        "-".to_string()
    } else {
        hex::encode(data)
    }
}

/// Per-engine traffic counters
pub mod statistics {
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Traffic counters for one request engine.
    ///
    /// Updated from the receive task and from callers concurrently, so every
    /// counter is atomic.
    #[derive(Debug, Default)]
    pub struct CommunicationStats {
        messages_sent: AtomicU64,
        messages_received: AtomicU64,
        bytes_sent: AtomicU64,
        bytes_received: AtomicU64,
        discarded: AtomicU64,
        errors: AtomicU64,
        timeouts: AtomicU64,
        rejections: AtomicU64,
    }

    /// Point-in-time copy of [`CommunicationStats`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct StatsSnapshot {
        pub messages_sent: u64,
        pub messages_received: u64,
        pub bytes_sent: u64,
        pub bytes_received: u64,
        pub discarded: u64,
        pub errors: u64,
        pub timeouts: u64,
        pub rejections: u64,
    }

    impl CommunicationStats {
        /// Create new statistics
        pub fn new() -> Self {
            Self::default()
        }

        /// Record a sent datagram
        pub fn record_sent(&self, bytes: usize) {
            self.messages_sent.fetch_add(1, Ordering::Relaxed);
            self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        }

        /// Record a received datagram
        pub fn record_received(&self, bytes: usize) {
            self.messages_received.fetch_add(1, Ordering::Relaxed);
            self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        }

        /// Record a datagram that matched no pending transaction or did not decode
        pub fn record_discarded(&self) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }

        /// Record a transport error
        pub fn record_error(&self) {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        /// Record a timeout
        pub fn record_timeout(&self) {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        /// Record a protocol-level rejection
        pub fn record_rejection(&self) {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }

        pub fn snapshot(&self) -> StatsSnapshot {
            StatsSnapshot {
                messages_sent: self.messages_sent.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
                bytes_received: self.bytes_received.load(Ordering::Relaxed),
                discarded: self.discarded.load(Ordering::Relaxed),
                errors: self.errors.load(Ordering::Relaxed),
                timeouts: self.timeouts.load(Ordering::Relaxed),
                rejections: self.rejections.load(Ordering::Relaxed),
            }
        }
    }

    impl StatsSnapshot {
        /// Share of sent requests that neither timed out nor failed, in percent
        pub fn success_rate(&self) -> f64 {
            if self.messages_sent == 0 {
                return 100.0;
            }
            let failures = self.errors + self.timeouts + self.rejections;
            let succeeded = self.messages_sent.saturating_sub(failures);
            succeeded as f64 * 100.0 / self.messages_sent as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::statistics::CommunicationStats;
    use super::*;

    #[test]
    fn test_buffer_stops_at_end() {
        let data = [0x01, 0x02, 0x03];
        let mut buffer = Buffer::new(&data);
        assert_eq!(buffer.read_array::<2>(), Some([0x01, 0x02]));
        assert_eq!(buffer.remaining(), 1);
        assert!(buffer.read_bytes(2).is_none());
        assert_eq!(buffer.position(), 2);
        assert_eq!(buffer.read_u8(), Some(0x03));
        assert!(buffer.read_u16().is_none());
    }

    #[test]
    fn test_hex_dump_format() {
        let dump = hex_dump(&[0x10, 0x81, 0x41], "  ");
        assert!(dump.starts_with("  0000: 10 81 41"));
        assert!(dump.trim_end().ends_with("|..A|"));
    }

    #[test]
    fn test_edt_hex() {
        assert_eq!(edt_hex(&[]), "-");
        assert_eq!(edt_hex(&[0x30, 0x1a]), "301a");
    }

    #[test]
    fn test_stats_success_rate() {
        let stats = CommunicationStats::new();
        assert_eq!(stats.snapshot().success_rate(), 100.0);

        for _ in 0..4 {
            stats.record_sent(14);
        }
        stats.record_timeout();
        stats.record_received(16);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bytes_sent, 56);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.success_rate(), 75.0);
    }
}
