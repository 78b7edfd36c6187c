use std::{
    io,
    sync::{Mutex, PoisonError},
};

use tracing::{debug, error};

use crate::transport::MetricSink;

/// Practical ceiling for a UDP payload before IP fragmentation sets in.
pub(crate) const OPTIMAL_PAYLOAD_LEN: usize = 65_467;

/// Number of queued lines that forces a flush.
pub(crate) const MAX_BUFFERED_COMMANDS: usize = 50;

/// Accumulates formatted metric lines until enough are queued to fill packets.
///
/// All queue mutation is serialized through one mutex: the append, the capacity
/// check, and the swap that starts an overflow flush. Packets are assembled and sent
/// from a swapped-out snapshot, so the lock is never held across network I/O and
/// concurrent producers only ever contend on the queue itself.
pub(crate) struct CommandBuffer {
    lines: Mutex<Vec<String>>,
    max_commands: usize,
    max_payload_len: usize,
}

impl CommandBuffer {
    pub fn new(max_commands: usize, max_payload_len: usize) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            max_commands: max_commands.max(1),
            max_payload_len,
        }
    }

    /// Queues one line, flushing the whole queue through `sink` if this append fills
    /// it. Returns the number of bytes sent, which is zero unless the append
    /// triggered the overflow flush.
    pub fn submit(&self, sink: &dyn MetricSink, line: String) -> io::Result<usize> {
        let snapshot = {
            let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
            lines.push(line);
            if lines.len() < self.max_commands {
                return Ok(0);
            }
            std::mem::take(&mut *lines)
        };

        self.send_snapshot(sink, &snapshot)
    }

    /// Drains and transmits everything currently queued.
    pub fn flush(&self, sink: &dyn MetricSink) -> io::Result<usize> {
        let snapshot = {
            let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *lines)
        };
        if snapshot.is_empty() {
            return Ok(0);
        }

        self.send_snapshot(sink, &snapshot)
    }

    /// Packs `snapshot` into newline-delimited payloads no larger than the configured
    /// limit and sends them. A line longer than the limit by itself still goes out,
    /// alone, as one oversized payload; lines are never split. A failed send drops
    /// only its own payload, the rest are still attempted, and the first failure is
    /// reported once the snapshot is exhausted.
    fn send_snapshot(&self, sink: &dyn MetricSink, snapshot: &[String]) -> io::Result<usize> {
        let mut packet: Vec<u8> = Vec::new();
        let mut bytes_sent = 0;
        let mut packets_sent = 0;
        let mut first_error = None;

        let mut transmit = |packet: &mut Vec<u8>| {
            match sink.send(packet) {
                Ok(sent) => {
                    bytes_sent += sent;
                    packets_sent += 1;
                }
                Err(e) => {
                    error!(error = %e, payload_len = packet.len(), "Failed to send metric payload.");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
            packet.clear();
        };

        for line in snapshot {
            if !packet.is_empty() && packet.len() + line.len() + 1 > self.max_payload_len {
                transmit(&mut packet);
            }
            packet.extend_from_slice(line.as_bytes());
            packet.push(b'\n');
        }

        // The final partial payload always goes out, so a flush of a non-empty queue
        // ends with at least one send.
        transmit(&mut packet);

        debug!(lines = snapshot.len(), packets_sent, bytes_sent, "Flushed metric buffer.");

        match first_error {
            Some(e) => Err(e),
            None => Ok(bytes_sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use proptest::{collection::vec as arb_vec, prelude::*};

    use super::{CommandBuffer, MAX_BUFFERED_COMMANDS, OPTIMAL_PAYLOAD_LEN};
    use crate::transport::test_support::{FlakySink, RecordingSink};

    #[test]
    fn appends_below_capacity_do_not_transmit() {
        let sink = RecordingSink::default();
        let buffer = CommandBuffer::new(MAX_BUFFERED_COMMANDS, OPTIMAL_PAYLOAD_LEN);

        for i in 0..MAX_BUFFERED_COMMANDS - 1 {
            let sent = buffer.submit(&sink, format!("m{i}:1|c")).unwrap();
            assert_eq!(sent, 0);
        }
        assert!(sink.payloads().is_empty());
    }

    #[test]
    fn filling_the_queue_triggers_a_flush_and_empties_it() {
        let sink = RecordingSink::default();
        let buffer = CommandBuffer::new(MAX_BUFFERED_COMMANDS, OPTIMAL_PAYLOAD_LEN);

        for i in 0..MAX_BUFFERED_COMMANDS - 1 {
            buffer.submit(&sink, format!("m{i}:1|c")).unwrap();
        }
        let sent = buffer.submit(&sink, "last:1|c".to_string()).unwrap();

        assert!(sent > 0);
        assert!(!sink.payloads().is_empty());
        assert_eq!(sink.lines().len(), MAX_BUFFERED_COMMANDS);

        // Queue is empty again afterwards.
        assert_eq!(buffer.flush(&sink).unwrap(), 0);
        assert_eq!(sink.lines().len(), MAX_BUFFERED_COMMANDS);
    }

    #[test]
    fn flush_on_an_empty_queue_sends_nothing() {
        let sink = RecordingSink::default();
        let buffer = CommandBuffer::new(MAX_BUFFERED_COMMANDS, OPTIMAL_PAYLOAD_LEN);

        assert_eq!(buffer.flush(&sink).unwrap(), 0);
        assert!(sink.payloads().is_empty());
    }

    #[test]
    fn packets_stay_under_the_payload_limit() {
        let sink = RecordingSink::default();
        let buffer = CommandBuffer::new(100, 64);

        for i in 0..40 {
            buffer.submit(&sink, format!("metric_number_{i}:1|c")).unwrap();
        }
        buffer.flush(&sink).unwrap();

        let payloads = sink.payloads();
        assert!(payloads.len() > 1);
        for payload in &payloads {
            assert!(payload.len() <= 64, "payload of {} bytes", payload.len());
        }
        assert_eq!(sink.lines().len(), 40);
    }

    #[test]
    fn an_oversized_line_goes_out_alone() {
        let sink = RecordingSink::default();
        let buffer = CommandBuffer::new(100, 64);

        let oversized = format!("{}:1|c", "x".repeat(100));
        buffer.submit(&sink, "small:1|c".to_string()).unwrap();
        buffer.submit(&sink, oversized.clone()).unwrap();
        buffer.submit(&sink, "small2:1|c".to_string()).unwrap();
        buffer.flush(&sink).unwrap();

        let payloads = sink.payloads();
        let big: Vec<_> = payloads.iter().filter(|p| p.len() > 64).collect();
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].as_slice(), format!("{oversized}\n").as_bytes());
        assert_eq!(sink.lines().len(), 3);
    }

    #[test]
    fn a_failed_send_drops_only_its_own_packet() {
        let sink = FlakySink::failing(1);
        let buffer = CommandBuffer::new(100, 32);

        for i in 0..10 {
            buffer.submit(&sink, format!("some_metric_{i}:1|c")).unwrap();
        }
        let err = buffer.flush(&sink).unwrap_err();
        assert_eq!(err.to_string(), "sink offline");

        // Everything after the failed first packet still arrived.
        assert!(!sink.inner.payloads().is_empty());
        assert!(sink.inner.lines().len() < 10);
    }

    #[test]
    fn concurrent_producers_lose_no_lines() {
        let threads = 8_usize;
        let lines_per_thread = 250_usize;

        let sink = Arc::new(RecordingSink::default());
        let buffer = Arc::new(CommandBuffer::new(MAX_BUFFERED_COMMANDS, OPTIMAL_PAYLOAD_LEN));

        thread::scope(|scope| {
            for t in 0..threads {
                let sink = Arc::clone(&sink);
                let buffer = Arc::clone(&buffer);
                scope.spawn(move || {
                    for i in 0..lines_per_thread {
                        buffer.submit(sink.as_ref(), format!("t{t}.m{i}:1|c")).unwrap();
                    }
                });
            }
        });
        buffer.flush(sink.as_ref()).unwrap();

        let mut lines = sink.lines();
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), threads * lines_per_thread);
    }

    proptest! {
        #[test]
        fn no_multi_line_packet_exceeds_the_limit(
            max_payload_len in 16usize..256,
            line_lens in arb_vec(1usize..192, 1..128),
        ) {
            let sink = RecordingSink::default();
            let buffer = CommandBuffer::new(line_lens.len() + 1, max_payload_len);

            for len in &line_lens {
                buffer.submit(&sink, "x".repeat(*len)).unwrap();
            }
            buffer.flush(&sink).unwrap();

            let mut total_lines = 0;
            for payload in sink.payloads() {
                let lines = payload.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count();
                total_lines += lines;
                // Only a single line may push a payload over the limit.
                assert!(payload.len() <= max_payload_len || lines == 1);
            }
            assert_eq!(total_lines, line_lens.len());
        }
    }
}
