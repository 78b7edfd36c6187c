use std::io;

use thiserror::Error;
use tracing::error;

use crate::{
    buffer::CommandBuffer,
    format::{render_line, MetricKind, MetricValue},
    sampler::Sampler,
    tags::{self, TagPolicy},
    transport::MetricSink,
};

/// Errors that could occur while emitting a metric.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A tag contained protocol separator characters and the client is configured
    /// with [`TagPolicy::Reject`].
    #[error("tag '{tag}' contains protocol separator characters")]
    InvalidTag {
        /// The offending tag.
        tag: String,
    },

    /// The underlying send failed.
    ///
    /// Non-fatal: the affected payload is dropped and subsequent metric calls
    /// proceed normally.
    #[error("failed to send metric payload")]
    Transport(#[from] io::Error),
}

/// A synchronous DogStatsD client.
///
/// Created through [`DogStatsDBuilder`](crate::DogStatsDBuilder). All operations take
/// `&self` and may be called concurrently from any number of threads.
///
/// Every operation returns the number of bytes handed to the OS by the send it
/// triggered, with `Ok(0)` meaning the event was sampled out or merely queued. In
/// buffered mode, dropping the client flushes whatever is still queued before the
/// socket closes.
pub struct DogStatsDClient {
    sink: Box<dyn MetricSink + Send + Sync>,
    buffer: Option<CommandBuffer>,
    sampler: Sampler,
    global_tags: String,
    tag_policy: TagPolicy,
}

impl DogStatsDClient {
    pub(crate) fn new(
        sink: Box<dyn MetricSink + Send + Sync>,
        buffer: Option<CommandBuffer>,
        sampler: Sampler,
        global_tags: &[String],
        tag_policy: TagPolicy,
    ) -> Self {
        Self { sink, buffer, sampler, global_tags: global_tags.join(","), tag_policy }
    }

    /// Records the current value of something: `<name>:<value>|g`.
    pub fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<usize, ClientError> {
        self.send(name, MetricValue::Float(value), MetricKind::Gauge, tags, rate)
    }

    /// Adds `value` to a counter: `<name>:<value>|c`.
    pub fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<usize, ClientError> {
        self.send(name, MetricValue::Integer(value), MetricKind::Counter, tags, rate)
    }

    /// Increments a counter by one.
    pub fn incr(&self, name: &str, tags: &[&str], rate: f64) -> Result<usize, ClientError> {
        self.count(name, 1, tags, rate)
    }

    /// Decrements a counter by one.
    pub fn decr(&self, name: &str, tags: &[&str], rate: f64) -> Result<usize, ClientError> {
        self.count(name, -1, tags, rate)
    }

    /// Records one observation of a distribution: `<name>:<value>|h`.
    pub fn histogram(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<usize, ClientError> {
        self.send(name, MetricValue::Float(value), MetricKind::Histogram, tags, rate)
    }

    /// Records one member of a set of unique values: `<name>:<value>|s`.
    ///
    /// The value is treated as an opaque string; the server counts distinct values.
    pub fn set(&self, name: &str, value: &str, tags: &[&str], rate: f64) -> Result<usize, ClientError> {
        self.send(name, MetricValue::Text(value), MetricKind::Set, tags, rate)
    }

    /// Transmits everything currently queued, regardless of how full the queue is.
    ///
    /// A no-op returning `Ok(0)` for unbuffered clients.
    pub fn flush(&self) -> Result<usize, ClientError> {
        match &self.buffer {
            Some(buffer) => buffer.flush(self.sink.as_ref()).map_err(ClientError::from),
            None => Ok(0),
        }
    }

    fn send(
        &self,
        name: &str,
        value: MetricValue<'_>,
        kind: MetricKind,
        tags: &[&str],
        rate: f64,
    ) -> Result<usize, ClientError> {
        if !self.sampler.should_send(rate) {
            return Ok(0);
        }

        let tags = tags::apply_policy(tags, self.tag_policy)
            .map_err(|tag| ClientError::InvalidTag { tag })?;
        let line = render_line(name, value, kind, &tags, &self.global_tags, rate);

        match &self.buffer {
            Some(buffer) => buffer.submit(self.sink.as_ref(), line).map_err(ClientError::from),
            // One line per datagram in unbuffered mode, no trailing newline.
            None => self.sink.send(line.as_bytes()).map_err(ClientError::from),
        }
    }
}

impl Drop for DogStatsDClient {
    fn drop(&mut self) {
        // Flush strictly before the sink drops and the socket closes with it. Errors
        // here have nowhere to go but the log.
        if let Some(buffer) = &self.buffer {
            if let Err(e) = buffer.flush(self.sink.as_ref()) {
                error!(error = %e, "Failed to flush queued metrics at shutdown.");
            }
        }
    }
}
