use std::{
    io,
    net::{SocketAddr, ToSocketAddrs as _},
    time::Duration,
};

use thiserror::Error;

use crate::{
    buffer::{CommandBuffer, MAX_BUFFERED_COMMANDS, OPTIMAL_PAYLOAD_LEN},
    client::DogStatsDClient,
    sampler::Sampler,
    tags::{self, TagPolicy},
    transport::{MetricSink, UdpSink},
};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that could occur while building a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// A global tag contained protocol separator characters and the builder is
    /// configured with [`TagPolicy::Reject`].
    #[error("global tag '{tag}' contains protocol separator characters")]
    InvalidGlobalTag {
        /// The offending tag.
        tag: String,
    },

    /// Failed to create, connect, or configure the UDP socket.
    ///
    /// Fatal: a destination that cannot be set up at construction is a configuration
    /// problem, not a transient one.
    #[error("failed to set up UDP socket")]
    Socket(#[from] io::Error),
}

/// Builder for a [`DogStatsDClient`].
pub struct DogStatsDBuilder {
    remote_addr: Vec<SocketAddr>,
    write_timeout: Duration,
    max_payload_len: usize,
    max_buffered_commands: usize,
    buffered: bool,
    global_tags: Vec<String>,
    tag_policy: TagPolicy,
    sampler_seed: Option<u64>,
}

impl DogStatsDBuilder {
    /// Set the remote address to send metrics to, in `<host>:<port>` form.
    ///
    /// Defaults to `127.0.0.1:8125`.
    ///
    /// # Errors
    ///
    /// If the given address cannot be parsed or resolved, an error is returned
    /// indicating the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = addr
            .as_ref()
            .to_socket_addrs()
            .map_err(|e| BuildError::InvalidRemoteAddress { reason: e.to_string() })?
            .collect();
        Ok(self)
    }

    /// Set whether metric lines are queued and sent in batched packets, rather than
    /// one datagram per metric.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_buffering(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Set the tags appended to every metric this client emits, after any per-call
    /// tags.
    ///
    /// Defaults to none.
    #[must_use]
    pub fn with_global_tags<I, S>(mut self, global_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_tags = global_tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum size of a single batched packet.
    ///
    /// Defaults to 65467 bytes, the largest UDP payload that avoids IP
    /// fragmentation.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Set the number of queued lines that forces a flush in buffered mode.
    ///
    /// Defaults to 50.
    #[must_use]
    pub fn with_maximum_buffered_commands(mut self, max_buffered_commands: usize) -> Self {
        self.max_buffered_commands = max_buffered_commands;
        self
    }

    /// Set the write timeout for sends.
    ///
    /// When the timeout is reached, the send is aborted and the payload dropped
    /// without retrying.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Set how tags containing protocol separator characters are handled.
    ///
    /// Defaults to [`TagPolicy::Sanitize`].
    #[must_use]
    pub fn with_tag_policy(mut self, tag_policy: TagPolicy) -> Self {
        self.tag_policy = tag_policy;
        self
    }

    /// Seed the sampler with a fixed value, making sampling decisions deterministic.
    ///
    /// Defaults to seeding from the operating system once per client.
    #[must_use]
    pub fn with_sampler_seed(mut self, seed: u64) -> Self {
        self.sampler_seed = Some(seed);
        self
    }

    /// Builds the client, creating and connecting its UDP socket.
    ///
    /// # Errors
    ///
    /// Fails if a global tag violates the configured tag policy, or if the socket
    /// cannot be created and connected to the configured remote address.
    pub fn build(self) -> Result<DogStatsDClient, BuildError> {
        let sink = UdpSink::connect(&self.remote_addr, self.write_timeout)?;
        self.build_with_sink(Box::new(sink))
    }

    /// Builds the client around a caller-provided sink instead of a UDP socket.
    ///
    /// Useful for capturing payloads in tests, or routing them through a custom
    /// transport.
    ///
    /// # Errors
    ///
    /// Fails if a global tag violates the configured tag policy.
    pub fn build_with_sink(
        self,
        sink: Box<dyn MetricSink + Send + Sync>,
    ) -> Result<DogStatsDClient, BuildError> {
        let global_tags = match self.tag_policy {
            TagPolicy::Reject => {
                if let Some(bad) = self.global_tags.iter().find(|tag| !tags::is_clean(tag)) {
                    return Err(BuildError::InvalidGlobalTag { tag: bad.clone() });
                }
                self.global_tags
            }
            TagPolicy::Sanitize => self.global_tags.iter().map(|tag| tags::sanitize(tag)).collect(),
        };

        let buffer = self
            .buffered
            .then(|| CommandBuffer::new(self.max_buffered_commands, self.max_payload_len));
        let sampler = match self.sampler_seed {
            Some(seed) => Sampler::with_seed(seed),
            None => Sampler::new(),
        };

        Ok(DogStatsDClient::new(sink, buffer, sampler, &global_tags, self.tag_policy))
    }
}

impl Default for DogStatsDBuilder {
    fn default() -> Self {
        DogStatsDBuilder {
            remote_addr: vec![SocketAddr::from(([127, 0, 0, 1], 8125))],
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_payload_len: OPTIMAL_PAYLOAD_LEN,
            max_buffered_commands: MAX_BUFFERED_COMMANDS,
            buffered: false,
            global_tags: Vec::new(),
            tag_policy: TagPolicy::default(),
            sampler_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, sync::Arc};

    use crate::{
        tags::TagPolicy,
        transport::{test_support::RecordingSink, MetricSink},
        BuildError,
    };

    use super::DogStatsDBuilder;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<RecordingSink>);

    impl MetricSink for SharedSink {
        fn send(&self, payload: &[u8]) -> std::io::Result<usize> {
            self.0.send(payload)
        }
    }

    #[test]
    fn unparseable_remote_address_is_rejected() {
        let result = DogStatsDBuilder::default().with_remote_address("not an address");
        assert!(matches!(result, Err(BuildError::InvalidRemoteAddress { .. })));
    }

    #[test]
    fn reject_policy_fails_the_build_on_a_malformed_global_tag() {
        let result = DogStatsDBuilder::default()
            .with_tag_policy(TagPolicy::Reject)
            .with_global_tags(["ok", "bad|tag"])
            .build_with_sink(Box::new(RecordingSink::default()));

        assert!(matches!(result, Err(BuildError::InvalidGlobalTag { tag }) if tag == "bad|tag"));
    }

    #[test]
    fn sanitize_policy_cleans_global_tags_at_build_time() {
        let sink = SharedSink::default();
        let client = DogStatsDBuilder::default()
            .with_global_tags(["env:pr\nod"])
            .build_with_sink(Box::new(sink.clone()))
            .unwrap();

        client.incr("requests", &[], 1.0).unwrap();
        assert_eq!(sink.0.lines(), vec!["requests:1|c|#env:prod"]);
    }

    #[test]
    fn default_destination_is_local_dogstatsd() {
        let builder = DogStatsDBuilder::default();
        let expected: SocketAddr = "127.0.0.1:8125".parse().unwrap();
        assert_eq!(builder.remote_addr, vec![expected]);
        assert!(!builder.buffered);
    }
}
