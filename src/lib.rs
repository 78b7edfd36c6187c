//! A synchronous client for sending metrics to a [DogStatsD][dsd]-compatible server
//! over UDP.
//!
//! [dsd]: https://docs.datadoghq.com/developers/dogstatsd/
//!
//! # Usage
//!
//! Build a client, then call the typed operations on it from any thread:
//!
//! ```no_run
//! # use dogstatsd_client::DogStatsDBuilder;
//! let client = DogStatsDBuilder::default()
//!     .with_remote_address("127.0.0.1:8125")?
//!     .with_buffering(true)
//!     .with_global_tags(["env:prod"])
//!     .build()?;
//!
//! client.incr("requests.handled", &["route:home"], 1.0)?;
//! client.gauge("queue.depth", 42.0, &[], 1.0)?;
//! client.histogram("request.duration", 0.0215, &[], 0.5)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A process-wide default client, buffered and tagged with the running executable's
//! name, is available through [`default_client`] for call sites that don't want to
//! thread a handle around:
//!
//! ```no_run
//! if let Some(client) = dogstatsd_client::default_client() {
//!     let _ = client.incr("startup", &[], 1.0);
//! }
//! ```
//!
//! # Buffering
//!
//! In buffered mode, formatted lines are queued until 50 have accumulated (or
//! [`flush`](DogStatsDClient::flush) is called, or the client is dropped), then sent
//! as newline-delimited packets no larger than 65467 bytes, the practical UDP payload
//! ceiling. Unbuffered clients send one datagram per metric call.
//!
//! # Delivery
//!
//! UDP is fire-and-forget: sends that fail are reported to the caller and never
//! retried, and nothing detects packets the network drops. Sampling rates below 1
//! shed load at the source, trading accuracy for volume.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]

mod buffer;

mod builder;
pub use self::builder::{BuildError, DogStatsDBuilder};

mod client;
pub use self::client::{ClientError, DogStatsDClient};

mod format;
mod sampler;

mod tags;
pub use self::tags::TagPolicy;

mod transport;
pub use self::transport::{MetricSink, UdpSink};

use once_cell::sync::Lazy;
use tracing::error;

static DEFAULT_CLIENT: Lazy<Option<DogStatsDClient>> = Lazy::new(|| {
    match DogStatsDBuilder::default()
        .with_buffering(true)
        .with_global_tags(tags::default_tags())
        .build()
    {
        Ok(client) => Some(client),
        Err(e) => {
            error!(error = %e, "Failed to initialize default DogStatsD client.");
            None
        }
    }
});

/// Returns the process-wide default client.
///
/// Lazily initialized on first use: buffered, targeting `127.0.0.1:8125`, with a
/// `binary:<executable-name>` global tag when the executable path is readable.
/// Returns `None` (and logs) if the client could not be constructed; the failure is
/// not retried.
pub fn default_client() -> Option<&'static DogStatsDClient> {
    DEFAULT_CLIENT.as_ref()
}
