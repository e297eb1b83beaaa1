//! Single-owner binding to a log stream.
//!
//! A [`StreamBinding`] pairs a connected log client with its stream
//! configuration. At most one producer may use a binding at a time;
//! ownership is taken with [`StreamBinding::acquire`] and held by the
//! returned [`BindingLease`] until it is released or dropped.

use super::{connect, LogClient};
use crate::core::error::{StreamError, StreamResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Options for binding to a log stream.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Log addresses, tried in order.
    pub addresses: Vec<String>,
    /// Client identifier.
    pub client_id: String,
    /// Topic to append to.
    pub topic: String,
    /// Producer queue capacity.
    pub channel_capacity: usize,
    /// Segment size for file logs.
    pub segment_bytes: u64,
}

impl StreamOptions {
    /// Options for `topic` on the given addresses, with default capacities.
    pub fn new(addresses: Vec<String>, client_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            addresses,
            client_id: client_id.into(),
            topic: topic.into(),
            channel_capacity: 1_024,
            segment_bytes: 64 * 1024 * 1024,
        }
    }

    /// Check the options are usable.
    pub fn validate(&self) -> StreamResult<()> {
        if self.addresses.is_empty() {
            return Err(StreamError::config_invalid("at least one log address is required"));
        }
        if self.client_id.is_empty() {
            return Err(StreamError::config_invalid("client id must not be empty"));
        }
        if self.topic.is_empty() {
            return Err(StreamError::config_invalid("topic must not be empty"));
        }
        if self.channel_capacity == 0 {
            return Err(StreamError::config_invalid("channel capacity must be > 0"));
        }
        Ok(())
    }
}

/// Stream configuration carried by a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Topic records are appended to.
    pub topic: String,
}

/// A log client bound to a stream, owned by at most one producer.
pub struct StreamBinding {
    client: Arc<dyn LogClient>,
    config: StreamConfig,
    channel_capacity: usize,
    in_use: AtomicBool,
}

impl std::fmt::Debug for StreamBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBinding")
            .field("address", &self.client.address())
            .field("config", &self.config)
            .field("in_use", &self.is_in_use())
            .finish()
    }
}

impl StreamBinding {
    /// Validate options and connect a log client. The binding starts unowned.
    pub fn bind(options: StreamOptions) -> StreamResult<Arc<Self>> {
        options.validate()?;
        let client = connect(&options.addresses, &options.client_id, options.segment_bytes)?;

        tracing::info!(
            address = %client.address(),
            client_id = %options.client_id,
            topic = %options.topic,
            "stream bound"
        );

        Ok(Self::with_client(
            client,
            StreamConfig {
                topic: options.topic,
            },
            options.channel_capacity,
        ))
    }

    /// Wrap an already connected client.
    pub fn with_client(
        client: Arc<dyn LogClient>,
        config: StreamConfig,
        channel_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            channel_capacity: channel_capacity.max(1),
            in_use: AtomicBool::new(false),
        })
    }

    /// Take exclusive ownership of the binding.
    ///
    /// Exactly one of any number of concurrent callers succeeds; the others
    /// get `AlreadyInUse`.
    pub fn acquire(self: &Arc<Self>) -> StreamResult<BindingLease> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StreamError::AlreadyInUse)?;

        Ok(BindingLease {
            binding: Arc::clone(self),
            released: false,
        })
    }

    /// Check if a lease is outstanding.
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Bound log client.
    pub fn client(&self) -> &Arc<dyn LogClient> {
        &self.client
    }

    /// Producer queue capacity.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

/// Exclusive ownership of a [`StreamBinding`]. Releases it on drop.
#[derive(Debug)]
pub struct BindingLease {
    binding: Arc<StreamBinding>,
    released: bool,
}

impl BindingLease {
    /// The owned binding.
    pub fn binding(&self) -> &Arc<StreamBinding> {
        &self.binding
    }

    /// Release ownership now.
    pub fn release(mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        if !self.released {
            self.released = true;
            self.binding.in_use.store(false, Ordering::Release);
        }
    }
}

impl Drop for BindingLease {
    fn drop(&mut self) {
        self.clear();
    }
}
