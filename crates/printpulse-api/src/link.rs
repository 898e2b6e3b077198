//! Backend-neutral printer link contract.
//!
//! A link is a background task that owns the connection to one printer.
//! It pushes [`LinkEvent`]s up and accepts [`PrinterRequest`]s down,
//! each acknowledged through a oneshot reply. The MQTT transport and the
//! demo simulator both speak this contract, so consumers never care
//! which one is on the other end.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::request::PrinterRequest;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const REQUEST_CHANNEL_CAPACITY: usize = 16;

// ── LinkEvent ────────────────────────────────────────────────────────

/// Something that happened on a printer link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Session established and report subscription in place.
    Connected,
    /// A decoded report document.
    Report(serde_json::Value),
    /// The session dropped. The link keeps retrying.
    Disconnected { reason: String },
    /// Retries exhausted; the link task has exited.
    GaveUp { attempts: u32 },
}

// ── Request plumbing ─────────────────────────────────────────────────

/// A request travelling to the link task, with its acknowledgement channel.
#[derive(Debug)]
pub struct RequestEnvelope {
    pub request: PrinterRequest,
    pub reply: oneshot::Sender<Result<()>>,
}

/// Consumer side of a link.
#[derive(Debug)]
pub struct LinkHandle {
    pub events: mpsc::Receiver<LinkEvent>,
    pub requests: RequestSender,
}

/// Cloneable request side of a link.
#[derive(Debug, Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<RequestEnvelope>,
}

impl RequestSender {
    /// Send a request and wait for the link to accept or reject it.
    pub async fn send(&self, request: PrinterRequest) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RequestEnvelope { request, reply })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Returns `true` once the link task has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Producer side of a link, held by the task implementing it.
#[derive(Debug)]
pub struct LinkEndpoint {
    pub events: mpsc::Sender<LinkEvent>,
    pub requests: mpsc::Receiver<RequestEnvelope>,
}

impl LinkEndpoint {
    /// Push an event. Returns `false` when the consumer is gone.
    pub async fn emit(&self, event: LinkEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

/// Create a connected handle/endpoint pair.
pub fn link_channel() -> (LinkHandle, LinkEndpoint) {
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    (
        LinkHandle {
            events: event_rx,
            requests: RequestSender { tx: request_tx },
        },
        LinkEndpoint {
            events: event_tx,
            requests: request_rx,
        },
    )
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for link reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failures before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Compute the delay before reconnection attempt `attempt` (0-based).
///
/// Exponential growth capped at `max_delay`, with a deterministic ±25%
/// jitter so printers that dropped together do not retry in lockstep.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::as_conversions)]
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.min(30) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * ((f64::from(attempt) * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d = calculate_backoff(40, &config);
        assert!(
            d <= Duration::from_millis(12_500),
            "delay at attempt 40 ({d:?}) should be capped near max_delay"
        );
    }

    #[tokio::test]
    async fn request_is_acknowledged_by_endpoint() {
        let (handle, mut endpoint) = link_channel();

        let responder = tokio::spawn(async move {
            let envelope = endpoint.requests.recv().await.unwrap();
            assert_eq!(envelope.request, PrinterRequest::Pause);
            envelope.reply.send(Ok(())).unwrap();
        });

        handle.requests.send(PrinterRequest::Pause).await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn request_fails_when_endpoint_dropped() {
        let (handle, endpoint) = link_channel();
        drop(endpoint);

        let err = handle.requests.send(PrinterRequest::Stop).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        assert!(handle.requests.is_closed());
    }

    #[tokio::test]
    async fn emit_reports_consumer_presence() {
        let (handle, endpoint) = link_channel();
        assert!(endpoint.emit(LinkEvent::Connected).await);
        drop(handle);
        assert!(!endpoint.emit(LinkEvent::Connected).await);
    }
}
