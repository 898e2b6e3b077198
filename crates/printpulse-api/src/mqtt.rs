//! MQTT transport for Bambu Lab printers in LAN mode.
//!
//! One [`MqttLink`] per printer. The link owns a `rumqttc` event loop,
//! subscribes to the report topic on every (re)connect, asks for a status
//! push once, and then relies on the printer's own pushes. Polling is
//! deliberately avoided: frequent status requests stall P1-series firmware.
//!
//! ```rust,ignore
//! use printpulse_api::{ConnectionConfig, MqttLink};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConnectionConfig::new("192.168.1.50", "01S00A000000000", access_code);
//! let mut link = MqttLink::spawn(config, CancellationToken::new())?;
//! while let Some(event) = link.events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::link::{
    LinkEndpoint, LinkEvent, LinkHandle, ReconnectConfig, RequestEnvelope, calculate_backoff,
    link_channel,
};
use crate::request::{PrinterRequest, next_sequence_id, report_topic, request_topic};
use crate::tls::{TlsMode, build_client_config};

/// MQTT-over-TLS port used by printers in LAN mode.
pub const DEFAULT_PORT: u16 = 8883;
/// Fixed LAN-mode username; the access code is the password.
pub const LAN_USERNAME: &str = "bblp";

const CLIENT_CHANNEL_CAPACITY: usize = 10;
/// Full reports run to tens of kilobytes, well past the rumqttc default.
const MAX_INCOMING_PACKET: usize = 1024 * 1024;
const MAX_OUTGOING_PACKET: usize = 64 * 1024;

// ── ConnectionConfig ─────────────────────────────────────────────────

/// Everything needed to open a session with one printer.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub serial: String,
    pub access_code: SecretString,
    /// Folded into the MQTT client id so sessions are attributable.
    pub client_id_prefix: String,
    pub keep_alive: Duration,
    pub tls: TlsMode,
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        serial: impl Into<String>,
        access_code: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            serial: serial.into(),
            access_code,
            client_id_prefix: "desktop".into(),
            keep_alive: Duration::from_secs(60),
            tls: TlsMode::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    fn mqtt_options(&self) -> Result<MqttOptions> {
        let client_id = format!(
            "printpulse_{}_{}",
            self.client_id_prefix,
            uuid::Uuid::new_v4().simple()
        );

        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options
            .set_credentials(LAN_USERNAME, self.access_code.expose_secret())
            .set_keep_alive(self.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(MAX_INCOMING_PACKET, MAX_OUTGOING_PACKET);

        let tls = build_client_config(&self.tls)?;
        options.set_transport(Transport::Tls(TlsConfiguration::Rustls(tls)));
        Ok(options)
    }
}

// ── MqttLink ─────────────────────────────────────────────────────────

/// Spawner for the MQTT link task.
pub struct MqttLink;

impl MqttLink {
    /// Spawn the link task and return its handle.
    ///
    /// Fails synchronously only on local configuration problems (TLS).
    /// Network failures surface later as [`LinkEvent::Disconnected`].
    pub fn spawn(config: ConnectionConfig, cancel: CancellationToken) -> Result<LinkHandle> {
        let options = config.mqtt_options()?;
        let (client, event_loop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
        let (handle, endpoint) = link_channel();
        let LinkEndpoint { events, requests } = endpoint;
        let (connected_tx, connected_rx) = watch::channel(false);

        tokio::spawn(request_task(
            client.clone(),
            request_topic(&config.serial),
            requests,
            connected_rx,
            cancel.clone(),
        ));
        tokio::spawn(event_task(
            config,
            client,
            event_loop,
            events,
            connected_tx,
            cancel,
        ));

        Ok(handle)
    }
}

async fn publish(client: &AsyncClient, topic: &str, request: &PrinterRequest) -> Result<()> {
    let payload = request.to_bytes(&next_sequence_id());
    client
        .publish(topic, QoS::AtMostOnce, false, payload)
        .await?;
    Ok(())
}

/// Accept requests from the consumer and publish them while connected.
async fn request_task(
    client: AsyncClient,
    topic: String,
    mut requests: mpsc::Receiver<RequestEnvelope>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = requests.recv() => {
                let Some(envelope) = envelope else { break };
                let result = if *connected.borrow() {
                    publish(&client, &topic, &envelope.request).await
                } else {
                    Err(Error::NotConnected)
                };
                match &result {
                    Ok(()) => tracing::info!(topic = %topic, request = %envelope.request, "request sent"),
                    Err(e) => tracing::warn!(topic = %topic, request = %envelope.request, error = %e, "request failed"),
                }
                let _ = envelope.reply.send(result);
            }
        }
    }
}

/// Drive the MQTT event loop: connect, forward reports, back off on errors.
async fn event_task(
    config: ConnectionConfig,
    client: AsyncClient,
    mut event_loop: EventLoop,
    events: mpsc::Sender<LinkEvent>,
    connected: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    let report = report_topic(&config.serial);
    let request = request_topic(&config.serial);
    let mut failures: u32 = 0;

    loop {
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = event_loop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!(host = %config.host, serial = %config.serial, "printer connected");
                failures = 0;

                if let Err(e) = client.subscribe(report.as_str(), QoS::AtMostOnce).await {
                    tracing::error!(topic = %report, error = %e, "subscribe failed");
                }
                if let Err(e) = publish(&client, &request, &PrinterRequest::GetStatus).await {
                    tracing::error!(serial = %config.serial, error = %e, "initial status request failed");
                }

                let _ = connected.send(true);
                if events.send(LinkEvent::Connected).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(message))) => {
                if message.topic != report {
                    tracing::debug!(topic = %message.topic, "ignoring message on foreign topic");
                    continue;
                }
                match serde_json::from_slice::<serde_json::Value>(&message.payload) {
                    Ok(value) if value.is_object() => {
                        if events.send(LinkEvent::Report(value)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => tracing::debug!(serial = %config.serial, "report is not a JSON object"),
                    Err(e) => tracing::warn!(serial = %config.serial, error = %e, "undecodable report"),
                }
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = *connected.borrow();
                let _ = connected.send(false);
                tracing::warn!(host = %config.host, error = %e, attempt = failures, "printer connection error");

                if was_connected || failures == 0 {
                    let event = LinkEvent::Disconnected {
                        reason: e.to_string(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }

                if let Some(max) = config.reconnect.max_retries {
                    if failures >= max {
                        tracing::error!(host = %config.host, max_retries = max, "giving up on printer");
                        let _ = events
                            .send(LinkEvent::GaveUp {
                                attempts: failures + 1,
                            })
                            .await;
                        break;
                    }
                }

                let delay = calculate_backoff(failures, &config.reconnect);
                tracing::debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "waiting before reconnect");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                failures = failures.saturating_add(1);
            }
        }
    }

    let _ = connected.send(false);
    let _ = client.try_disconnect();
    tracing::debug!(serial = %config.serial, "printer link stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", "01S00A000000001", SecretString::from("12345678".to_string()))
    }

    #[test]
    fn defaults_match_lan_mode() {
        let cfg = config();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.keep_alive, Duration::from_secs(60));
        assert_eq!(cfg.tls, TlsMode::DangerAcceptInvalid);
    }

    #[test]
    fn options_carry_lan_credentials() {
        let options = config().mqtt_options().unwrap();
        let rumqttc::Login { username: user, password: pass } = options.credentials().unwrap();
        assert_eq!(user, LAN_USERNAME);
        assert_eq!(pass, "12345678");
        assert!(options.client_id().starts_with("printpulse_desktop_"));
        assert_eq!(options.broker_address(), ("127.0.0.1".to_string(), DEFAULT_PORT));
    }

    #[tokio::test]
    async fn requests_fail_fast_while_still_connecting() {
        let mut cfg = config();
        cfg.port = 1;
        cfg.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            max_retries: None,
        };

        let cancel = CancellationToken::new();
        let link = MqttLink::spawn(cfg, cancel.clone()).unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            link.requests.send(PrinterRequest::Pause),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, Error::NotConnected), "got {err:?}");
        assert!(!link.requests.is_closed());
        cancel.cancel();
    }

    #[tokio::test]
    async fn unreachable_printer_gives_up_after_retries() {
        let mut cfg = config();
        // Port 1 is never an MQTT broker; connect is refused immediately.
        cfg.port = 1;
        cfg.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_retries: Some(1),
        };

        let cancel = CancellationToken::new();
        let mut link = MqttLink::spawn(cfg, cancel.clone()).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(10), link.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, LinkEvent::Disconnected { .. }), "got {first:?}");

        let last = tokio::time::timeout(Duration::from_secs(10), link.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last, LinkEvent::GaveUp { attempts: 2 });

        let err = link.requests.send(PrinterRequest::Pause).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected | Error::ChannelClosed), "got {err:?}");
        cancel.cancel();
    }
}
