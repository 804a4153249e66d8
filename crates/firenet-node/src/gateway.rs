//! The gateway: receive a packet, decode it, upload it through the modem.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use firenet_metrics::{metric_defs, MetricLabels};
use firenet_modem::{CycleReport, ModemSession, ModemTransport};
use firenet_packet::{DecodedPacket, PacketError, PacketLayout, SensorReading};
use tracing::{debug, info, warn};

use crate::config::NodeSettings;
use crate::mailbox::Mailbox;
use crate::radio::{Radio, RadioError, RadioEvent};
use crate::upload::UploadSettings;

/// What the gateway did with one received packet.
#[derive(Debug)]
pub enum GatewayOutcome {
    /// The packet was valid and an upload cycle ran.
    Uploaded {
        /// The decoded reading.
        reading: SensorReading,
        /// The modem exchanges of the cycle.
        report: CycleReport,
    },
    /// A field carried the error sentinel; nothing was uploaded.
    Invalid(DecodedPacket),
    /// The packet was shorter than the layout.
    Malformed(PacketError),
    /// The radio failed to deliver the packet.
    ReceiveFailed(RadioError),
}

impl GatewayOutcome {
    /// True if an upload cycle ran.
    pub fn uploaded(&self) -> bool {
        matches!(self, GatewayOutcome::Uploaded { .. })
    }
}

/// Relays received readings to the telemetry endpoint.
pub struct GatewayNode<R: Radio, T: ModemTransport> {
    radio: R,
    mailbox: Arc<Mailbox<RadioEvent>>,
    session: ModemSession<T>,
    settings: NodeSettings,
    upload: UploadSettings,
    labels: MetricLabels,
}

impl<R: Radio, T: ModemTransport> GatewayNode<R, T> {
    /// Create a gateway around an initialised radio and modem session.
    pub fn new(
        radio: R,
        mailbox: Arc<Mailbox<RadioEvent>>,
        session: ModemSession<T>,
        settings: NodeSettings,
        upload: UploadSettings,
    ) -> Self {
        let labels = MetricLabels::new(format!("0x{:02x}", settings.id), "gateway");
        GatewayNode {
            radio,
            mailbox,
            session: session.with_labels(labels.clone()),
            settings,
            upload,
            labels,
        }
    }

    /// Borrow the modem session.
    pub fn session(&self) -> &ModemSession<T> {
        &self.session
    }

    /// Borrow the radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Handle the pending radio event, if there is one.
    pub fn poll(&mut self) -> Option<GatewayOutcome> {
        match self.mailbox.take()? {
            RadioEvent::PacketReceived => {}
            RadioEvent::TransmitDone => {
                debug!("ignoring transmit completion on a gateway");
                return None;
            }
        }

        self.mailbox.suspend();
        let received = self.receive();
        self.mailbox.resume();
        if let Err(e) = self.radio.start_receive() {
            warn!(error = %e, "failed to restart reception");
        }

        let reading = match received {
            Ok(reading) => reading,
            Err(outcome) => return Some(outcome),
        };

        info!(
            transmitter = reading.transmitter_id,
            smoke = reading.smoke,
            flame = reading.flame,
            gas = reading.gas,
            probability = reading.fire_probability,
            battery = ?reading.battery,
            "received reading"
        );
        let request =
            self.upload
                .build_request(&reading, self.settings.layout, self.settings.voltage_scale);
        let report = self.session.run_upload_cycle(&request);
        Some(GatewayOutcome::Uploaded { reading, report })
    }

    /// Run until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            id = self.settings.id,
            layout = self.settings.layout.as_str(),
            "gateway listening"
        );
        while !stop.load(Ordering::Relaxed) {
            if self.poll().is_none() {
                thread::sleep(self.settings.poll_interval());
            }
        }
        info!("gateway stopped");
    }

    fn receive(&mut self) -> Result<SensorReading, GatewayOutcome> {
        let layout = self.settings.layout;
        let mut buf = vec![0u8; layout.len()];
        let len = match self.radio.read_packet(&mut buf) {
            Ok(len) => len,
            Err(e) => {
                warn!(error = %e, "packet receive failed");
                self.count_rx_error(e.kind());
                return Err(GatewayOutcome::ReceiveFailed(e));
            }
        };
        debug!(bytes = ?&buf[..len], "received packet");

        let decoded = match layout.decode(&buf[..len]) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "malformed packet");
                self.count_rx_error("malformed");
                return Err(GatewayOutcome::Malformed(e));
            }
        };
        metrics::counter!(metric_defs::PACKETS_DECODED.name, &self.labels.to_labels()).increment(1);

        if !decoded.valid {
            warn!(
                transmitter = decoded.id,
                fields = ?invalid_field_names(&decoded, layout),
                "packet carries error values, skipping upload"
            );
            metrics::counter!(metric_defs::PACKETS_INVALID.name, &self.labels.to_labels())
                .increment(1);
            return Err(GatewayOutcome::Invalid(decoded));
        }
        Ok(SensorReading::from_decoded(&decoded, layout))
    }

    fn count_rx_error(&self, kind: &str) {
        metrics::counter!(
            metric_defs::RADIO_RX_ERRORS.name,
            &self.labels.with(&[("kind", kind.to_string())])
        )
        .increment(1);
    }
}

fn invalid_field_names(packet: &DecodedPacket, layout: PacketLayout) -> Vec<&'static str> {
    let names = layout.field_names();
    packet
        .invalid_fields()
        .into_iter()
        .map(|index| names.get(index).copied().unwrap_or("unknown"))
        .collect()
}
