//! The sensing node's transmit loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use firenet_metrics::{metric_defs, MetricLabels};
use firenet_packet::{EncodedPacket, SensorReading};
use tracing::{debug, info, warn};

use crate::config::NodeSettings;
use crate::mailbox::Mailbox;
use crate::radio::{Radio, RadioEvent};

/// Sends one packet per cycle once the previous transmission has finished.
pub struct TransmitterNode<R: Radio> {
    radio: R,
    mailbox: Arc<Mailbox<RadioEvent>>,
    settings: NodeSettings,
    labels: MetricLabels,
}

impl<R: Radio> TransmitterNode<R> {
    /// Create a transmitter. The first cycle may send immediately.
    pub fn new(radio: R, mailbox: Arc<Mailbox<RadioEvent>>, settings: NodeSettings) -> Self {
        mailbox.post(RadioEvent::TransmitDone);
        let labels = MetricLabels::new(format!("0x{:02x}", settings.id), "transmitter");
        TransmitterNode {
            radio,
            mailbox,
            settings,
            labels,
        }
    }

    /// Get the node settings.
    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// Borrow the radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Encode `reading` and send it if the radio is free.
    ///
    /// The reading's id is replaced by this node's address. Returns the
    /// packet that was handed to the radio, or `None` if the previous
    /// transmission has not completed yet.
    pub fn poll(&mut self, reading: &SensorReading) -> Option<EncodedPacket> {
        loop {
            match self.mailbox.take()? {
                RadioEvent::TransmitDone => break,
                RadioEvent::PacketReceived => debug!("ignoring received packet on a transmitter"),
            }
        }

        self.mailbox.suspend();
        let reading = SensorReading {
            transmitter_id: self.settings.id,
            ..reading.clone()
        };
        let packet = reading.encode(self.settings.layout);
        self.record_encoded(&packet);
        self.mailbox.resume();

        info!(packet = %packet, "Sending packet");
        match self.radio.start_transmit(packet.as_bytes()) {
            Ok(()) => {
                metrics::counter!(metric_defs::PACKETS_TRANSMITTED.name, &self.labels.to_labels())
                    .increment(1);
                Some(packet)
            }
            Err(e) => {
                warn!(error = %e, "transmission failed to start");
                self.mailbox.post(RadioEvent::TransmitDone);
                None
            }
        }
    }

    /// Run until `stop` is set, sampling a reading each cycle.
    pub fn run<F>(&mut self, mut sample: F, stop: &AtomicBool)
    where
        F: FnMut() -> SensorReading,
    {
        info!(id = self.settings.id, layout = self.settings.layout.as_str(), "transmitter started");
        while !stop.load(Ordering::Relaxed) {
            let reading = sample();
            if self.poll(&reading).is_some() {
                thread::sleep(self.settings.cycle_interval());
            } else {
                thread::sleep(self.settings.poll_interval());
            }
        }
        info!("transmitter stopped");
    }

    fn record_encoded(&self, packet: &EncodedPacket) {
        metrics::counter!(metric_defs::PACKETS_ENCODED.name, &self.labels.to_labels()).increment(1);
        let names = self.settings.layout.field_names();
        for &index in packet.overflowed() {
            let field = names.get(index).copied().unwrap_or("unknown");
            warn!(field, "value out of range, sending error sentinel");
            metrics::counter!(
                metric_defs::FIELDS_OVERFLOWED.name,
                &self.labels.with(&[("field", field.to_string())])
            )
            .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::RadioError;
    use firenet_packet::PacketLayout;

    struct RecordingRadio {
        sent: Vec<Vec<u8>>,
        fail: bool,
    }

    impl Radio for RecordingRadio {
        fn start_transmit(&mut self, data: &[u8]) -> Result<(), RadioError> {
            if self.fail {
                return Err(RadioError::Init("down".to_string()));
            }
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn read_packet(&mut self, _buf: &mut [u8]) -> Result<usize, RadioError> {
            Err(RadioError::NoPacket)
        }
    }

    fn reading() -> SensorReading {
        SensorReading {
            transmitter_id: 0,
            smoke: 273,
            flame: 514,
            gas: 4021,
            fire_probability: 530,
            battery: None,
        }
    }

    #[test]
    fn test_first_cycle_sends_immediately() {
        let mailbox = Arc::new(Mailbox::new());
        let radio = RecordingRadio { sent: Vec::new(), fail: false };
        let mut node = TransmitterNode::new(radio, mailbox, NodeSettings::default());

        let packet = node.poll(&reading()).unwrap();
        assert_eq!(
            packet.as_bytes(),
            [0x11, 0x01, 0x11, 0x02, 0x02, 0x0F, 0xB5, 0x02, 0x12]
        );
        assert_eq!(node.radio().sent.len(), 1);
    }

    #[test]
    fn test_waits_for_transmit_done() {
        let mailbox = Arc::new(Mailbox::new());
        let radio = RecordingRadio { sent: Vec::new(), fail: false };
        let mut node = TransmitterNode::new(radio, Arc::clone(&mailbox), NodeSettings::default());

        assert!(node.poll(&reading()).is_some());
        assert!(node.poll(&reading()).is_none());

        assert!(mailbox.post(RadioEvent::TransmitDone));
        assert!(node.poll(&reading()).is_some());
        assert_eq!(node.radio().sent.len(), 2);
    }

    #[test]
    fn test_overflowed_field_is_poisoned() {
        let mailbox = Arc::new(Mailbox::new());
        let radio = RecordingRadio { sent: Vec::new(), fail: false };
        let settings = NodeSettings {
            layout: PacketLayout::WithBattery,
            ..NodeSettings::default()
        };
        let mut node = TransmitterNode::new(radio, mailbox, settings);

        let packet = node.poll(&reading()).unwrap();
        assert_eq!(packet.len(), 11);
        assert_eq!(packet.overflowed(), [4]);
        assert_eq!(packet.as_bytes()[9..], [0xFF, 0xFF]);
    }

    /// Hears its own echo: a receive event lands before the completion.
    struct EchoingRadio {
        mailbox: Arc<Mailbox<RadioEvent>>,
        sent: usize,
    }

    impl Radio for EchoingRadio {
        fn start_transmit(&mut self, _data: &[u8]) -> Result<(), RadioError> {
            self.sent += 1;
            self.mailbox.post(RadioEvent::PacketReceived);
            self.mailbox.post(RadioEvent::TransmitDone);
            Ok(())
        }

        fn read_packet(&mut self, _buf: &mut [u8]) -> Result<usize, RadioError> {
            Err(RadioError::NoPacket)
        }
    }

    #[test]
    fn test_received_packet_does_not_stall_transmitter() {
        let mailbox = Arc::new(Mailbox::new());
        let radio = EchoingRadio {
            mailbox: Arc::clone(&mailbox),
            sent: 0,
        };
        let mut node = TransmitterNode::new(radio, mailbox, NodeSettings::default());

        for _ in 0..20 {
            assert!(node.poll(&reading()).is_some());
        }
        assert_eq!(node.radio().sent, 20);
    }

    #[test]
    fn test_failed_start_retries_next_cycle() {
        let mailbox = Arc::new(Mailbox::new());
        let radio = RecordingRadio { sent: Vec::new(), fail: true };
        let mut node = TransmitterNode::new(radio, Arc::clone(&mailbox), NodeSettings::default());

        assert!(node.poll(&reading()).is_none());
        assert!(mailbox.is_pending());
    }
}
