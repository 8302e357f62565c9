//! Detector pulse ingress
//!
//! Detector processes report pulses as UDP datagrams of little-endian f64
//! records on a local port. Each pulse is paired with the vehicle pose
//! nearest to its start time and forwarded to the ground station as a
//! tunnel PULSE record.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tag_controller_core::pulse::{decode_datagram, DetectorPulse};
use tag_controller_core::telemetry::TelemetrySample;

use crate::communication::mavlink::handlers::TelemetryTracker;
use crate::communication::mavlink::tunnel::TunnelSender;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_DATAGRAM: usize = 65_536;

/// Shared state of the receive loop
struct Forwarder {
    tunnel: TunnelSender,
    telemetry: Option<Arc<TelemetryTracker>>,
    forwarded: AtomicU64,
}

impl Forwarder {
    fn relay_datagram(&self, datagram: &[u8]) -> usize {
        let pulses = decode_datagram(datagram);
        if pulses.is_empty() {
            crate::log_warn!("Pulse datagram of {} bytes has no complete record", datagram.len());
        }
        pulses.iter().filter(|pulse| self.forward(pulse)).count()
    }

    fn forward(&self, pulse: &DetectorPulse) -> bool {
        let pose = self
            .telemetry
            .as_ref()
            .map(|t| t.telemetry_for_time(pulse.start_time_seconds))
            .unwrap_or_default();
        let info = pulse.to_pulse_info(&pose);
        log_pulse(pulse, &pose);

        let sent = self.tunnel.send_pulse(&info);
        if sent {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }
}

fn log_pulse(pulse: &DetectorPulse, pose: &TelemetrySample) {
    crate::log_info!(
        "Conf: {} Id: {:2} snr: {:5.1} noise_psd: {:5.1e} freq: {:9} lat/lon/yaw/alt: {:3.6} {:3.6} {:4.0} {:3.0}",
        pulse.confirmed_status as u32,
        pulse.tag_id as u32,
        pulse.snr,
        pulse.noise_psd,
        pulse.frequency_hz as u32,
        pose.position.lat,
        pose.position.lon,
        pose.attitude.yaw,
        pose.position.relative_altitude
    );
}

/// UDP pulse receiver running on its own thread
pub struct PulseRelay {
    local_addr: SocketAddr,
    forwarder: Arc<Forwarder>,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PulseRelay {
    /// Bind `listen` and start forwarding
    pub fn start(
        listen: SocketAddr,
        tunnel: TunnelSender,
        telemetry: Option<Arc<TelemetryTracker>>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(listen)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let forwarder = Arc::new(Forwarder {
            tunnel,
            telemetry,
            forwarded: AtomicU64::new(0),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let loop_forwarder = forwarder.clone();
        let loop_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("pulse-relay".into())
            .spawn(move || receive_loop(socket, &loop_forwarder, &loop_stop))?;

        crate::log_info!("Listening for detector pulses on {}", local_addr);
        Ok(Self {
            local_addr,
            forwarder,
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Pulses sent to the ground station so far
    pub fn forwarded(&self) -> u64 {
        self.forwarder.forwarded.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if handle.join().is_err() {
                crate::log_error!("Pulse relay thread panicked");
            }
        }
    }
}

impl Drop for PulseRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(socket: UdpSocket, forwarder: &Forwarder, stop: &AtomicBool) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                crate::log_trace!("{} byte pulse datagram from {}", len, from);
                forwarder.relay_datagram(&buf[..len]);
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                crate::log_warn!("Pulse receive error: {}", e);
                std::thread::sleep(RECV_TIMEOUT);
            }
        }
    }
    crate::log_debug!("Pulse relay exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::link::test_support::{mock_link, mock_link_with_gcs, sent_messages};
    use crate::communication::mavlink::state::PeerTracker;
    use crate::communication::mavlink::tunnel::tunnel_payload;
    use crate::parameters::TelemetryParams;
    use mavlink::common::{MavMessage, ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA};
    use mavlink::MavHeader;
    use std::time::Instant;
    use tag_controller_core::traits::{SystemClock, TimeSource};
    use tag_controller_core::tunnel::PulseInfo;

    fn pulse(tag_id: f64, start: f64) -> DetectorPulse {
        DetectorPulse {
            tag_id,
            frequency_hz: 146_000_000.0,
            start_time_seconds: start,
            snr: 20.0,
            confirmed_status: 1.0,
            noise_psd: 1e-9,
            ..DetectorPulse::default()
        }
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_pulses_forwarded_with_pose() {
        let (link, transport) = mock_link_with_gcs();
        let autopilot = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: 0,
        };
        let peers = Arc::new(PeerTracker::new());
        peers.on_heartbeat(&autopilot, &HEARTBEAT_DATA::default(), 0);
        let tracker = TelemetryTracker::new(TelemetryParams::default(), peers);
        tracker.on_attitude(
            &autopilot,
            &ATTITUDE_DATA {
                yaw: std::f32::consts::PI,
                ..ATTITUDE_DATA::default()
            },
        );
        tracker.on_global_position(&GLOBAL_POSITION_INT_DATA {
            lat: 324_000_000,
            lon: -1_108_000_000,
            relative_alt: 30_000,
            ..GLOBAL_POSITION_INT_DATA::default()
        });
        tracker.sample().unwrap();

        let relay = PulseRelay::start(loopback(), TunnelSender::new(link.clone()), Some(tracker)).unwrap();
        let now = SystemClock.now_secs();
        let mut datagram = pulse(2.0, now).encode();
        datagram.extend(pulse(3.0, now).encode());
        datagram.extend_from_slice(&[0u8; 7]);

        let sender = UdpSocket::bind(loopback()).unwrap();
        sender.send_to(&datagram, relay.local_addr()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while relay.forwarded() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        relay.stop();
        assert_eq!(relay.forwarded(), 2);

        let pulses: Vec<PulseInfo> = sent_messages(&link, &transport)
            .into_iter()
            .filter_map(|(_, msg)| match msg {
                MavMessage::TUNNEL(t) => PulseInfo::decode(tunnel_payload(&t)).ok(),
                _ => None,
            })
            .collect();
        assert_eq!(pulses.len(), 2);
        assert_eq!(pulses[0].tag_id, 2);
        assert_eq!(pulses[1].tag_id, 3);
        assert!((pulses[0].position_x - 32.4).abs() < 1e-9);
        assert!((pulses[0].position_z - 30.0).abs() < 1e-9);
        assert!((pulses[0].orientation_z - 180.0).abs() < 1e-4);
    }

    #[test]
    fn test_pulse_without_telemetry_has_zero_pose() {
        let (link, transport) = mock_link_with_gcs();
        let forwarder = Forwarder {
            tunnel: TunnelSender::new(link.clone()),
            telemetry: None,
            forwarded: AtomicU64::new(0),
        };
        assert_eq!(forwarder.relay_datagram(&pulse(4.0, 10.0).encode()), 1);

        let (_, msg) = sent_messages(&link, &transport).pop().unwrap();
        let MavMessage::TUNNEL(t) = msg else {
            panic!("expected TUNNEL");
        };
        let info = PulseInfo::decode(tunnel_payload(&t)).unwrap();
        assert_eq!(info.tag_id, 4);
        assert_eq!(info.position_x, 0.0);
        assert_eq!(info.orientation_z, 0.0);
    }

    #[test]
    fn test_no_gcs_means_nothing_forwarded() {
        let (link, _transport) = mock_link();
        let forwarder = Forwarder {
            tunnel: TunnelSender::new(link),
            telemetry: None,
            forwarded: AtomicU64::new(0),
        };
        assert_eq!(forwarder.relay_datagram(&pulse(4.0, 10.0).encode()), 0);
        assert_eq!(forwarder.relay_datagram(&[0u8; 10]), 0);
        assert_eq!(forwarder.forwarded.load(Ordering::Relaxed), 0);
    }
}
