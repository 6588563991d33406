//! Threads that clock the two halves of the bridge in real time.

use std::thread;
use std::time::{Duration, Instant};

use audio_thread_priority::{promote_current_thread_to_real_time, RtPriorityHandle};
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use tedium_framer::bridge::{TransportLoop, TrunkLoop};
use tedium_framer::bus::{Access, BusController};
use tedium_framer::rx::RxLine;
use tedium_framer::tx::TxLine;
use tracing::{debug, debug_span, info, warn};

use crate::error::Result;

use super::emulator::EmulatedFramer;
use super::host::LoopbackHost;
use super::register::{channel_address, FramerLoopback, LICR, LICR_OFFSET};
use super::FramerEvent;

/// Nominal frame rate of both the trunk and the host's polling.
pub const FRAMES_PER_SECOND: u32 = 8000;

/// Frames between statistics events.
const REPORT_INTERVAL_FRAMES: u32 = FRAMES_PER_SECOND;

#[derive(Copy, Clone, Debug)]
pub struct PumpSettings {
    /// Clock offset from nominal, in parts per million.
    pub ppm: f64,
    pub realtime: bool,
}

/// Schedules one event per (slightly detuned) frame period.
struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    fn new(ppm: f64) -> Self {
        let rate = FRAMES_PER_SECOND as f64 * (1.0 + ppm * 1e-6);
        Self {
            period: Duration::from_secs_f64(1.0 / rate),
            next: Instant::now(),
        }
    }

    fn wait(&mut self) {
        self.next += self.period;

        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        } else if now - self.next > self.period * 64 {
            // Too far behind to catch up; start over from here.
            self.next = now;
        }
    }
}

fn promote(realtime: bool) -> Option<RtPriorityHandle> {
    if !realtime {
        return None;
    }

    match promote_current_thread_to_real_time(8, FRAMES_PER_SECOND) {
        Ok(handle) => {
            info!("promoted to real-time");
            Some(handle)
        },
        Err(e) => {
            warn!("real-time promotion failed: {e:?}");
            None
        },
    }
}

/// `true` once the stop sender has been dropped.
fn stopped(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

///////////////////////////////////////////////////////////////////////

pub fn pump_trunk(
    mut trunk: TrunkLoop,
    mut bus: BusController<EmulatedFramer>,
    settings: PumpSettings,
    stop: Receiver<()>,
    events: Sender<FramerEvent>,
) -> Result<()> {
    let _span = debug_span!("trunk").entered();

    for channel in 0..trunk.channels() {
        Access::<_, LICR>::new(&mut bus, channel_address(channel, LICR_OFFSET))
            .modify(|r| r.with_loopback(FramerLoopback::Local))?;
    }
    debug!(cycles = bus.cycles(), "framer local loopback enabled");

    let _priority = promote(settings.realtime);

    let bits_per_frame = trunk.geometry().bits_per_frame();
    let mut rx = vec![RxLine::default(); trunk.channels()];
    let mut tx = vec![TxLine::default(); trunk.channels()];

    let mut pacer = Pacer::new(settings.ppm);
    let mut frames = 0u32;

    while !stopped(&stop) {
        let framer = bus.peripheral_mut();
        for _ in 0..bits_per_frame {
            framer.rx_lines(trunk.rx_sync(), &mut rx);
            trunk.tick(&rx, &mut tx);
            framer.tx_lines(&tx);
        }

        frames += 1;
        if frames % REPORT_INTERVAL_FRAMES == 0 {
            let _ = events.send(FramerEvent::Trunk { timestamp: Instant::now(), stats: trunk.stats() });
        }

        pacer.wait();
    }

    Ok(())
}

pub fn pump_transport(
    mut transport: TransportLoop,
    mut host: LoopbackHost,
    settings: PumpSettings,
    stop: Receiver<()>,
    events: Sender<FramerEvent>,
) -> Result<()> {
    let _span = debug_span!("transport").entered();

    let _priority = promote(settings.realtime);

    let mut pacer = Pacer::new(settings.ppm);
    let mut polls = 0u32;

    while !stopped(&stop) {
        let packet_out = host.packet_out();
        let packet_in = transport.poll(&packet_out);
        host.packet_in(&packet_in);

        polls += 1;
        if polls % REPORT_INTERVAL_FRAMES == 0 {
            let timestamp = Instant::now();
            let _ = events.send(FramerEvent::Transport { timestamp, stats: transport.stats() });
            let _ = events.send(FramerEvent::Host { timestamp, stats: host.stats() });
        }

        pacer.wait();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crossbeam::channel::{bounded, unbounded};
    use tedium_framer::bridge::bridge;
    use tedium_framer::{BusTiming, FramerConfig};

    use crate::error::ToolError;

    #[test]
    fn pacer_rate_follows_ppm() {
        let fast = Pacer::new(100.0);
        let slow = Pacer::new(-100.0);
        assert!(fast.period < slow.period);

        let nominal = Pacer::new(0.0).period.as_nanos();
        assert!((124_999..=125_001).contains(&nominal));
    }

    #[test]
    fn trunk_fails_when_framer_does_not_answer() {
        let config = FramerConfig {
            bus: BusTiming { ready_timeout_cycles: Some(5), ..Default::default() },
            ..Default::default()
        };
        let (trunk, _transport) = bridge(&config).unwrap();
        let framer = EmulatedFramer::new(config.channels, config.geometry().bits_per_frame(), 100);
        let bus = BusController::new(framer, config.bus);

        let (_stop_sender, stop) = bounded::<()>(0);
        let (events, _receiver) = unbounded();
        let settings = PumpSettings { ppm: 0.0, realtime: false };

        let result = pump_trunk(trunk, bus, settings, stop, events);
        assert!(matches!(result, Err(ToolError::Framer(tedium_framer::Error::BusTimeout { .. }))));
    }

    #[test]
    fn stop_on_disconnect() {
        let (stop_sender, stop) = bounded::<()>(0);
        assert!(!stopped(&stop));
        drop(stop_sender);
        assert!(stopped(&stop));
    }
}
