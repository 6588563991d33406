//! A software stand-in for the framer chip.
//!
//! On the microprocessor bus it is a flat register file that answers each
//! strobe after a fixed number of clocks. On the serial side each channel
//! can loop its transmit frames back to receive, which is what the
//! framer's local loopback does.

use std::collections::VecDeque;

use tedium_framer::bus::{BusInputs, BusLines, PeripheralBus, RegisterAddress, RegisterValue, ADDRESS_LIMIT};
use tedium_framer::rx::RxLine;
use tedium_framer::tx::TxLine;
use tracing::trace;

use super::register::{channel_address, channel_defaults, FramerLoopback, LICR, DEVID_ADDRESS, DEVID_VALUE, LICR_OFFSET, REVID_ADDRESS, REVID_VALUE};

/// One channel's serial loopback path.
struct SerialLoopback {
    bits_per_frame: usize,
    capture: Option<Vec<bool>>,
    frames: VecDeque<Vec<bool>>,
    playback: VecDeque<bool>,
}

impl SerialLoopback {
    /// Frames held between TX and RX before the oldest is dropped.
    const FRAMES_MAX: usize = 4;

    fn new(bits_per_frame: usize) -> Self {
        Self {
            bits_per_frame,
            capture: None,
            frames: VecDeque::new(),
            playback: VecDeque::new(),
        }
    }

    fn clear(&mut self) {
        self.capture = None;
        self.frames.clear();
        self.playback.clear();
    }

    fn transmit(&mut self, line: TxLine) {
        if line.sync {
            self.capture = Some(Vec::with_capacity(self.bits_per_frame));
        }

        if let Some(capture) = &mut self.capture {
            capture.push(line.ser);
            if capture.len() == self.bits_per_frame {
                if let Some(frame) = self.capture.take() {
                    if self.frames.len() == Self::FRAMES_MAX {
                        self.frames.pop_front();
                    }
                    self.frames.push_back(frame);
                }
            }
        }
    }

    fn receive(&mut self, sync: bool) -> bool {
        if sync {
            self.playback = self.frames.pop_front().unwrap_or_default().into();
        }
        // An idle line reads as all ones.
        self.playback.pop_front().unwrap_or(true)
    }
}

pub struct EmulatedFramer {
    registers: Vec<RegisterValue>,
    ready_latency: u32,
    counter: u32,
    ready: bool,
    data: RegisterValue,
    channels: Vec<SerialLoopback>,
    transactions: u64,
}

impl EmulatedFramer {
    pub fn new(channels: usize, bits_per_frame: usize, ready_latency: u32) -> Self {
        let mut framer = Self {
            registers: vec![0; ADDRESS_LIMIT as usize],
            ready_latency,
            counter: 0,
            ready: false,
            data: 0,
            channels: (0..channels).map(|_| SerialLoopback::new(bits_per_frame)).collect(),
            transactions: 0,
        };
        framer.reset();
        framer
    }

    fn reset(&mut self) {
        self.registers.iter_mut().for_each(|r| *r = 0);
        for channel in 0..self.channels.len() {
            for (offset, value) in channel_defaults() {
                self.registers[channel_address(channel, offset) as usize] = value;
            }
        }
        self.registers[DEVID_ADDRESS as usize] = DEVID_VALUE;
        self.registers[REVID_ADDRESS as usize] = REVID_VALUE;

        for channel in self.channels.iter_mut() {
            channel.clear();
        }
    }

    /// Completed bus reads and writes.
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    pub fn loopback(&self, channel: usize) -> FramerLoopback {
        let address = channel_address(channel, LICR_OFFSET) as usize;
        LICR::from(self.registers[address]).loopback()
    }

    /// Receive lines for the bit in progress. `sync` is the RX frame sync
    /// the framer is being driven with.
    pub fn rx_lines(&mut self, sync: bool, rx: &mut [RxLine]) {
        for (index, line) in rx.iter_mut().enumerate() {
            let loopback = self.loopback(index);
            let channel = &mut self.channels[index];
            let ser = channel.receive(sync);
            line.ser = match loopback {
                FramerLoopback::Local => ser,
                _ => true,
            };
        }
    }

    /// Transmit lines driven during the bit just retired.
    pub fn tx_lines(&mut self, tx: &[TxLine]) {
        for (index, line) in tx.iter().enumerate() {
            if self.loopback(index) == FramerLoopback::Local {
                self.channels[index].transmit(*line);
            }
        }
    }
}

impl PeripheralBus for EmulatedFramer {
    fn clock(&mut self, lines: BusLines) -> BusInputs {
        if lines.reset() {
            self.reset();
        }

        let strobe = lines.cs() && (lines.rd() || lines.wr());
        if !strobe {
            self.counter = 0;
            self.ready = false;
        } else if !self.ready {
            if self.counter >= self.ready_latency {
                let address: RegisterAddress = lines.addr();
                if lines.wr() {
                    self.registers[address as usize] = lines.data_o();
                } else {
                    self.data = self.registers[address as usize];
                }
                self.ready = true;
                self.transactions += 1;
                trace!(address, write = lines.wr(), value = self.registers[address as usize], "framer register");
            } else {
                self.counter += 1;
            }
        }

        BusInputs {
            rdy: self.ready,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tedium_framer::bus::{Access, BusController, RegisterAccess};
    use tedium_framer::BusTiming;

    fn controller() -> BusController<EmulatedFramer> {
        BusController::new(EmulatedFramer::new(2, 25, 3), BusTiming::default())
    }

    #[test]
    fn identifies_itself() {
        let mut bus = controller();
        assert_eq!(bus.register_read(DEVID_ADDRESS).unwrap(), DEVID_VALUE);
        assert_eq!(bus.register_read(REVID_ADDRESS).unwrap(), REVID_VALUE);
        assert_eq!(bus.peripheral().transactions(), 2);
    }

    #[test]
    fn loopback_selected_over_bus() {
        let mut bus = controller();
        assert_eq!(bus.peripheral().loopback(1), FramerLoopback::No);

        Access::<_, LICR>::new(&mut bus, channel_address(1, LICR_OFFSET))
            .modify(|r| r.with_loopback(FramerLoopback::Local))
            .unwrap();

        assert_eq!(bus.peripheral().loopback(0), FramerLoopback::No);
        assert_eq!(bus.peripheral().loopback(1), FramerLoopback::Local);

        // The other bits survive the read-modify-write.
        let licr: LICR = Access::new(&mut bus, channel_address(1, LICR_OFFSET)).read().unwrap();
        assert!(licr.encode_b8zs());
    }

    #[test]
    fn local_loopback_replays_at_sync() {
        let mut framer = EmulatedFramer::new(1, 3, 0);
        framer.registers[channel_address(0, LICR_OFFSET) as usize] =
            LICR::new().with_loopback(FramerLoopback::Local).into();

        let frame = [true, false, true];
        for (n, &ser) in frame.iter().enumerate() {
            framer.tx_lines(&[TxLine { ser, sync: n == 0, msync: false }]);
        }

        let mut rx = [RxLine::default()];
        let mut received = Vec::new();
        for n in 0..5 {
            framer.rx_lines(n == 1, &mut rx);
            received.push(rx[0].ser);
        }

        assert_eq!(received, vec![true, true, false, true, true]);
    }

    #[test]
    fn idles_without_loopback() {
        let mut framer = EmulatedFramer::new(1, 3, 0);
        framer.tx_lines(&[TxLine { ser: false, sync: true, msync: false }]);

        let mut rx = [RxLine::default()];
        framer.rx_lines(true, &mut rx);
        assert!(rx[0].ser);
    }
}
