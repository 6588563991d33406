use crate::timeslot::Timeslot;
use crate::timing::BitState;

/// TX frame sync trails the system frame by one timeslot: a timeslot's
/// byte is loaded at the end of the timeslot before it.
pub const TX_SYNC_DELAY_BITS: usize = 8;

/// Levels driven onto one channel's transmit serial interface for one bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TxLine {
    pub ser: bool,
    pub sync: bool,
    pub msync: bool,
}

pub struct BitSerializer {
    enabled: bool,
    shifter: u8,
}

impl BitSerializer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            shifter: 0,
        }
    }

    /// Lines to drive during the bit in progress.
    pub fn line(&self, current: &BitState, timeslot: &Timeslot) -> TxLine {
        if !self.enabled {
            return TxLine::default();
        }

        let sync = current.bit_in_frame == TX_SYNC_DELAY_BITS;
        TxLine {
            ser: self.shifter & 0x80 != 0,
            sync,
            msync: sync && timeslot.mf,
        }
    }

    /// Load or shift at the end of the bit described by `ended`.
    pub fn bit_end(&mut self, ended: &BitState, timeslot: &Timeslot) {
        self.shifter = if ended.timeslot_ls_bit {
            timeslot.data
        } else {
            (self.shifter << 1) | timeslot.f as u8
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::timing::{FrameGeometry, SystemTiming};

    fn decode(bits: &[bool]) -> (bool, Vec<u8>) {
        let bytes = bits[1..]
            .chunks_exact(8)
            .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8))
            .collect();
        (bits[0], bytes)
    }

    #[test]
    fn framer_sees_timeslots_after_sync() {
        let geometry = FrameGeometry::new(3);
        let mut timing = SystemTiming::new(geometry);
        let mut serializer = BitSerializer::new(true);
        let mut timeslot = Timeslot::default();
        let mut frame = 0u8;

        let mut lines = Vec::new();
        for _ in 0..5 * geometry.bits_per_frame() {
            lines.push(serializer.line(timing.state(), &timeslot));

            let edge = timing.bit_end();
            serializer.bit_end(&edge.ended, &timeslot);

            if edge.frame_strobe {
                frame += 1;
                timeslot.f = frame % 2 == 0;
                timeslot.mf = frame % 2 == 1;
            }
            if edge.started.timeslot_ls_bit {
                let t = edge.started.timeslot_in_frame as u8;
                timeslot.data = ((t + 1) << 4) | frame;
            }
        }

        let syncs: Vec<usize> = lines.iter().enumerate().filter(|(_, line)| line.sync).map(|(n, _)| n).collect();
        assert_eq!(syncs, vec![8, 33, 58, 83, 108]);

        let msyncs: Vec<bool> = syncs.iter().map(|&n| lines[n].msync).collect();
        assert_eq!(msyncs, vec![false, true, false, true, false]);

        let frames: Vec<_> = syncs.iter()
            .filter(|&&n| n + geometry.bits_per_frame() <= lines.len())
            .map(|&n| {
                let bits: Vec<bool> = lines[n..n + geometry.bits_per_frame()].iter().map(|line| line.ser).collect();
                decode(&bits)
            })
            .collect();

        assert_eq!(frames, vec![
            (false, vec![0x10, 0x20, 0x30]),
            (false, vec![0x11, 0x21, 0x31]),
            (true,  vec![0x12, 0x22, 0x32]),
            (false, vec![0x13, 0x23, 0x33]),
        ]);
    }

    #[test]
    fn disabled_drives_nothing() {
        let geometry = FrameGeometry::new(3);
        let mut timing = SystemTiming::new(geometry);
        let mut serializer = BitSerializer::new(false);
        let timeslot = Timeslot { data: 0xff, f: true, mf: true };

        for _ in 0..2 * geometry.bits_per_frame() {
            assert_eq!(serializer.line(timing.state(), &timeslot), TxLine::default());
            let edge = timing.bit_end();
            serializer.bit_end(&edge.ended, &timeslot);
        }
    }
}
