use crate::timeslot::Timeslot;
use crate::timing::{BitState, FrameGeometry};

/// The framer is told to start its frame this many bits before the system
/// frame, so each timeslot is fully shifted in by the time the system
/// timeslot it belongs to begins.
pub const RX_SYNC_LEAD_BITS: usize = 8;

/// Levels on one channel's receive serial interface for one bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RxLine {
    pub ser: bool,
    pub crcsync: bool,
    pub casync: bool,
}

pub struct BitDeserializer {
    sync_bit: usize,
    enabled: bool,
    ser_shifter: u8,
    crcsync_shifter: u8,
    casync: bool,
    timeslot: Timeslot,
}

impl BitDeserializer {
    pub fn new(geometry: FrameGeometry, enabled: bool) -> Self {
        Self {
            sync_bit: geometry.bits_per_frame() - RX_SYNC_LEAD_BITS,
            enabled,
            ser_shifter: 0,
            crcsync_shifter: 0,
            casync: false,
            timeslot: Timeslot::default(),
        }
    }

    /// RX frame sync to drive toward the framer during the bit in progress.
    pub fn sync(&self, current: &BitState) -> bool {
        self.enabled && current.bit_in_frame == self.sync_bit
    }

    /// Most recent complete timeslot, with the F and multiframe bits of the
    /// last complete frame.
    pub fn timeslot(&self) -> Timeslot {
        self.timeslot
    }

    /// Last sampled CAS sync level. Captured, not otherwise interpreted.
    pub fn casync(&self) -> bool {
        self.casync
    }

    /// Sample the lines at the end of the bit described by `ended`.
    pub fn bit_end(&mut self, ended: &BitState, line: RxLine) {
        let ser_shifted = (self.ser_shifter << 1) | line.ser as u8;
        let crcsync_shifted = (self.crcsync_shifter << 1) | line.crcsync as u8;
        self.ser_shifter = ser_shifted;
        self.crcsync_shifter = crcsync_shifted;
        self.casync = line.casync;

        if ended.f_bit || (ended.timeslot_ls_bit ^ ended.frame_last_bit) {
            self.timeslot.data = ser_shifted;
        }

        if ended.frame_last_bit {
            // The framer's F bit went by seven bits ago.
            self.timeslot.f = ser_shifted & 0x80 != 0;
            self.timeslot.mf = crcsync_shifted & 0x80 != 0;
        }
    }
}
