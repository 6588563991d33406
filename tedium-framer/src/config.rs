use std::mem::size_of;

use crate::error::{Error, Result};
use crate::report::{RxFrameReport, TxFrameReport};
use crate::timing::FrameGeometry;

/// Wait states for the microprocessor bus.
///
/// The defaults cover the framer's minimum CS-to-strobe and strobe-to-ready
/// pulse widths at a 60 MHz controller clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusTiming {
    /// Cycles between asserting chip select and asserting RD/WR.
    pub strobe_delay_cycles: u32,
    /// Cycles after asserting RD/WR before ready is sampled.
    pub ready_delay_cycles: u32,
    /// Give up on a transaction after this many cycles of waiting for ready.
    /// `None` waits forever.
    pub ready_timeout_cycles: Option<u64>,
}

impl Default for BusTiming {
    fn default() -> Self {
        Self {
            strobe_delay_cycles: 20,
            ready_delay_cycles: 20,
            ready_timeout_cycles: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramerConfig {
    pub channels: usize,
    pub timeslots_per_frame: usize,
    pub fifo_depth_pages: usize,
    pub frames_per_multiframe: usize,
    /// Drive the TX serial lines and the RX sync output.
    pub outputs_enabled: bool,
    pub bus: BusTiming,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            timeslots_per_frame: 24,
            fifo_depth_pages: 16,
            frames_per_multiframe: 24,
            outputs_enabled: true,
            bus: BusTiming::default(),
        }
    }
}

impl FramerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::NoChannels);
        }
        if self.timeslots_per_frame == 0 {
            return Err(Error::NoTimeslots);
        }
        if self.fifo_depth_pages < 2 || !self.fifo_depth_pages.is_power_of_two() {
            return Err(Error::FifoDepth(self.fifo_depth_pages));
        }
        if self.frames_per_multiframe == 0 {
            return Err(Error::MultiframeLength);
        }
        Ok(())
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.timeslots_per_frame)
    }

    /// Payload bytes carried per frame across all channels.
    pub fn frame_payload_size(&self) -> usize {
        self.channels * self.timeslots_per_frame
    }

    pub fn rx_page_size(&self) -> usize {
        self.frame_payload_size() + size_of::<RxFrameReport>()
    }

    pub fn tx_page_size(&self) -> usize {
        size_of::<TxFrameReport>() + self.frame_payload_size()
    }
}
