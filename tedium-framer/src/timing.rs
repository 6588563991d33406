//! Bit, timeslot and frame position on the trunk side.
//!
//! A frame is one F bit followed by `timeslots_per_frame` eight-bit
//! timeslots, MSB first. Position flags are registered: each call to
//! [`SystemTiming::bit_end`] reports both the bit that just ended and the
//! bit that is starting, so consumers can act on the side of the bit
//! boundary that matches the data they are looking at.

pub const BITS_PER_TIMESLOT: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    timeslots_per_frame: usize,
}

impl FrameGeometry {
    pub fn new(timeslots_per_frame: usize) -> Self {
        assert!(timeslots_per_frame > 0);
        Self {
            timeslots_per_frame,
        }
    }

    pub fn timeslots_per_frame(&self) -> usize {
        self.timeslots_per_frame
    }

    pub fn bits_per_frame(&self) -> usize {
        1 + self.timeslots_per_frame * BITS_PER_TIMESLOT
    }
}

///////////////////////////////////////////////////////////////////////

/// Turns the raw serial bit clock into bit-end/bit-start strobes.
///
/// The clock passes through a two-stage synchronizer before the falling
/// edge is detected, so `bit_end` trails the falling edge by two calls to
/// [`BitTiming::clock`]. `bit_start` follows `bit_end` by one call.
#[derive(Copy, Clone, Debug, Default)]
pub struct BitTiming {
    stage: [bool; 2],
    serclk_last: bool,
    bit_end_last: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BitStrobes {
    pub bit_end: bool,
    pub bit_start: bool,
}

impl BitTiming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clock(&mut self, serclk: bool) -> BitStrobes {
        let serclk_sync = self.stage[1];
        let bit_end = self.serclk_last && !serclk_sync;
        let strobes = BitStrobes {
            bit_end,
            bit_start: self.bit_end_last,
        };

        self.bit_end_last = bit_end;
        self.serclk_last = serclk_sync;
        self.stage = [serclk, self.stage[0]];

        strobes
    }
}

///////////////////////////////////////////////////////////////////////

/// Registered position flags for one bit period.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BitState {
    pub bit_in_frame: usize,
    /// Bit weight within the timeslot, 7 for the MSB down to 0 for the LSB.
    pub bit_in_timeslot: usize,
    pub timeslot_in_frame: usize,
    pub f_bit: bool,
    pub timeslot_ms_bit: bool,
    pub timeslot_ls_bit: bool,
    pub frame_last_bit: bool,
    pub timeslot_first: bool,
    pub timeslot_last: bool,
}

/// Everything that happens at one bit boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitEdge {
    /// Flags of the bit that just ended.
    pub ended: BitState,
    /// Flags of the bit that is starting.
    pub started: BitState,
    /// The ending bit was the last bit of a timeslot.
    pub timeslot_end_strobe: bool,
    /// The starting bit is the first bit of a timeslot.
    pub timeslot_start_strobe: bool,
    /// The starting bit is the F bit.
    pub frame_strobe: bool,
}

pub struct SystemTiming {
    geometry: FrameGeometry,
    state: BitState,
}

impl SystemTiming {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            state: BitState::default(),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Flags for the bit period currently in progress.
    pub fn state(&self) -> &BitState {
        &self.state
    }

    /// Retire the current bit and move to the next.
    pub fn bit_end(&mut self) -> BitEdge {
        let bit_count_last = self.geometry.bits_per_frame() - 1;
        let timeslot_last_index = self.geometry.timeslots_per_frame() - 1;

        let current = self.state;
        let bit_count = current.bit_in_frame;
        let bit_count_next = if bit_count == bit_count_last { 0 } else { bit_count + 1 };

        let f_bit_next = bit_count_next == 0;
        let timeslot_ms_bit_next = bit_count % BITS_PER_TIMESLOT == 0 && !f_bit_next;
        let timeslot_ls_bit_next = bit_count % BITS_PER_TIMESLOT == BITS_PER_TIMESLOT - 1;
        let frame_last_bit_next = bit_count + 1 == bit_count_last;

        let (timeslot_next, bit_in_timeslot_next) = if current.frame_last_bit {
            (0, 0)
        } else {
            (bit_count / BITS_PER_TIMESLOT, (bit_count % BITS_PER_TIMESLOT) ^ 7)
        };

        let mut next = BitState {
            bit_in_frame: bit_count_next,
            bit_in_timeslot: bit_in_timeslot_next,
            timeslot_in_frame: timeslot_next,
            f_bit: f_bit_next,
            timeslot_ms_bit: timeslot_ms_bit_next,
            timeslot_ls_bit: timeslot_ls_bit_next,
            frame_last_bit: frame_last_bit_next,
            timeslot_first: current.timeslot_first,
            timeslot_last: current.timeslot_last,
        };

        if timeslot_ms_bit_next {
            next.timeslot_first = timeslot_next == 0;
            next.timeslot_last = timeslot_next == timeslot_last_index;
        } else if f_bit_next {
            next.timeslot_last = timeslot_next == timeslot_last_index;
        }

        self.state = next;

        BitEdge {
            ended: current,
            started: next,
            timeslot_end_strobe: current.timeslot_ls_bit,
            timeslot_start_strobe: timeslot_ms_bit_next,
            frame_strobe: f_bit_next,
        }
    }
}
