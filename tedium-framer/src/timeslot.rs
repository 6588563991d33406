/// One channel's share of the current timeslot, plus the per-frame
/// framing and multiframe bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeslot {
    pub data: u8,
    pub f: bool,
    pub mf: bool,
}

impl Timeslot {
    pub fn new(data: u8) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}

/// Channel-indexed timeslot registers shared by a chain's stages.
pub type Timeslots = Vec<Timeslot>;

pub fn timeslots(channels: usize) -> Timeslots {
    vec![Timeslot::default(); channels]
}
