use std::time::Instant;

use tedium_framer::bridge::{TransportStats, TrunkStats};

use self::host::HostStats;

pub mod dump;
pub mod emulator;
pub mod host;
pub mod pump;
pub mod register;

#[derive(Copy, Clone, Debug)]
pub enum FramerEvent {
    Trunk { timestamp: Instant, stats: TrunkStats },
    Transport { timestamp: Instant, stats: TransportStats },
    Host { timestamp: Instant, stats: HostStats },
    /// A loop thread has returned, with or without error.
    Exited(&'static str),
}
