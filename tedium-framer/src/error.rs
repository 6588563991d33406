use thiserror::Error;

use crate::bus::RegisterAddress;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration needs at least one channel")]
    NoChannels,
    #[error("configuration needs at least one timeslot per frame")]
    NoTimeslots,
    #[error("FIFO depth {0} is not a power of two of at least 2 pages")]
    FifoDepth(usize),
    #[error("FIFO pages must hold at least one byte")]
    PageSize,
    #[error("multiframe length must be at least one frame")]
    MultiframeLength,
    #[error("bus transaction already in flight")]
    BusBusy,
    #[error("register address {0:#06x} does not fit the 15-bit bus")]
    AddressOutOfRange(RegisterAddress),
    #[error("peripheral did not assert ready for {address:#06x} within {cycles} cycles")]
    BusTimeout { address: RegisterAddress, cycles: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
