//! Registers of the emulated framer that the simulator cares about.
//!
//! Channel registers sit at `0xN000 | offset`, N being the channel, so all
//! eight channels fit in the 15-bit bus address.

#![allow(clippy::upper_case_acronyms)]

use modular_bitfield_msb::prelude::*;

use tedium_framer::bus::RegisterAddress;

pub const CHANNELS_MAX: usize = 8;

pub const CSR_OFFSET: RegisterAddress = 0x100;
pub const LICR_OFFSET: RegisterAddress = 0x101;

pub const DEVID_ADDRESS: RegisterAddress = 0x01fe;
pub const REVID_ADDRESS: RegisterAddress = 0x01ff;

pub const DEVID_VALUE: u8 = 0x3a;
pub const REVID_VALUE: u8 = 0x01;

pub fn channel_address(channel: usize, offset: RegisterAddress) -> RegisterAddress {
    assert!(channel < CHANNELS_MAX);
    assert!(offset < 0x1000);
    ((channel as RegisterAddress) << 12) | offset
}

///////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, BitfieldSpecifier, Debug, PartialEq, Eq)]
#[bits=2]
pub enum ClockSource {
    Loop = 0b00,
    External = 0b01,
    Internal = 0b10,
    Reserved = 0b11,
}

/// Clock Select Register (CSR) - 0xN100
///
/// Only `clock_source` matters to the emulation; the serial clock is
/// always the simulator's.
#[bitfield(bits=8)]
#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub struct CSR {
    pub lcv_insert: bool,
    pub t1_mode: bool,
    pub sync_transmitters_to_8khz: bool,
    pub clock_loss_detect: bool,
    #[skip] __: B2,
    pub clock_source: ClockSource,
}

#[derive(Copy, Clone, BitfieldSpecifier, Debug, PartialEq, Eq)]
#[bits=2]
pub enum FramerLoopback {
    No = 0b00,

    /// Serial TX is returned on serial RX, realigned to RX sync.
    Local = 0b01,

    /// Line-side loopback. With no line attached, serial RX idles.
    FarEndRemoteLine = 0b10,

    /// Received payload is re-framed onto the line. Serial RX idles.
    Payload = 0b11,
}

/// Line Interface Control Register (LICR) - 0xN101
#[bitfield(bits=8)]
#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub struct LICR {
    pub force_los: bool,
    pub single_rail: bool,
    pub loopback: FramerLoopback,
    #[skip] __: B2,
    pub encode_b8zs: bool,
    pub decode_ami_b8zs: bool,
}

#[bitfield(bits=8)]
#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub struct DEVID {
    pub devid: B8,
}

#[bitfield(bits=8)]
#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub struct REVID {
    pub revid: B8,
}

/// Power-on contents of a channel's registers, T1 mode, loop timed.
pub fn channel_defaults() -> [(RegisterAddress, u8); 2] {
    [
        (CSR_OFFSET, CSR::new().with_t1_mode(true).with_clock_source(ClockSource::Loop).into()),
        (LICR_OFFSET, LICR::new().with_encode_b8zs(true).with_decode_ami_b8zs(true).into()),
    ]
}

///////////////////////////////////////////////////////////////////////
