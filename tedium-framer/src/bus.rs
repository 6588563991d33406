//! Microprocessor bus to the framer's register file.
//!
//! [`BusController`] runs one timed transaction at a time over a parallel
//! bus: chip select, then RD or WR after a fixed delay, then a wait for the
//! peripheral's ready handshake. The far side of the bus is anything that
//! implements [`PeripheralBus`].

use core::marker::PhantomData;

use modular_bitfield_msb::prelude::*;
use tracing::{trace, warn};

use crate::config::BusTiming;
use crate::error::{Error, Result};

pub type RegisterAddress = u16;
pub type RegisterValue = u8;

/// First address past the 15-bit bus.
pub const ADDRESS_LIMIT: RegisterAddress = 1 << 15;

/// Output lines driven by the controller.
#[bitfield(bits=32)]
#[derive(Copy, Clone, Debug)]
pub struct BusLines {
    #[skip] __: B3,
    pub reset: bool,
    pub addr: B15,
    pub data_o: B8,
    pub cs: bool,
    pub ale: bool,
    pub rd: bool,
    pub wr: bool,
    pub data_oe: bool,
}

/// Lines sampled by the controller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusInputs {
    pub rdy: bool,
    pub data: RegisterValue,
}

pub trait PeripheralBus {
    /// Advance the peripheral by one controller clock, given the lines the
    /// controller is driving during that clock.
    fn clock(&mut self, lines: BusLines) -> BusInputs;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusState {
    Idle,
    AssertAddress,
    AssertStrobe,
    WaitReady,
    SettleAfterReady,
}

pub struct BusController<P> {
    peripheral: P,
    timing: BusTiming,
    state: BusState,
    lines: BusLines,
    pending: bool,
    address: RegisterAddress,
    data_wr: RegisterValue,
    write: bool,
    data_rd: RegisterValue,
    countdown: u32,
    waited: u64,
    cycles: u64,
}

impl<P: PeripheralBus> BusController<P> {
    pub fn new(peripheral: P, timing: BusTiming) -> Self {
        Self {
            peripheral,
            timing,
            state: BusState::Idle,
            lines: BusLines::new().with_ale(true),
            pending: false,
            address: 0,
            data_wr: 0,
            write: false,
            data_rd: 0,
            countdown: 0,
            waited: 0,
            cycles: 0,
        }
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn lines(&self) -> BusLines {
        self.lines
    }

    pub fn busy(&self) -> bool {
        self.pending || self.state != BusState::Idle
    }

    /// Controller clocks elapsed since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn set_reset(&mut self, asserted: bool) {
        self.lines.set_reset(asserted);
    }

    /// Queue a transaction. It is latched on the next clock.
    pub fn start(&mut self, address: RegisterAddress, data: RegisterValue, write: bool) -> Result<()> {
        if self.busy() {
            return Err(Error::BusBusy);
        }
        if address >= ADDRESS_LIMIT {
            return Err(Error::AddressOutOfRange(address));
        }

        self.address = address;
        self.data_wr = data;
        self.write = write;
        self.pending = true;
        Ok(())
    }

    fn release(&mut self) {
        self.lines.set_cs(false);
        self.lines.set_rd(false);
        self.lines.set_wr(false);
        self.lines.set_data_oe(false);
    }

    /// Run one controller clock. Returns the captured data on the clock
    /// the transaction completes.
    pub fn clock(&mut self) -> Result<Option<RegisterValue>> {
        let inputs = self.peripheral.clock(self.lines);
        self.cycles += 1;

        match self.state {
            BusState::Idle => {
                if self.pending {
                    self.pending = false;
                    self.lines.set_addr(self.address);
                    self.state = BusState::AssertAddress;
                }
            },
            BusState::AssertAddress => {
                self.lines.set_cs(true);
                self.lines.set_data_o(self.data_wr);
                self.lines.set_data_oe(self.write);
                self.countdown = self.timing.strobe_delay_cycles;
                self.state = BusState::AssertStrobe;
            },
            BusState::AssertStrobe => {
                if self.countdown > 0 {
                    self.countdown -= 1;
                } else {
                    self.lines.set_rd(!self.write);
                    self.lines.set_wr(self.write);
                    self.countdown = self.timing.ready_delay_cycles;
                    self.waited = 0;
                    self.state = BusState::WaitReady;
                }
            },
            BusState::WaitReady => {
                if self.countdown > 0 {
                    self.countdown -= 1;
                } else if inputs.rdy {
                    self.data_rd = inputs.data;
                    self.release();
                    self.state = BusState::SettleAfterReady;
                } else {
                    self.waited += 1;
                    if let Some(limit) = self.timing.ready_timeout_cycles {
                        if self.waited >= limit {
                            self.release();
                            self.state = BusState::Idle;
                            warn!(address = self.address, cycles = self.waited, "bus ready timeout");
                            return Err(Error::BusTimeout { address: self.address, cycles: self.waited });
                        }
                    }
                }
            },
            BusState::SettleAfterReady => {
                if !inputs.rdy {
                    self.state = BusState::Idle;
                    trace!(address = self.address, write = self.write, data_wr = self.data_wr, data_rd = self.data_rd, "bus transaction");
                    return Ok(Some(self.data_rd));
                }
            },
        }

        Ok(None)
    }

    /// Run a transaction to completion.
    ///
    /// Without a ready timeout this does not return until the peripheral
    /// answers.
    pub fn execute(&mut self, address: RegisterAddress, data: RegisterValue, write: bool) -> Result<RegisterValue> {
        self.start(address, data, write)?;
        loop {
            if let Some(value) = self.clock()? {
                return Ok(value);
            }
        }
    }
}

///////////////////////////////////////////////////////////////////////

pub trait RegisterAccess {
    fn register_read(&mut self, address: RegisterAddress) -> Result<RegisterValue>;
    fn register_write(&mut self, address: RegisterAddress, value: RegisterValue) -> Result<()>;
}

impl<P: PeripheralBus> RegisterAccess for BusController<P> {
    fn register_read(&mut self, address: RegisterAddress) -> Result<RegisterValue> {
        self.execute(address, 0, false)
    }

    fn register_write(&mut self, address: RegisterAddress, value: RegisterValue) -> Result<()> {
        self.execute(address, value, true)?;
        Ok(())
    }
}

/// Typed access to one register.
pub struct Access<'a, D, T> {
    device: &'a mut D,
    address: RegisterAddress,
    t: PhantomData<T>,
}

impl<'a, D, T> Access<'a, D, T>
where D: RegisterAccess,
{
    pub fn new(device: &'a mut D, address: RegisterAddress) -> Self {
        Self {
            device,
            address,
            t: PhantomData::default(),
        }
    }
}

impl<D, T> Access<'_, D, T>
where D: RegisterAccess,
      T: From<u8>,
{
    pub fn read(&mut self) -> Result<T> {
        Ok(T::from(self.device.register_read(self.address)?))
    }
}

impl<D, T> Access<'_, D, T>
where D: RegisterAccess,
      T: From<u8> + Into<u8>,
{
    pub fn write<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(T) -> T,
    {
        let value = f(T::from(0));
        self.device.register_write(self.address, value.into())
    }

    pub fn modify<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(T) -> T,
    {
        let value = self.read()?;
        self.device.register_write(self.address, f(value).into())
    }
}
