use std::cmp::min;

use bytemuck::Zeroable;
use tracing::debug;

use crate::fifo::PageReader;
use crate::report::Report;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    WaitSof,
    Frame { pages_left: usize },
    Report,
}

/// Drains FIFO pages into IN transfers, one transfer per poll.
///
/// Each transfer carries up to two pages, oldest first, followed by a
/// snapshot of the poll report taken when the poll began.
pub struct RxFifoToUsb<R> {
    reader: PageReader,
    state: State,
    address: usize,
    report: R,
    abandoned_count: u64,
}

impl<R: Report> RxFifoToUsb<R> {
    pub const PAGES_PER_TRANSFER_MAX: usize = 2;

    pub fn new(reader: PageReader) -> Self {
        Self {
            reader,
            state: State::WaitSof,
            address: 0,
            report: Zeroable::zeroed(),
            abandoned_count: 0,
        }
    }

    pub fn reader(&self) -> &PageReader {
        &self.reader
    }

    /// Transfers cut short by the next poll.
    pub fn abandoned_count(&self) -> u64 {
        self.abandoned_count
    }

    /// Begin a transfer. Returns the number of bytes it will carry.
    pub fn start_of_frame(&mut self, report: &R) -> usize {
        if self.state != State::WaitSof {
            self.abandoned_count += 1;
            debug!(state = ?self.state, address = self.address, "IN transfer abandoned");
        }

        let pages = min(self.reader.level(), Self::PAGES_PER_TRANSFER_MAX);
        self.report = *report;
        self.address = 0;

        if pages > 0 {
            self.state = State::Frame { pages_left: pages };
        } else {
            self.enter_report();
        }

        pages * self.reader.page_size() + R::LENGTH
    }

    fn enter_report(&mut self) {
        self.address = 0;
        self.state = if R::LENGTH > 0 { State::Report } else { State::WaitSof };
    }

    /// Next byte of the transfer in progress.
    pub fn next_byte(&mut self) -> Option<u8> {
        match self.state {
            State::WaitSof => None,
            State::Frame { pages_left } => {
                let value = self.reader.read_byte(self.address);
                self.address += 1;

                if self.address == self.reader.page_size() {
                    self.reader.advance();
                    self.address = 0;
                    if pages_left > 1 {
                        self.state = State::Frame { pages_left: pages_left - 1 };
                    } else {
                        self.enter_report();
                    }
                }

                Some(value)
            },
            State::Report => {
                let value = self.report.as_bytes()[self.address];
                self.address += 1;

                if self.address == R::LENGTH {
                    self.address = 0;
                    self.state = State::WaitSof;
                }

                Some(value)
            },
        }
    }

    /// Begin a transfer and pull all of it.
    pub fn transfer(&mut self, report: &R) -> Vec<u8> {
        let length = self.start_of_frame(report);
        let mut packet = Vec::with_capacity(length);
        while let Some(value) = self.next_byte() {
            packet.push(value);
        }
        packet
    }
}
