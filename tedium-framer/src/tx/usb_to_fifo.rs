use bytemuck::Zeroable;
use tracing::debug;

use crate::fifo::{PageAdvance, PageWriter};
use crate::report::Report;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Report,
    Frame,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutEvent {
    ReportComplete,
    PageCommitted(PageAdvance),
}

/// What one OUT transfer delivered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OutTransferSummary {
    pub report_complete: bool,
    pub pages: usize,
    /// Bytes of an unfinished page, dropped at the next poll.
    pub partial_bytes: usize,
}

/// Unpacks OUT transfers: a report header, then zero or more whole pages.
pub struct TxUsbToFifo<R> {
    writer: PageWriter,
    state: State,
    address: usize,
    holding: R,
    report: R,
    pages: usize,
    discarded_count: u64,
}

impl<R: Report> TxUsbToFifo<R> {
    pub fn new(writer: PageWriter) -> Self {
        let mut usb_to_fifo = Self {
            writer,
            state: State::Report,
            address: 0,
            holding: Zeroable::zeroed(),
            report: Zeroable::zeroed(),
            pages: 0,
            discarded_count: 0,
        };
        usb_to_fifo.expect_report();
        usb_to_fifo
    }

    pub fn writer(&self) -> &PageWriter {
        &self.writer
    }

    /// Header of the most recent transfer that carried a complete one.
    pub fn report(&self) -> &R {
        &self.report
    }

    /// Transfers whose header or last page was cut short.
    pub fn discarded_count(&self) -> u64 {
        self.discarded_count
    }

    fn expect_report(&mut self) {
        self.address = 0;
        self.pages = 0;
        if R::LENGTH > 0 {
            self.state = State::Report;
        } else {
            self.state = State::Frame;
        }
    }

    pub fn start_of_frame(&mut self) {
        if self.address != 0 {
            self.discarded_count += 1;
            debug!(state = ?self.state, address = self.address, "OUT partial data discarded");
        }
        self.expect_report();
    }

    pub fn push_byte(&mut self, value: u8) -> Option<OutEvent> {
        match self.state {
            State::Report => {
                self.holding.as_bytes_mut()[self.address] = value;
                self.address += 1;

                if self.address == R::LENGTH {
                    self.report = self.holding;
                    self.address = 0;
                    self.state = State::Frame;
                    return Some(OutEvent::ReportComplete);
                }
            },
            State::Frame => {
                self.writer.write_byte(self.address, value);
                self.address += 1;

                if self.address == self.writer.page_size() {
                    self.address = 0;
                    self.pages += 1;
                    return Some(OutEvent::PageCommitted(self.writer.advance()));
                }
            },
        }

        None
    }

    pub fn end_of_transfer(&mut self) -> OutTransferSummary {
        OutTransferSummary {
            report_complete: self.state == State::Frame,
            pages: self.pages,
            partial_bytes: self.address,
        }
    }

    /// Handle one whole transfer delivered at a poll.
    pub fn receive(&mut self, packet: &[u8]) -> OutTransferSummary {
        self.start_of_frame();
        for &value in packet {
            self.push_byte(value);
        }
        self.end_of_transfer()
    }
}
