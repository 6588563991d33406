use std::marker::PhantomData;

use crate::fifo::PageReader;
use crate::report::Report;
use crate::timeslot::Timeslot;
use crate::timing::BitEdge;

/// Feeds one FIFO page per frame to the serializers.
///
/// Page layout is the frame report followed by the payload, timeslot-major.
/// The report is refreshed at the frame boundary; each timeslot's bytes are
/// loaded during the last bit of the preceding timeslot.
pub struct TxFifoToFramer<R> {
    reader: PageReader,
    address: usize,
    report: PhantomData<R>,
}

impl<R: Report> TxFifoToFramer<R> {
    pub fn new(reader: PageReader) -> Self {
        Self {
            reader,
            address: 0,
            report: PhantomData,
        }
    }

    pub fn reader(&self) -> &PageReader {
        &self.reader
    }

    /// Act on the start of the bit described by `edge.started`.
    ///
    /// Returns `true` when `report` was refreshed from a new page.
    pub fn bit_start(&mut self, edge: &BitEdge, timeslots: &mut [Timeslot], report: &mut R) -> bool {
        if edge.frame_strobe {
            self.reader.advance();
            self.reader.read(0, report.as_bytes_mut());
            self.address = R::LENGTH;
            return true;
        }

        if edge.started.timeslot_ls_bit {
            for timeslot in timeslots.iter_mut() {
                timeslot.data = self.reader.read_byte(self.address);
                self.address += 1;
            }
        }

        false
    }
}
