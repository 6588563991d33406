use std::marker::PhantomData;

use crate::fifo::{PageAdvance, PageWriter};
use crate::report::Report;
use crate::timeslot::Timeslot;
use crate::timing::BitEdge;

/// Packs each frame's timeslots into one FIFO page.
///
/// Page layout is timeslot-major: channels 0..N-1 of timeslot 0, then of
/// timeslot 1, and so on, followed by the frame report.
pub struct RxFramerToFifo<R> {
    writer: PageWriter,
    address: usize,
    report: PhantomData<R>,
}

impl<R: Report> RxFramerToFifo<R> {
    pub fn new(writer: PageWriter) -> Self {
        Self {
            writer,
            address: 0,
            report: PhantomData,
        }
    }

    pub fn writer(&self) -> &PageWriter {
        &self.writer
    }

    /// Act on the start of the bit described by `edge.started`.
    ///
    /// Returns the result of the page advance on frame boundaries.
    pub fn bit_start(&mut self, edge: &BitEdge, timeslots: &[Timeslot], report: &R) -> Option<PageAdvance> {
        if edge.timeslot_start_strobe {
            if edge.started.timeslot_first {
                self.address = 0;
            }

            for timeslot in timeslots {
                self.writer.write_byte(self.address, timeslot.data);
                self.address += 1;
            }

            if edge.started.timeslot_last {
                self.writer.write(self.address, report.as_bytes());
                self.address += R::LENGTH;
            }
        }

        if edge.frame_strobe {
            Some(self.writer.advance())
        } else {
            None
        }
    }
}
