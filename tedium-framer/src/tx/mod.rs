//! Host to trunk: OUT transfers into FIFO pages, pages into timeslots,
//! timeslots into bits.

mod fifo_to_framer;
mod serializer;
mod usb_to_fifo;

pub use fifo_to_framer::TxFifoToFramer;
pub use serializer::{BitSerializer, TxLine, TX_SYNC_DELAY_BITS};
pub use usb_to_fifo::{OutEvent, OutTransferSummary, TxUsbToFifo};
