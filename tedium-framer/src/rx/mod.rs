//! Trunk to host: bits into timeslots, timeslots into FIFO pages, pages
//! into IN transfers.

mod deserializer;
mod fifo_to_usb;
mod framer_to_fifo;

pub use deserializer::{BitDeserializer, RxLine, RX_SYNC_LEAD_BITS};
pub use fifo_to_usb::RxFifoToUsb;
pub use framer_to_fifo::RxFramerToFifo;
