//! The two halves of the bridge, one per concurrency domain.
//!
//! [`TrunkLoop`] is clocked once per trunk bit and [`TransportLoop`] once
//! per host poll. They share nothing but the RX and TX page FIFOs, so each
//! half can be moved to its own thread.

use tracing::{debug, trace};

use crate::config::FramerConfig;
use crate::error::Result;
use crate::fifo::{PageReader, PageWriter, PagedFifo};
use crate::report::{RxFrameReport, RxUsbReport, TxFrameReport, TxUsbReport};
use crate::rx::{BitDeserializer, RxFifoToUsb, RxFramerToFifo, RxLine};
use crate::timeslot::{timeslots, Timeslots};
use crate::timing::{BitState, FrameGeometry, SystemTiming};
use crate::tx::{BitSerializer, OutEvent, OutTransferSummary, TxFifoToFramer, TxLine, TxUsbToFifo};

/// Build both halves around a fresh pair of FIFOs.
pub fn bridge(config: &FramerConfig) -> Result<(TrunkLoop, TransportLoop)> {
    config.validate()?;

    let (rx_writer, rx_reader) = PagedFifo::new(config.rx_page_size(), config.fifo_depth_pages)?.split();
    let (tx_writer, tx_reader) = PagedFifo::new(config.tx_page_size(), config.fifo_depth_pages)?.split();

    debug!(?config, rx_page_size = config.rx_page_size(), tx_page_size = config.tx_page_size(), "bridge");

    Ok((
        TrunkLoop::new(config, rx_writer, tx_reader),
        TransportLoop::new(rx_reader, tx_writer),
    ))
}

///////////////////////////////////////////////////////////////////////

struct MultiframeCounter {
    length: usize,
    index: usize,
}

impl MultiframeCounter {
    fn new(length: usize) -> Self {
        Self {
            length,
            index: 0,
        }
    }

    /// Count a new frame. Returns `true` if it starts a multiframe.
    fn next_frame(&mut self) -> bool {
        let first = self.index == 0;
        self.index = (self.index + 1) % self.length;
        first
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrunkStats {
    pub frame_count: u32,
    pub rx_fifo_fill: usize,
    pub rx_fifo_overflow_count: u64,
    pub tx_fifo_underflow_count: u64,
    /// TX pages whose frame count did not follow the previous page's.
    pub tx_frame_slip_count: u64,
}

pub struct TrunkLoop {
    timing: SystemTiming,
    deserializers: Vec<BitDeserializer>,
    rx_timeslots: Timeslots,
    rx_framer_to_fifo: RxFramerToFifo<RxFrameReport>,
    rx_report: RxFrameReport,
    tx_fifo_to_framer: TxFifoToFramer<TxFrameReport>,
    tx_report: TxFrameReport,
    tx_timeslots: Timeslots,
    serializers: Vec<BitSerializer>,
    multiframe: MultiframeCounter,
    frame_count: u32,
    tx_frame_count_next: Option<u32>,
    tx_frame_slip_count: u64,
}

impl TrunkLoop {
    fn new(config: &FramerConfig, rx_writer: PageWriter, tx_reader: PageReader) -> Self {
        let geometry = config.geometry();

        Self {
            timing: SystemTiming::new(geometry),
            deserializers: (0..config.channels).map(|_| BitDeserializer::new(geometry, config.outputs_enabled)).collect(),
            rx_timeslots: timeslots(config.channels),
            rx_framer_to_fifo: RxFramerToFifo::new(rx_writer),
            rx_report: RxFrameReport::default(),
            tx_fifo_to_framer: TxFifoToFramer::new(tx_reader),
            tx_report: TxFrameReport::default(),
            tx_timeslots: timeslots(config.channels),
            serializers: (0..config.channels).map(|_| BitSerializer::new(config.outputs_enabled)).collect(),
            multiframe: MultiframeCounter::new(config.frames_per_multiframe),
            frame_count: 0,
            tx_frame_count_next: None,
            tx_frame_slip_count: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.deserializers.len()
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.timing.geometry()
    }

    /// Position of the bit in progress.
    pub fn state(&self) -> &BitState {
        self.timing.state()
    }

    /// RX frame sync toward the framer for the bit in progress, shared by
    /// all channels.
    pub fn rx_sync(&self) -> bool {
        self.deserializers.first().map(|d| d.sync(self.timing.state())).unwrap_or(false)
    }

    /// Retire one trunk bit.
    ///
    /// `rx` holds each channel's receive lines as sampled at the end of the
    /// bit in progress. `tx` is filled with the transmit lines driven
    /// during that bit.
    ///
    /// # Panics
    ///
    /// If either slice's length differs from [`TrunkLoop::channels`].
    pub fn tick(&mut self, rx: &[RxLine], tx: &mut [TxLine]) {
        assert_eq!(rx.len(), self.channels());
        assert_eq!(tx.len(), self.channels());

        let current = *self.timing.state();
        for ((line, serializer), timeslot) in tx.iter_mut().zip(&self.serializers).zip(&self.tx_timeslots) {
            *line = serializer.line(&current, timeslot);
        }

        let edge = self.timing.bit_end();

        for (deserializer, line) in self.deserializers.iter_mut().zip(rx) {
            deserializer.bit_end(&edge.ended, *line);
        }
        for (serializer, timeslot) in self.serializers.iter_mut().zip(&self.tx_timeslots) {
            serializer.bit_end(&edge.ended, timeslot);
        }

        if edge.frame_strobe {
            self.frame_count = self.frame_count.wrapping_add(1);
            self.rx_report = RxFrameReport {
                frame_count: self.frame_count,
                fifo_rx_overflow_count: self.rx_framer_to_fifo.writer().overflow_count() as u16,
                fifo_tx_underflow_count: self.tx_fifo_to_framer.reader().underflow_count() as u16,
            };

            // The framer generates its own F bits; both mark the multiframe start.
            let multiframe_start = self.multiframe.next_frame();
            for timeslot in self.tx_timeslots.iter_mut() {
                timeslot.f = multiframe_start;
                timeslot.mf = multiframe_start;
            }
        }

        if edge.timeslot_start_strobe {
            for (timeslot, deserializer) in self.rx_timeslots.iter_mut().zip(&self.deserializers) {
                *timeslot = deserializer.timeslot();
            }
        }

        self.rx_framer_to_fifo.bit_start(&edge, &self.rx_timeslots, &self.rx_report);

        if self.tx_fifo_to_framer.bit_start(&edge, &mut self.tx_timeslots, &mut self.tx_report) {
            self.check_tx_frame_count();
        }
    }

    fn check_tx_frame_count(&mut self) {
        let frame_count = self.tx_report.frame_count;
        if let Some(expected) = self.tx_frame_count_next {
            if frame_count != expected {
                self.tx_frame_slip_count += 1;
                trace!(expected, frame_count, "TX frame slip");
            }
        }
        self.tx_frame_count_next = Some(frame_count.wrapping_add(1));
    }

    pub fn stats(&self) -> TrunkStats {
        TrunkStats {
            frame_count: self.frame_count,
            rx_fifo_fill: self.rx_framer_to_fifo.writer().fill(),
            rx_fifo_overflow_count: self.rx_framer_to_fifo.writer().overflow_count(),
            tx_fifo_underflow_count: self.tx_fifo_to_framer.reader().underflow_count(),
            tx_frame_slip_count: self.tx_frame_slip_count,
        }
    }
}

///////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub sof_count: u32,
    pub rx_fifo_level: usize,
    pub tx_fifo_fill: usize,
    pub rx_fifo_underflow_count: u64,
    pub tx_fifo_overflow_count: u64,
    pub in_abandoned_count: u64,
    pub out_discarded_count: u64,
    /// OUT headers whose frame count did not follow the previous header's.
    pub out_frame_gap_count: u64,
}

pub struct TransportLoop {
    rx_fifo_to_usb: RxFifoToUsb<RxUsbReport>,
    tx_usb_to_fifo: TxUsbToFifo<TxUsbReport>,
    sof_count: u32,
    sequence_count: u8,
    out_frame_count_next: Option<u32>,
    out_frame_gap_count: u64,
}

impl TransportLoop {
    fn new(rx_reader: PageReader, tx_writer: PageWriter) -> Self {
        Self {
            rx_fifo_to_usb: RxFifoToUsb::new(rx_reader),
            tx_usb_to_fifo: TxUsbToFifo::new(tx_writer),
            sof_count: 0,
            sequence_count: 0,
            out_frame_count_next: None,
            out_frame_gap_count: 0,
        }
    }

    pub fn rx_page_size(&self) -> usize {
        self.rx_fifo_to_usb.reader().page_size()
    }

    pub fn tx_page_size(&self) -> usize {
        self.tx_usb_to_fifo.writer().page_size()
    }

    /// Begin a poll. Returns the length of the IN transfer.
    pub fn start_of_frame(&mut self) -> usize {
        let rx_reader = self.rx_fifo_to_usb.reader();
        let tx_writer = self.tx_usb_to_fifo.writer();

        let report = RxUsbReport {
            sof_count: self.sof_count,
            fifo_rx_level: rx_reader.level().min(u8::MAX as usize) as u8,
            fifo_tx_level: tx_writer.fill().min(u8::MAX as usize) as u8,
            fifo_rx_underflow_count: rx_reader.underflow_count() as u16,
            fifo_tx_overflow_count: tx_writer.overflow_count() as u16,
            sequence_count: self.sequence_count,
        };
        self.sof_count = self.sof_count.wrapping_add(1);

        self.tx_usb_to_fifo.start_of_frame();
        self.rx_fifo_to_usb.start_of_frame(&report)
    }

    pub fn in_byte(&mut self) -> Option<u8> {
        self.rx_fifo_to_usb.next_byte()
    }

    pub fn out_byte(&mut self, value: u8) {
        if let Some(OutEvent::ReportComplete) = self.tx_usb_to_fifo.push_byte(value) {
            self.sequence_count = self.sequence_count.wrapping_add(1);

            let frame_count = self.tx_usb_to_fifo.report().frame_count;
            if let Some(expected) = self.out_frame_count_next {
                if frame_count != expected {
                    self.out_frame_gap_count += 1;
                    trace!(expected, frame_count, "OUT header gap");
                }
            }
            self.out_frame_count_next = Some(frame_count.wrapping_add(1));
        }
    }

    pub fn end_of_transfer(&mut self) -> OutTransferSummary {
        self.tx_usb_to_fifo.end_of_transfer()
    }

    /// Pull the whole IN transfer for this poll.
    pub fn transmit_in(&mut self) -> Vec<u8> {
        let mut packet = Vec::new();
        while let Some(value) = self.in_byte() {
            packet.push(value);
        }
        packet
    }

    /// Push the whole OUT transfer for this poll.
    pub fn receive_out(&mut self, packet: &[u8]) -> OutTransferSummary {
        for &value in packet {
            self.out_byte(value);
        }
        self.end_of_transfer()
    }

    /// One complete poll: OUT data in, IN data back.
    pub fn poll(&mut self, packet_out: &[u8]) -> Vec<u8> {
        self.start_of_frame();
        self.receive_out(packet_out);
        self.transmit_in()
    }

    pub fn stats(&self) -> TransportStats {
        let rx_reader = self.rx_fifo_to_usb.reader();
        let tx_writer = self.tx_usb_to_fifo.writer();

        TransportStats {
            sof_count: self.sof_count,
            rx_fifo_level: rx_reader.level(),
            tx_fifo_fill: tx_writer.fill(),
            rx_fifo_underflow_count: rx_reader.underflow_count(),
            tx_fifo_overflow_count: tx_writer.overflow_count(),
            in_abandoned_count: self.rx_fifo_to_usb.abandoned_count(),
            out_discarded_count: self.tx_usb_to_fifo.discarded_count(),
            out_frame_gap_count: self.out_frame_gap_count,
        }
    }
}
