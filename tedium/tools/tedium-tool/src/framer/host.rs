//! The host end of the packet stream, looping received frames back out.

use std::mem::size_of;

use bytemuck::bytes_of;
use ringbuf::{Consumer, Producer, RingBuffer};
use tedium_framer::report::{RxFrameReport, RxUsbReport, TxFrameReport, TxUsbReport};
use tracing::trace;

/// 40 frames == 5 milliseconds.
const QUEUE_FRAMES: usize = 40;

/// IN packets per TX FIFO level assessment, one transfer's worth.
const PACKETS_PER_TRANSFER: usize = 8;

/// Frames carried by one OUT packet, at most.
const FRAMES_PER_PACKET_MAX: usize = 2;

struct InternalFrame {
    payload: Vec<u8>,
    frame_count: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HostStats {
    pub packets_in: u64,
    pub frames_looped: u64,
    /// IN packets whose SOF count did not follow the previous one.
    pub sof_gaps: u64,
    /// RX frames whose frame count did not follow the previous one.
    pub frame_gaps: u64,
    /// RX frames lost because the loopback queue was full.
    pub queue_full: u64,
    /// Frames dropped to draw down the TX FIFO.
    pub frames_dropped: u64,
    pub malformed_packets: u64,
}

pub struct LoopbackHost {
    payload_size: usize,
    frames_in: Producer<InternalFrame>,
    frames_out: Consumer<InternalFrame>,
    sof_count_next: Option<u32>,
    frame_count_next: Option<u32>,
    out_frame_count: u32,
    tx_fifo_level_limit: u8,
    tx_fifo_level_min: u8,
    transfer_level_min: u8,
    transfer_packets: usize,
    stats: HostStats,
}

impl LoopbackHost {
    /// `tx_fifo_level_limit` is the TX FIFO fill above which a frame is
    /// dropped instead of sent.
    pub fn new(payload_size: usize, tx_fifo_level_limit: u8) -> Self {
        let (producer, consumer) = RingBuffer::new(QUEUE_FRAMES).split();
        Self {
            payload_size,
            frames_in: producer,
            frames_out: consumer,
            sof_count_next: None,
            frame_count_next: None,
            out_frame_count: 0,
            tx_fifo_level_limit,
            tx_fifo_level_min: 0,
            transfer_level_min: u8::MAX,
            transfer_packets: 0,
            stats: HostStats::default(),
        }
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    fn rx_page_size(&self) -> usize {
        self.payload_size + size_of::<RxFrameReport>()
    }

    pub fn packet_in(&mut self, packet: &[u8]) {
        self.stats.packets_in += 1;

        if packet.len() < size_of::<RxUsbReport>()
            || (packet.len() - size_of::<RxUsbReport>()) % self.rx_page_size() != 0 {
            self.stats.malformed_packets += 1;
            trace!(length = packet.len(), "IN: bad packet length");
            return;
        }

        let (pages, usb_report) = packet.split_at(packet.len() - size_of::<RxUsbReport>());
        let usb_report = *bytemuck::from_bytes::<RxUsbReport>(usb_report);

        // Check that the start-of-frame count is sequential.
        let sof_count = usb_report.sof_count;
        if let Some(expected) = self.sof_count_next {
            if sof_count != expected {
                self.stats.sof_gaps += 1;
                trace!(expected, sof_count, "IN: SOF gap");
            }
        }
        self.sof_count_next = Some(sof_count.wrapping_add(1));

        self.transfer_level_min = self.transfer_level_min.min(usb_report.fifo_tx_level);
        self.transfer_packets += 1;
        if self.transfer_packets == PACKETS_PER_TRANSFER {
            self.tx_fifo_level_min = self.transfer_level_min;
            self.transfer_level_min = u8::MAX;
            self.transfer_packets = 0;
        }

        for page in pages.chunks_exact(self.rx_page_size()) {
            let (payload, report) = page.split_at(self.payload_size);
            let report = *bytemuck::from_bytes::<RxFrameReport>(report);
            let frame_count = report.frame_count;

            if let Some(expected) = self.frame_count_next {
                if frame_count != expected {
                    self.stats.frame_gaps += 1;
                    trace!(expected, frame_count, "IN: frame gap");
                }
            }
            self.frame_count_next = Some(frame_count.wrapping_add(1));

            let frame = InternalFrame {
                payload: payload.to_vec(),
                frame_count,
            };
            if self.frames_in.push(frame).is_err() {
                self.stats.queue_full += 1;
            }
        }
    }

    pub fn packet_out(&mut self) -> Vec<u8> {
        if self.transfer_packets == 0 && self.tx_fifo_level_min > self.tx_fifo_level_limit {
            // Simple way to draw down the TX FIFO level if it's too high.
            if self.frames_out.pop().is_some() {
                self.stats.frames_dropped += 1;
                trace!(level = self.tx_fifo_level_min, "OUT: frame dropped");
            }
            self.tx_fifo_level_min = 0;
        }

        let frames = self.frames_out.len().min(FRAMES_PER_PACKET_MAX);

        let mut packet = Vec::with_capacity(
            size_of::<TxUsbReport>() + frames * (size_of::<TxFrameReport>() + self.payload_size)
        );
        packet.extend_from_slice(bytes_of(&TxUsbReport { frame_count: self.out_frame_count }));
        self.out_frame_count = self.out_frame_count.wrapping_add(1);

        for _ in 0..frames {
            if let Some(frame) = self.frames_out.pop() {
                packet.extend_from_slice(bytes_of(&TxFrameReport { frame_count: frame.frame_count }));
                packet.extend_from_slice(&frame.payload);
                self.stats.frames_looped += 1;
            }
        }

        packet
    }
}
