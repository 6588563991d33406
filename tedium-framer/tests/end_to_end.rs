use std::collections::VecDeque;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use tedium_framer::bridge::bridge;
use tedium_framer::fifo::PagedFifo;
use tedium_framer::report::{Report, RxFrameReport, RxUsbReport, TxFrameReport, TxUsbReport};
use tedium_framer::rx::{BitDeserializer, RxFifoToUsb, RxFramerToFifo, RxLine};
use tedium_framer::timeslot::{timeslots, Timeslot};
use tedium_framer::timing::{FrameGeometry, SystemTiming};
use tedium_framer::tx::{BitSerializer, TxFifoToFramer, TxLine, TxUsbToFifo};
use tedium_framer::FramerConfig;

const CHANNELS: usize = 8;

#[derive(Copy, Clone, Debug, Default)]
#[repr(packed)]
struct MockReport {
    field_0: u8,
    field_1: u16,
}

unsafe impl Zeroable for MockReport {}
unsafe impl Pod for MockReport {}

/// Bits of one framer frame as they appear on a serial line, F bit first.
fn frame_bits(f: bool, timeslots: &[u8]) -> Vec<bool> {
    let mut bits = vec![f];
    for &byte in timeslots {
        bits.extend((0..8).rev().map(|n| byte & (1 << n) != 0));
    }
    bits
}

/// Inverse of `frame_bits`.
fn decode_frame(bits: &[bool]) -> (bool, Vec<u8>) {
    let bytes = bits[1..]
        .chunks_exact(8)
        .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8))
        .collect();
    (bits[0], bytes)
}

/// Receive side of a framer: starts a new frame, F bit first, whenever
/// sync is asserted, and idles high otherwise.
struct FramerRx<I> {
    frames: I,
    bits: VecDeque<bool>,
}

impl<I: Iterator<Item = Vec<bool>>> FramerRx<I> {
    fn new(frames: I) -> Self {
        Self {
            frames,
            bits: VecDeque::new(),
        }
    }

    fn next_bit(&mut self, sync: bool) -> bool {
        if sync {
            if let Some(frame) = self.frames.next() {
                self.bits = frame.into();
            }
        }
        self.bits.pop_front().unwrap_or(true)
    }
}

/// A framer in local loopback: each frame sent on TX, aligned to TX sync,
/// comes back on RX at the next RX sync.
struct FramerLoopback {
    bits_per_frame: usize,
    capture: Option<Vec<bool>>,
    frames: VecDeque<Vec<bool>>,
    playback: VecDeque<bool>,
}

impl FramerLoopback {
    fn new(bits_per_frame: usize) -> Self {
        Self {
            bits_per_frame,
            capture: None,
            frames: VecDeque::new(),
            playback: VecDeque::new(),
        }
    }

    fn rx_bit(&mut self, sync: bool) -> bool {
        if sync {
            self.playback = self.frames.pop_front().unwrap_or_default().into();
        }
        self.playback.pop_front().unwrap_or(true)
    }

    fn tx_bit(&mut self, line: TxLine) {
        if line.sync {
            self.capture = Some(Vec::with_capacity(self.bits_per_frame));
        }
        if let Some(capture) = &mut self.capture {
            capture.push(line.ser);
            if capture.len() == self.bits_per_frame {
                if let Some(frame) = self.capture.take() {
                    self.frames.push_back(frame);
                }
            }
        }
    }
}

#[test]
fn rx_round_trip_three_frames() {
    let geometry = FrameGeometry::new(3);
    let page_size = CHANNELS * 3 + MockReport::LENGTH;
    let (writer, reader) = PagedFifo::new(page_size, 8).unwrap().split();

    let mut timing = SystemTiming::new(geometry);
    let mut framer_to_fifo = RxFramerToFifo::new(writer);
    let mut fifo_to_usb = RxFifoToUsb::<()>::new(reader);

    let channel_0 = [0xaa, 0x55, 0xff];
    let data = |frame: usize, timeslot: usize, channel: usize| -> u8 {
        if channel == 0 {
            channel_0[frame % 3]
        } else {
            ((channel as u8) << 4) | ((timeslot as u8) << 2) | frame as u8
        }
    };
    let report = |frame: usize| MockReport { field_0: 0x10 + frame as u8, field_1: 0xbee0 + frame as u16 };

    let mut rx_timeslots = timeslots(CHANNELS);
    let mut frame = 0;
    for _ in 0..4 * geometry.bits_per_frame() {
        let edge = timing.bit_end();
        if edge.timeslot_start_strobe {
            for (channel, timeslot) in rx_timeslots.iter_mut().enumerate() {
                *timeslot = Timeslot::new(data(frame, edge.started.timeslot_in_frame, channel));
            }
        }
        if framer_to_fifo.bit_start(&edge, &rx_timeslots, &report(frame)).is_some() {
            frame += 1;
        }
    }

    let mut stream = Vec::new();
    for _ in 0..3 {
        stream.extend(fifo_to_usb.transfer(&()));
    }

    let mut expected = Vec::new();
    for frame in 0..3 {
        for timeslot in 0..3 {
            for channel in 0..CHANNELS {
                expected.push(data(frame, timeslot, channel));
            }
        }
        expected.extend_from_slice(report(frame).as_bytes());
    }

    assert_eq!(stream, expected);
    assert_eq!(&stream[0..1], &[0xaa]);
    assert_eq!(stream[page_size], 0x55);
    assert_eq!(stream[2 * page_size], 0xff);
}

#[test]
fn bit_stream_poll_at_level_one() {
    let geometry = FrameGeometry::new(3);
    let page_size = CHANNELS * 3 + MockReport::LENGTH;
    let (writer, reader) = PagedFifo::new(page_size, 8).unwrap().split();

    let mut timing = SystemTiming::new(geometry);
    let mut deserializers: Vec<_> = (0..CHANNELS).map(|_| BitDeserializer::new(geometry, true)).collect();
    let mut rx_timeslots = timeslots(CHANNELS);
    let mut framer_to_fifo = RxFramerToFifo::new(writer);
    let mut fifo_to_usb = RxFifoToUsb::<()>::new(reader);
    let report = MockReport { field_0: 0x5a, field_1: 0x1234 };

    let frames = [frame_bits(true, &[0xaa; 3]), frame_bits(false, &[0xaa; 3])];
    let mut framer = FramerRx::new(frames.iter().cycle().cloned());

    let mut packets = Vec::new();
    for _ in 0..6 * geometry.bits_per_frame() {
        let ser = framer.next_bit(deserializers[0].sync(timing.state()));

        let edge = timing.bit_end();
        for deserializer in deserializers.iter_mut() {
            deserializer.bit_end(&edge.ended, RxLine { ser, ..Default::default() });
        }
        if edge.timeslot_start_strobe {
            for (timeslot, deserializer) in rx_timeslots.iter_mut().zip(&deserializers) {
                *timeslot = deserializer.timeslot();
            }
        }
        framer_to_fifo.bit_start(&edge, &rx_timeslots, &report);

        if fifo_to_usb.reader().level() == 1 {
            assert_eq!(fifo_to_usb.start_of_frame(&()), 24 + 3);
            let mut packet = Vec::new();
            while let Some(value) = fifo_to_usb.next_byte() {
                packet.push(value);
            }
            packets.push(packet);
        }
    }

    assert_eq!(packets.len(), 5);

    // The first page was filled before the framer was in sync.
    let mut expected = vec![0xaa; 24];
    expected.extend([0x5a, 0x34, 0x12]);
    for packet in &packets[1..] {
        assert_eq!(packet, &expected);
    }
}

#[test]
fn tx_pages_to_serial_lines() {
    let geometry = FrameGeometry::new(3);
    let page_size = MockReport::LENGTH + CHANNELS * 3;
    let (writer, reader) = PagedFifo::new(page_size, 8).unwrap().split();

    let page = |n: u8| -> Vec<u8> {
        let mut page = MockReport { field_0: n, field_1: 0 }.as_bytes().to_vec();
        for timeslot in 0..3u8 {
            for channel in 0..CHANNELS as u8 {
                page.push((n << 6) | (timeslot << 3) | channel);
            }
        }
        page
    };

    let mut usb_to_fifo = TxUsbToFifo::<()>::new(writer);
    assert_eq!(usb_to_fifo.receive(&[page(0), page(1)].concat()).pages, 2);
    assert_eq!(usb_to_fifo.receive(&page(2)).pages, 1);

    let mut timing = SystemTiming::new(geometry);
    let mut fifo_to_framer = TxFifoToFramer::new(reader);
    let mut serializers: Vec<_> = (0..CHANNELS).map(|_| BitSerializer::new(true)).collect();
    let mut tx_timeslots = timeslots(CHANNELS);
    let mut report = MockReport::default();

    let mut reports = Vec::new();
    let mut lines = vec![Vec::new(); CHANNELS];
    for _ in 0..5 * geometry.bits_per_frame() {
        for ((serializer, timeslot), lines) in serializers.iter().zip(&tx_timeslots).zip(lines.iter_mut()) {
            lines.push(serializer.line(timing.state(), timeslot));
        }

        let edge = timing.bit_end();
        for (serializer, timeslot) in serializers.iter_mut().zip(&tx_timeslots) {
            serializer.bit_end(&edge.ended, timeslot);
        }
        if fifo_to_framer.bit_start(&edge, &mut tx_timeslots, &mut report) {
            reports.push(report.field_0);
        }
    }

    assert_eq!(reports[..3], [1, 2, 2]);

    let bits_per_frame = geometry.bits_per_frame();
    for (channel, lines) in lines.iter().enumerate() {
        let frames: Vec<Vec<u8>> = lines.iter()
            .enumerate()
            .filter(|(n, line)| line.sync && n + bits_per_frame <= lines.len())
            .map(|(n, _)| {
                let bits: Vec<bool> = lines[n..n + bits_per_frame].iter().map(|line| line.ser).collect();
                decode_frame(&bits).1
            })
            .collect();

        let expected = |n: u8| -> Vec<u8> { (0..3u8).map(|t| (n << 6) | (t << 3) | channel as u8).collect() };
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1], expected(1));
        assert_eq!(frames[2], expected(2));
        assert_eq!(frames[3], expected(2));
    }
}

#[test]
fn bridge_loopback_preserves_frames() {
    let config = FramerConfig::default();
    let (mut trunk, mut transport) = bridge(&config).unwrap();
    let bits_per_frame = config.geometry().bits_per_frame();
    let payload_size = config.frame_payload_size();

    let mut framers: Vec<_> = (0..config.channels).map(|_| FramerLoopback::new(bits_per_frame)).collect();
    let mut rx = vec![RxLine::default(); config.channels];
    let mut tx = vec![TxLine::default(); config.channels];

    let mut sent = 0u32;
    let mut received: Vec<(u32, Vec<u8>)> = Vec::new();

    for _ in 0..40 {
        // Host poll: one page out, whatever is ready back in.
        let mut packet_out = bytemuck::bytes_of(&TxUsbReport { frame_count: sent }).to_vec();
        packet_out.extend_from_slice(bytemuck::bytes_of(&TxFrameReport { frame_count: sent }));
        packet_out.extend((0..payload_size).map(|i| (sent as u8).wrapping_add(i as u8)));
        sent += 1;

        let packet_in = transport.poll(&packet_out);
        let (pages, usb_report) = packet_in.split_at(packet_in.len() - size_of::<RxUsbReport>());
        let usb_report = *bytemuck::from_bytes::<RxUsbReport>(usb_report);
        assert_eq!({ usb_report.sof_count }, sent - 1);

        for page in pages.chunks_exact(transport.rx_page_size()) {
            let (payload, frame_report) = page.split_at(payload_size);
            let frame_report = *bytemuck::from_bytes::<RxFrameReport>(frame_report);
            received.push((frame_report.frame_count, payload.to_vec()));
        }

        for _ in 0..bits_per_frame {
            let sync = trunk.rx_sync();
            for (line, framer) in rx.iter_mut().zip(framers.iter_mut()) {
                line.ser = framer.rx_bit(sync);
            }
            trunk.tick(&rx, &mut tx);
            for (line, framer) in tx.iter().zip(framers.iter_mut()) {
                framer.tx_bit(*line);
            }
        }
    }

    assert!(received.len() > 30);

    let frame_counts: Vec<u32> = received.iter().map(|(count, _)| *count).collect();
    let expected: Vec<u32> = (0..received.len() as u32).collect();
    assert_eq!(frame_counts, expected);

    // Skip pages captured before the loop filled up.
    let steady = &received[6..];
    for (_, payload) in steady {
        let first = payload[0];
        for (i, &value) in payload.iter().enumerate() {
            assert_eq!(value, first.wrapping_add(i as u8));
        }
    }
    for pair in steady.windows(2) {
        assert_eq!(pair[1].1[0], pair[0].1[0].wrapping_add(1));
    }

    let trunk_stats = trunk.stats();
    assert_eq!(trunk_stats.rx_fifo_overflow_count, 0);
    assert_eq!(trunk_stats.tx_frame_slip_count, 0);
    assert_eq!(transport.stats().tx_fifo_overflow_count, 0);
}
