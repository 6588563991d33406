//! Status records carried alongside the frame payload.
//!
//! Every report is a packed plain-old-data struct whose byte image is
//! sent as-is, fields in declaration order, multi-byte fields in the
//! platform's (little-endian) byte order. The host side decodes them with
//! the same definitions.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

/// A fixed-layout record that can be streamed byte by byte.
pub trait Report: Pod {
    const LENGTH: usize = size_of::<Self>();

    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }
}

impl<T: Pod> Report for T {}

/// Trails the payload of each RX page.
#[derive(Copy, Clone, Debug, Default)]
#[repr(packed)]
pub struct RxFrameReport {
    pub frame_count: u32,
    pub fifo_rx_overflow_count: u16,
    pub fifo_tx_underflow_count: u16,
}

unsafe impl Zeroable for RxFrameReport {}
unsafe impl Pod for RxFrameReport {}

/// Trails each IN transfer, after any RX pages.
#[derive(Copy, Clone, Debug, Default)]
#[repr(packed)]
pub struct RxUsbReport {
    pub sof_count: u32,
    /// RX pages ready to drain.
    pub fifo_rx_level: u8,
    /// TX pages committed and not yet released, i.e. the writer's fill,
    /// not its free space.
    pub fifo_tx_level: u8,
    pub fifo_rx_underflow_count: u16,
    pub fifo_tx_overflow_count: u16,
    pub sequence_count: u8,
}

unsafe impl Zeroable for RxUsbReport {}
unsafe impl Pod for RxUsbReport {}

/// Heads each OUT transfer.
#[derive(Copy, Clone, Debug, Default)]
#[repr(packed)]
pub struct TxUsbReport {
    pub frame_count: u32,
}

unsafe impl Zeroable for TxUsbReport {}
unsafe impl Pod for TxUsbReport {}

/// Heads each TX page.
#[derive(Copy, Clone, Debug, Default)]
#[repr(packed)]
pub struct TxFrameReport {
    pub frame_count: u32,
}

unsafe impl Zeroable for TxFrameReport {}
unsafe impl Pod for TxFrameReport {}
