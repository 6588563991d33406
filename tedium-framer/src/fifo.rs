//! Page-oriented FIFO between the trunk and transport loops.
//!
//! Each side owns its own page pointer. Only the page counters cross
//! between the two halves, Gray-coded and published with release/acquire
//! ordering. Payload bytes are never handed over directly: a page becomes
//! visible to the reader when the writer's counter moves past it, and
//! becomes writable again when the reader's counter moves past it.
//!
//! One page of separation is kept between the pointers in both
//! directions, so the usable depth is `depth_pages - 1`.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use tracing::trace;

use crate::error::{Error, Result};

pub fn gray_encode(value: usize) -> usize {
    value ^ (value >> 1)
}

pub fn gray_decode(gray: usize) -> usize {
    let mut value = gray;
    let mut shift = gray >> 1;
    while shift != 0 {
        value ^= shift;
        shift >>= 1;
    }
    value
}

/// Outcome of an attempt to move a page pointer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PageAdvance {
    Advanced,
    /// Writer was full. It stays on its page, which will be overwritten.
    Overflow,
    /// Reader was empty. It stays on its page, which will be read again.
    Underflow,
}

struct Shared {
    storage: Box<[AtomicU8]>,
    page_size: usize,
    depth: usize,
    /// Gray-coded page counters, modulo `2 * depth`.
    produce: CachePadded<AtomicUsize>,
    consume: CachePadded<AtomicUsize>,
}

impl Shared {
    fn counter_mask(&self) -> usize {
        2 * self.depth - 1
    }

    fn byte(&self, counter: usize, offset: usize) -> &AtomicU8 {
        assert!(offset < self.page_size, "offset {offset} outside {}-byte page", self.page_size);
        let page = counter & (self.depth - 1);
        &self.storage[page * self.page_size + offset]
    }
}

pub struct PagedFifo {
    shared: Arc<Shared>,
}

impl PagedFifo {
    pub fn new(page_size: usize, depth_pages: usize) -> Result<Self> {
        if depth_pages < 2 || !depth_pages.is_power_of_two() {
            return Err(Error::FifoDepth(depth_pages));
        }
        if page_size == 0 {
            return Err(Error::PageSize);
        }

        let storage = (0..page_size * depth_pages).map(|_| AtomicU8::new(0)).collect();

        Ok(Self {
            shared: Arc::new(Shared {
                storage,
                page_size,
                depth: depth_pages,
                produce: CachePadded::new(AtomicUsize::new(gray_encode(0))),
                consume: CachePadded::new(AtomicUsize::new(gray_encode(0))),
            }),
        })
    }

    pub fn split(self) -> (PageWriter, PageReader) {
        let writer = PageWriter {
            shared: self.shared.clone(),
            produce: 0,
            overflow_count: 0,
        };
        let reader = PageReader {
            shared: self.shared,
            consume: 0,
            underflow_count: 0,
        };
        (writer, reader)
    }
}

///////////////////////////////////////////////////////////////////////

pub struct PageWriter {
    shared: Arc<Shared>,
    produce: usize,
    overflow_count: u64,
}

impl PageWriter {
    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    pub fn depth(&self) -> usize {
        self.shared.depth
    }

    /// Pages committed by this side and not yet released by the reader.
    pub fn fill(&self) -> usize {
        let consume = gray_decode(self.shared.consume.load(Ordering::Acquire));
        self.produce.wrapping_sub(consume) & self.shared.counter_mask()
    }

    /// Pages that can still be committed. Zero means full.
    pub fn level(&self) -> usize {
        (self.shared.depth - 1).saturating_sub(self.fill())
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    pub fn write_byte(&mut self, offset: usize, value: u8) {
        self.shared.byte(self.produce, offset).store(value, Ordering::Relaxed);
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) {
        for (i, &value) in data.iter().enumerate() {
            self.write_byte(offset + i, value);
        }
    }

    /// Commit the current page and move to the next one.
    pub fn advance(&mut self) -> PageAdvance {
        if self.level() == 0 {
            self.overflow_count += 1;
            trace!(page = self.produce, count = self.overflow_count, "page FIFO overflow");
            return PageAdvance::Overflow;
        }

        self.produce = (self.produce + 1) & self.shared.counter_mask();
        self.shared.produce.store(gray_encode(self.produce), Ordering::Release);
        PageAdvance::Advanced
    }
}

///////////////////////////////////////////////////////////////////////

pub struct PageReader {
    shared: Arc<Shared>,
    consume: usize,
    underflow_count: u64,
}

impl PageReader {
    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    pub fn depth(&self) -> usize {
        self.shared.depth
    }

    fn fill(&self) -> usize {
        let produce = gray_decode(self.shared.produce.load(Ordering::Acquire));
        produce.wrapping_sub(self.consume) & self.shared.counter_mask()
    }

    /// Pages that can be drained and released. Zero means empty.
    pub fn level(&self) -> usize {
        self.fill().saturating_sub(1)
    }

    pub fn underflow_count(&self) -> u64 {
        self.underflow_count
    }

    pub fn read_byte(&self, offset: usize) -> u8 {
        self.shared.byte(self.consume, offset).load(Ordering::Relaxed)
    }

    pub fn read(&self, offset: usize, data: &mut [u8]) {
        for (i, value) in data.iter_mut().enumerate() {
            *value = self.read_byte(offset + i);
        }
    }

    /// Release the current page and move to the next one.
    pub fn advance(&mut self) -> PageAdvance {
        if self.level() == 0 {
            self.underflow_count += 1;
            trace!(page = self.consume, count = self.underflow_count, "page FIFO underflow");
            return PageAdvance::Underflow;
        }

        self.consume = (self.consume + 1) & self.shared.counter_mask();
        self.shared.consume.store(gray_encode(self.consume), Ordering::Release);
        PageAdvance::Advanced
    }
}
