use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::decoder::Frame;
use crate::error::{DecodeError, FrameError};

/// Byte written over released frame buffers.
pub const POISON: u8 = 0xdb;

/// Allocation counters, shareable across threads.
#[derive(Default)]
pub struct Memory {
    allocated: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        let new_allocated = self.allocated.fetch_add(size, Ordering::SeqCst) + size;
        let mut peak = self.peak.load(Ordering::SeqCst);
        while new_allocated > peak {
            match self.peak.compare_exchange(
                peak,
                new_allocated,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }

    pub fn deallocate(&self, size: usize) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.allocated.fetch_sub(size, Ordering::SeqCst);
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }
}

/// Address of a buffer inside decoder-visible memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Memory the decoder reads packets from.
pub trait DecoderMemory {
    fn alloc(&self, len: usize) -> Result<BufferHandle, DecodeError>;
    fn write(&self, handle: BufferHandle, bytes: &[u8]) -> Result<(), DecodeError>;
    fn free(&self, handle: BufferHandle);
}

/// A payload copied into decoder memory; freed when dropped.
pub struct TransferBuffer<'a> {
    memory: &'a dyn DecoderMemory,
    handle: BufferHandle,
    len: usize,
}

impl<'a> TransferBuffer<'a> {
    pub fn copy_from(memory: &'a dyn DecoderMemory, bytes: &[u8]) -> Result<Self, DecodeError> {
        let handle = memory.alloc(bytes.len())?;
        let buffer = Self {
            memory,
            handle,
            len: bytes.len(),
        };
        memory.write(handle, bytes)?;
        Ok(buffer)
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for TransferBuffer<'_> {
    fn drop(&mut self) {
        self.memory.free(self.handle);
    }
}

/// Handle-addressed heap used by decoders living in this process.
pub struct HeapMemory {
    buffers: RefCell<HashMap<u32, Vec<u8>>>,
    next: Cell<u32>,
    stats: Memory,
}

impl HeapMemory {
    pub fn new() -> Self {
        Self {
            buffers: RefCell::new(HashMap::new()),
            // 0 is reserved as the null handle
            next: Cell::new(1),
            stats: Memory::new(),
        }
    }

    pub fn stats(&self) -> &Memory {
        &self.stats
    }

    pub fn live(&self) -> usize {
        self.buffers.borrow().len()
    }

    /// Runs `f` over the first `len` bytes of `handle`.
    pub fn read<R>(
        &self,
        handle: BufferHandle,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, DecodeError> {
        let buffers = self.buffers.borrow();
        let buf = buffers
            .get(&handle.0)
            .ok_or(DecodeError::InvalidHandle(handle.0))?;
        let len = len.min(buf.len());
        Ok(f(&buf[..len]))
    }
}

impl Default for HeapMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderMemory for HeapMemory {
    fn alloc(&self, len: usize) -> Result<BufferHandle, DecodeError> {
        let handle = self.next.get();
        self.next.set(handle.checked_add(1).unwrap_or(1));
        self.buffers.borrow_mut().insert(handle, vec![0; len]);
        self.stats.allocate(len);
        Ok(BufferHandle(handle))
    }

    fn write(&self, handle: BufferHandle, bytes: &[u8]) -> Result<(), DecodeError> {
        let mut buffers = self.buffers.borrow_mut();
        let buf = buffers
            .get_mut(&handle.0)
            .ok_or(DecodeError::InvalidHandle(handle.0))?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }

    fn free(&self, handle: BufferHandle) {
        if let Some(buf) = self.buffers.borrow_mut().remove(&handle.0) {
            self.stats.deallocate(buf.len());
        }
    }
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    max_free: usize,
    stats: Memory,
    released: AtomicUsize,
}

/// Recycles frame buffers between decode calls.
///
/// Released buffers are overwritten with [`POISON`] before they are parked,
/// so a reader holding on to stale bytes sees the sentinel instead of a
/// newer picture.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    pub fn new(max_free: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_free)),
                max_free,
                stats: Memory::new(),
                released: AtomicUsize::new(0),
            }),
        }
    }

    /// A zeroed or recycled buffer of exactly `len` bytes.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let recycled = {
            let mut free = self.inner.free.lock();
            free.iter()
                .position(|buf| buf.capacity() >= len)
                .map(|i| free.swap_remove(i))
        };
        let mut buf = recycled.unwrap_or_default();
        buf.resize(len, 0);
        self.inner.stats.allocate(len);
        buf
    }

    pub fn frame(&self, width: u32, height: u32, data: Vec<u8>) -> Result<Frame, FrameError> {
        let pool = self.clone();
        Ok(Frame::yuv420(width, height, data)?.on_release(move |buf| pool.release(buf)))
    }

    pub fn release(&self, mut buf: Vec<u8>) {
        self.inner.released.fetch_add(1, Ordering::SeqCst);
        self.inner.stats.deallocate(buf.len());
        buf.fill(POISON);
        let mut free = self.inner.free.lock();
        if free.len() < self.inner.max_free {
            free.push(buf);
        }
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.inner.stats.allocations() - self.inner.stats.frees()
    }

    pub fn stats(&self) -> &Memory {
        &self.inner.stats
    }

    /// Runs `f` over the parked buffers.
    pub fn inspect_free<R>(&self, f: impl FnOnce(&[Vec<u8>]) -> R) -> R {
        f(&self.inner.free.lock())
    }
}
