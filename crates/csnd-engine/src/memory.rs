//! Guest memory and shared-memory seams.
//!
//! The emulator's real memory system sits behind these traits. The `Vec`
//! backed implementations are used by the CLI and by tests.

use std::sync::{PoisonError, RwLock};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("guest memory access out of bounds: addr=0x{addr:x}, len=0x{len:x}")]
pub struct GuestMemoryError {
    pub addr: u64,
    pub len: usize,
}

/// Guest memory as seen by the streaming engine.
pub trait GuestMemory: Send + Sync {
    /// Translate a guest physical address into the address space `read` uses.
    fn translate(&self, phys_addr: u32) -> Option<u32>;

    /// Copy `dst.len()` bytes starting at a translated address.
    fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError>;

    /// Is `[addr, addr + len)` backed by guest memory?
    fn contains(&self, addr: u32, len: usize) -> bool;

    /// Copy `len` bytes into a new buffer. The range is checked before the
    /// buffer is allocated, so a bogus guest size cannot exhaust the host.
    fn read_vec(&self, addr: u32, len: usize) -> Result<Vec<u8>, GuestMemoryError> {
        if !self.contains(addr, len) {
            return Err(GuestMemoryError { addr: addr as u64, len });
        }
        let mut buf = vec![0u8; len];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }
}

/// The shared-memory region command lists live in. Offsets are region-relative.
pub trait SharedMemory: Send + Sync {
    fn size(&self) -> usize;
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), GuestMemoryError>;
    fn write(&self, offset: usize, src: &[u8]) -> Result<(), GuestMemoryError>;
}

fn byte_range(base: usize, addr: u64, len: usize, limit: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
    let err = GuestMemoryError { addr, len };
    let start = usize::try_from(addr)
        .ok()
        .and_then(|a| a.checked_sub(base))
        .ok_or_else(|| err.clone())?;
    let end = start.checked_add(len).ok_or_else(|| err.clone())?;
    if end > limit {
        return Err(err);
    }
    Ok(start..end)
}

/// Contiguous guest RAM mapped at `phys_base` physically and `virt_base` virtually.
#[derive(Debug)]
pub struct VecGuestMemory {
    phys_base: u32,
    virt_base: u32,
    mem: RwLock<Vec<u8>>,
}

impl VecGuestMemory {
    pub fn new(phys_base: u32, virt_base: u32, size_bytes: usize) -> Self {
        Self {
            phys_base,
            virt_base,
            mem: RwLock::new(vec![0u8; size_bytes]),
        }
    }

    pub fn phys_base(&self) -> u32 {
        self.phys_base
    }

    pub fn len(&self) -> usize {
        self.mem.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write bytes at a physical address (guest side).
    pub fn write_phys(&self, phys_addr: u32, data: &[u8]) -> Result<(), GuestMemoryError> {
        let mut mem = self.mem.write().unwrap_or_else(PoisonError::into_inner);
        let range = byte_range(self.phys_base as usize, phys_addr as u64, data.len(), mem.len())?;
        mem[range].copy_from_slice(data);
        Ok(())
    }
}

impl GuestMemory for VecGuestMemory {
    fn translate(&self, phys_addr: u32) -> Option<u32> {
        let offset = phys_addr.checked_sub(self.phys_base)?;
        if offset as usize >= self.len() {
            return None;
        }
        self.virt_base.checked_add(offset)
    }

    fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let mem = self.mem.read().unwrap_or_else(PoisonError::into_inner);
        let range = byte_range(self.virt_base as usize, addr as u64, dst.len(), mem.len())?;
        dst.copy_from_slice(&mem[range]);
        Ok(())
    }

    fn contains(&self, addr: u32, len: usize) -> bool {
        byte_range(self.virt_base as usize, addr as u64, len, self.len()).is_ok()
    }
}

/// Heap-backed shared memory block.
#[derive(Debug)]
pub struct HeapSharedMemory {
    mem: RwLock<Vec<u8>>,
}

impl HeapSharedMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            mem: RwLock::new(vec![0u8; size_bytes]),
        }
    }

    /// Copy of the whole region.
    pub fn to_vec(&self) -> Vec<u8> {
        self.mem.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SharedMemory for HeapSharedMemory {
    fn size(&self) -> usize {
        self.mem.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let mem = self.mem.read().unwrap_or_else(PoisonError::into_inner);
        let range = byte_range(0, offset as u64, dst.len(), mem.len())?;
        dst.copy_from_slice(&mem[range]);
        Ok(())
    }

    fn write(&self, offset: usize, src: &[u8]) -> Result<(), GuestMemoryError> {
        let mut mem = self.mem.write().unwrap_or_else(PoisonError::into_inner);
        let range = byte_range(0, offset as u64, src.len(), mem.len())?;
        mem[range].copy_from_slice(src);
        Ok(())
    }
}
