//! MMIO register windows
//!
//! Capability objects for memory-mapped register files. A window wraps a
//! mapped base address and only hands out naturally aligned 32-bit
//! accesses that fall inside it.

use crate::{Error, Result};
use core::ptr::NonNull;
use volatile::VolatilePtr;

/// 32-bit register access at byte offsets into a device window
pub trait RegisterIo {
    /// Read the 32-bit register at `offset`
    fn read32(&self, offset: usize) -> Result<u32>;

    /// Write the 32-bit register at `offset`
    fn write32(&self, offset: usize, value: u32) -> Result<()>;
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    fn read32(&self, offset: usize) -> Result<u32> {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        (**self).write32(offset, value)
    }
}

/// Maps device memory into the hypervisor address space
pub trait DeviceMapper {
    /// Register window type produced by the mapper
    type Io: RegisterIo;

    /// Map `size` bytes of device memory at physical address `phys`
    fn map_device(&self, phys: usize, size: usize) -> Result<Self::Io>;
}

/// Check that a 32-bit access at `offset` fits a window of `size` bytes
pub(crate) fn check_access(offset: usize, size: usize) -> Result<()> {
    if offset % 4 != 0 {
        return Err(Error::Misaligned);
    }
    match offset.checked_add(4) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfRange),
    }
}

/// A mapped device register window
#[derive(Debug)]
pub struct MmioRegion {
    /// Virtual base address of the window
    base: NonNull<u32>,
    /// Window size in bytes
    size: usize,
}

// SAFETY: the window is device memory; every access is a single volatile
// 32-bit load or store, and ordering between harts is the caller's concern.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Create a window over already mapped device memory
    ///
    /// # Safety
    /// `base` must be the virtual address of `size` bytes of device memory
    /// mapped uncached for the lifetime of the window, and 4-byte aligned.
    pub unsafe fn new(base: usize, size: usize) -> Result<Self> {
        if base % 4 != 0 {
            return Err(Error::Misaligned);
        }
        let base = NonNull::new(base as *mut u32).ok_or(Error::InvalidArgument)?;
        Ok(Self { base, size })
    }

    /// Virtual base address
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Window size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    fn register(&self, offset: usize) -> Result<VolatilePtr<'_, u32>> {
        check_access(offset, self.size)?;
        // SAFETY: offset is in bounds and aligned, see `new`.
        Ok(unsafe { VolatilePtr::new(NonNull::new_unchecked(self.base.as_ptr().add(offset / 4))) })
    }
}

impl RegisterIo for MmioRegion {
    fn read32(&self, offset: usize) -> Result<u32> {
        Ok(self.register(offset)?.read())
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        self.register(offset)?.write(value);
        Ok(())
    }
}

/// Mapper for hypervisors that run with devices identity-mapped
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMapper;

impl DeviceMapper for IdentityMapper {
    type Io = MmioRegion;

    fn map_device(&self, phys: usize, size: usize) -> Result<MmioRegion> {
        log::debug!("Identity-mapping device window {:#x}+{:#x}", phys, size);
        // SAFETY: the platform guarantees devices are identity-mapped.
        unsafe { MmioRegion::new(phys, size) }
    }
}
