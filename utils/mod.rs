//! Utility functions and data structures
//!
//! This module contains the small helpers shared across the interrupt
//! layer: the interrupt bitmap, the boot barrier and memory fences.

pub mod bitmap;
pub mod sync;

// Re-export commonly used utilities
pub use self::bitmap::IrqBitmap;
pub use self::sync::SyncBarrier;

/// Full memory barrier
///
/// Orders device memory accesses against normal memory accesses, which is
/// what is needed between mapping a device window and touching it.
#[inline]
pub fn fence_sync() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "riscv64")] {
            unsafe { core::arch::asm!("fence iorw, iorw") };
        } else {
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        }
    }
}
