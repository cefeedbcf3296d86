//! RISC-V SBI (Supervisor Binary Interface) calls
//!
//! This module provides the firmware calls the interrupt layer needs:
//! - CLIC source discovery and per-source delegation to S-mode
//! - Switching firmware to CLIC-managed interrupt mode
//! - IPI sending

use crate::HartId;

/// SBI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(isize)]
pub enum SbiError {
    Failed = -1,
    NotSupported = -2,
    InvalidParam = -3,
    Denied = -4,
    InvalidAddress = -5,
    AlreadyAvailable = -6,
    AlreadyStarted = -7,
    AlreadyStopped = -8,
    NoShmem = -9,
    InvalidShmemSize = -10,
    NoResume = -11,
}

impl SbiError {
    /// Convert from a raw non-zero error code
    pub fn from_raw(code: isize) -> Self {
        match code {
            -2 => SbiError::NotSupported,
            -3 => SbiError::InvalidParam,
            -4 => SbiError::Denied,
            -5 => SbiError::InvalidAddress,
            -6 => SbiError::AlreadyAvailable,
            -7 => SbiError::AlreadyStarted,
            -8 => SbiError::AlreadyStopped,
            -9 => SbiError::NoShmem,
            -10 => SbiError::InvalidShmemSize,
            -11 => SbiError::NoResume,
            _ => SbiError::Failed,
        }
    }
}

/// Raw SBI return pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbiRet {
    /// Error code, 0 on success
    pub error: isize,
    /// Returned value
    pub value: usize,
}

impl SbiRet {
    /// Successful return carrying `value`
    pub const fn success(value: usize) -> Self {
        Self { error: 0, value }
    }

    /// Failed return carrying `error`
    pub const fn failure(error: SbiError) -> Self {
        Self { error: error as isize, value: 0 }
    }

    /// Convert to result
    pub fn into_result(self) -> Result<usize, SbiError> {
        match self.error {
            0 => Ok(self.value),
            code => Err(SbiError::from_raw(code)),
        }
    }
}

/// SBI extensions
pub mod sbi_ext {
    /// sPI: IPI extension
    pub const IPI: usize = 0x735049;
    pub const IPI_SEND_IPI: usize = 0;

    /// Experimental CLIC extension ("CLI")
    pub const CLIC: usize = 0x0843_4C49;
    pub const CLIC_GET_NUM_SOURCES: usize = 0;
    pub const CLIC_DELEGATE: usize = 1;
    pub const CLIC_ENABLE: usize = 2;
}

/// Firmware requests issued by the interrupt layer
///
/// Every call is a synchronous round trip. Per-source failures are
/// reported to the caller and never retried here.
pub trait Firmware {
    /// Number of interrupt sources the CLIC implements
    fn clic_num_sources(&self) -> Result<usize, SbiError>;

    /// Delegate CLIC source `irq` from M-mode to S-mode
    fn clic_delegate(&self, irq: usize) -> Result<(), SbiError>;

    /// Switch firmware to CLIC-managed interrupt handling
    fn clic_enable(&self) -> Result<(), SbiError>;

    /// Send an IPI to the harts in `hart_mask`, relative to `hart_mask_base`
    fn send_ipi(&self, hart_mask: usize, hart_mask_base: HartId) -> Result<(), SbiError>;
}

/// Firmware reached through `ecall`
#[derive(Debug, Default, Clone, Copy)]
pub struct SbiFirmware;

#[cfg(target_arch = "riscv64")]
#[inline]
fn sbi_call(ext_id: usize, func_id: usize, arg0: usize, arg1: usize) -> SbiRet {
    let error: isize;
    let value: usize;

    unsafe {
        core::arch::asm!(
            "ecall",
            inlateout("a0") arg0 => error,
            inlateout("a1") arg1 => value,
            in("a6") func_id,
            in("a7") ext_id,
        );
    }

    SbiRet { error, value }
}

#[cfg(target_arch = "riscv64")]
impl Firmware for SbiFirmware {
    fn clic_num_sources(&self) -> Result<usize, SbiError> {
        sbi_call(sbi_ext::CLIC, sbi_ext::CLIC_GET_NUM_SOURCES, 0, 0).into_result()
    }

    fn clic_delegate(&self, irq: usize) -> Result<(), SbiError> {
        sbi_call(sbi_ext::CLIC, sbi_ext::CLIC_DELEGATE, irq, 0)
            .into_result()
            .map(|_| ())
    }

    fn clic_enable(&self) -> Result<(), SbiError> {
        sbi_call(sbi_ext::CLIC, sbi_ext::CLIC_ENABLE, 0, 0)
            .into_result()
            .map(|_| ())
    }

    fn send_ipi(&self, hart_mask: usize, hart_mask_base: HartId) -> Result<(), SbiError> {
        sbi_call(sbi_ext::IPI, sbi_ext::IPI_SEND_IPI, hart_mask, hart_mask_base)
            .into_result()
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sbi_error() {
        assert_eq!(SbiError::Failed as isize, -1);
        assert_eq!(SbiError::NotSupported as isize, -2);
        assert_eq!(SbiError::from_raw(-3), SbiError::InvalidParam);
        assert_eq!(SbiError::from_raw(-99), SbiError::Failed);
    }

    #[test]
    fn test_sbiret_into_result() {
        assert_eq!(SbiRet::success(8).into_result(), Ok(8));
        assert_eq!(SbiRet::failure(SbiError::Denied).into_result(), Err(SbiError::Denied));
        assert_eq!(SbiRet { error: -11, value: 3 }.into_result(), Err(SbiError::NoResume));
    }
}
