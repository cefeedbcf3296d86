//! Ferroclic - RISC-V interrupt controller layer for the Ferrovisor hypervisor
//!
//! This crate presents one logical interrupt-ID space to the hypervisor
//! core and to guests, on top of either:
//! - a core-local interrupt controller (CLIC) whose sources are delegated
//!   to S-mode through SBI calls, or
//! - the legacy platform-level interrupt controller (PLIC).
//!
//! It also carries the per-VM virtual CLIC state used to trap and emulate
//! guest accesses to the CLIC register file.

#![cfg_attr(not(test), no_std)]

// Core modules
pub mod config;
pub mod utils;

// Architecture-specific code
pub mod arch;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use arch::riscv64::interrupt::{
    system_init, ControllerMode, InterruptController, IrqHandler, IrqResult, TrapOutcome,
};
pub use arch::riscv64::smp::sbi::{Firmware, SbiError, SbiRet};
pub use config::{InterruptConfig, PlatformDescriptor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logical interrupt identifier (flat, hypervisor-wide)
pub type IrqId = usize;
/// Hart (hardware thread) identifier
pub type HartId = usize;
/// Virtual machine identifier
pub type VmId = usize;

/// Common error type for the interrupt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument,
    /// Register offset or identifier outside the supported range
    OutOfRange,
    /// Register access not naturally aligned
    Misaligned,
    /// Controller has not been brought up yet
    NotInitialized,
    /// Resource unavailable
    ResourceUnavailable,
    /// Resource busy
    Busy,
    /// Firmware returned an error
    Firmware(SbiError),
}

impl From<SbiError> for Error {
    fn from(err: SbiError) -> Self {
        Error::Firmware(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::OutOfRange => f.write_str("out of range"),
            Error::Misaligned => f.write_str("misaligned register access"),
            Error::NotInitialized => f.write_str("interrupt controller not initialized"),
            Error::ResourceUnavailable => f.write_str("resource unavailable"),
            Error::Busy => f.write_str("resource busy"),
            Error::Firmware(e) => write!(f, "firmware error {:?}", e),
        }
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;
