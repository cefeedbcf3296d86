//! RISC-V SMP support
//!
//! Cross-hart services provided by firmware through the SBI.

pub mod sbi;
