//! RISC-V 64-bit architecture support
//!
//! This module provides the RISC-V pieces of the interrupt layer:
//! - Supervisor CSR access
//! - SBI firmware calls
//! - CLIC and PLIC drivers behind the unified dispatch layer
//! - CLIC virtualization for guests

pub mod cpu;
pub mod interrupt;
pub mod smp;
pub mod virtualization;
