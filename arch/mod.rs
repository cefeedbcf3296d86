//! Architecture support
//!
//! Only RISC-V is supported. The controller logic is built on every
//! target so that it can be unit tested on the host; the pieces that need
//! real hardware (`ecall`, CSR access, device mappings) are gated to
//! `riscv64` inside their own modules.

pub mod riscv64;
