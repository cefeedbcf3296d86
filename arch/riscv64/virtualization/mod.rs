//! RISC-V Virtualization Support
//!
//! This module provides the CLIC side of guest interrupt virtualization:
//! - Binding CLIC sources to a guest's virtual supervisor identifier
//! - Runtime re-delegation of sources still owned by M-mode
//! - Per-VM virtual CLIC state and register emulation

pub mod delegation;
pub mod vclic;

pub use vclic::{EmulAccess, EmulRegion, Vclic};
