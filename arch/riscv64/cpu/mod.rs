//! RISC-V CPU support

pub mod csr;
