//! RISC-V CSR (Control and Status Register) Access
//!
//! Supervisor CSRs used by the interrupt layer:
//! - `scause` to decode incoming traps
//! - `sie` / `sip` for the software, timer and external interrupt lines
//! - `sstatus.SIE` for the hart-wide interrupt enable

use bitflags::bitflags;

/// Interrupt bit of `scause`
pub const SCAUSE_INTERRUPT: usize = 1 << (usize::BITS - 1);

/// Interrupt causes in `scause` encoding
pub mod scause_code {
    use super::SCAUSE_INTERRUPT;

    /// Supervisor software interrupt
    pub const SSI: usize = SCAUSE_INTERRUPT | 1;
    /// Supervisor timer interrupt
    pub const STI: usize = SCAUSE_INTERRUPT | 5;
    /// Supervisor external interrupt
    pub const SEI: usize = SCAUSE_INTERRUPT | 9;
}

bitflags! {
    /// SIE register flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sie: usize {
        const SSIE = 1 << 1;     // Supervisor Software Interrupt Enable
        const STIE = 1 << 5;     // Supervisor Timer Interrupt Enable
        const SEIE = 1 << 9;     // Supervisor External Interrupt Enable
    }
}

bitflags! {
    /// SIP register flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sip: usize {
        const SSIP = 1 << 1;     // Supervisor Software Interrupt Pending
        const STIP = 1 << 5;     // Supervisor Timer Interrupt Pending
        const SEIP = 1 << 9;     // Supervisor External Interrupt Pending
    }
}

/// Access to the current hart's supervisor interrupt CSRs
pub trait Csrs {
    /// Read `scause`
    fn scause(&self) -> usize;

    /// Read `sie`
    fn sie(&self) -> Sie;

    /// Set bits in `sie`
    fn sie_set(&self, bits: Sie);

    /// Clear bits in `sie`
    fn sie_clear(&self, bits: Sie);

    /// Read `sip`
    fn sip(&self) -> Sip;

    /// Clear bits in `sip`. Only SSIP is software-writable.
    fn sip_clear(&self, bits: Sip);

    /// Set or clear `sstatus.SIE`
    fn set_interrupts_enabled(&self, enabled: bool);
}

/// CSRs of the hart executing the call
#[derive(Debug, Default, Clone, Copy)]
pub struct SupervisorCsrs;

#[cfg(target_arch = "riscv64")]
macro_rules! read_csr {
    ($csr:ident) => {{
        let value: usize;
        unsafe { core::arch::asm!(concat!("csrr {}, ", stringify!($csr)), out(reg) value) };
        value
    }};
}

#[cfg(target_arch = "riscv64")]
macro_rules! set_csr {
    ($csr:ident, $bits:expr) => {
        unsafe { core::arch::asm!(concat!("csrs ", stringify!($csr), ", {}"), in(reg) $bits) }
    };
}

#[cfg(target_arch = "riscv64")]
macro_rules! clear_csr {
    ($csr:ident, $bits:expr) => {
        unsafe { core::arch::asm!(concat!("csrc ", stringify!($csr), ", {}"), in(reg) $bits) }
    };
}

#[cfg(target_arch = "riscv64")]
impl Csrs for SupervisorCsrs {
    #[inline]
    fn scause(&self) -> usize {
        riscv::register::scause::read().bits()
    }

    #[inline]
    fn sie(&self) -> Sie {
        Sie::from_bits_truncate(read_csr!(sie))
    }

    #[inline]
    fn sie_set(&self, bits: Sie) {
        set_csr!(sie, bits.bits());
    }

    #[inline]
    fn sie_clear(&self, bits: Sie) {
        clear_csr!(sie, bits.bits());
    }

    #[inline]
    fn sip(&self) -> Sip {
        Sip::from_bits_truncate(read_csr!(sip))
    }

    #[inline]
    fn sip_clear(&self, bits: Sip) {
        clear_csr!(sip, bits.bits());
    }

    #[inline]
    fn set_interrupts_enabled(&self, enabled: bool) {
        unsafe {
            if enabled {
                riscv::register::sstatus::set_sie();
            } else {
                riscv::register::sstatus::clear_sie();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scause_codes() {
        assert_eq!(scause_code::SSI & !SCAUSE_INTERRUPT, 1);
        assert_eq!(scause_code::STI & !SCAUSE_INTERRUPT, 5);
        assert_eq!(scause_code::SEI & !SCAUSE_INTERRUPT, 9);
        assert_ne!(scause_code::SSI, 1);
    }

    #[test]
    fn test_interrupt_line_bits_match() {
        assert_eq!(Sie::SSIE.bits(), Sip::SSIP.bits());
        assert_eq!(Sie::STIE.bits(), Sip::STIP.bits());
        assert_eq!(Sie::SEIE.bits(), Sip::SEIP.bits());
    }
}
