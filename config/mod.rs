//! Configuration management
//!
//! This module holds the platform description consumed at bring-up, the
//! compile-time layout of the logical interrupt-ID space and the runtime
//! tunables of the interrupt layer.

use crate::arch::riscv64::interrupt::clic::regs::{
    EnableState, IntAttr, InterruptControl, PendingState, PrivilegeMode, TriggerType, VectorMode,
};
use crate::HartId;

/// Max number of interrupts that a CLIC implementation can support.
///
/// This is also the partition boundary of the logical ID space: IDs below
/// it are CLIC sources, IDs at or above it are PLIC sources offset by it.
pub const CLIC_MAX_INTERRUPTS: usize = 4096;

/// Max number of PLIC interrupt sources
pub const PLIC_MAX_INTERRUPTS: usize = 1024;

/// Supervisor software interrupt
pub const SOFT_INT_ID: usize = 1;
/// Supervisor timer interrupt
pub const TIMR_INT_ID: usize = 5;
/// Supervisor external interrupt (the PLIC, seen through the CLIC)
pub const EXTR_INT_ID: usize = 9;

/// Number of virtual supervisor identifiers the CLICINTV.VSID field can hold
pub const CLIC_MAX_VSID: usize = 64;

/// Static description of the interrupt hardware of a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// PLIC physical base address
    pub plic_base: usize,
    /// CLIC physical base address, `None` when the platform has no CLIC
    pub clic_base: Option<usize>,
    /// Number of harts
    pub cpu_num: usize,
    /// Hart that performs the global bring-up
    pub boot_hart: HartId,
}

impl PlatformDescriptor {
    /// The CVA6 reference board
    pub const fn cva6() -> Self {
        Self {
            plic_base: 0x0c00_0000,
            clic_base: Some(0x5000_0000),
            cpu_num: 1,
            boot_hart: 0,
        }
    }

    /// Check whether the platform declares a CLIC
    pub fn has_clic(&self) -> bool {
        self.clic_base.is_some()
    }
}

impl Default for PlatformDescriptor {
    fn default() -> Self {
        Self::cva6()
    }
}

/// Runtime tunables of the interrupt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptConfig {
    /// Priority programmed whenever an interrupt is enabled
    pub enable_priority: Option<u8>,
    /// Descriptor programmed into every successfully delegated CLIC source
    pub default_control: InterruptControl,
}

impl InterruptConfig {
    /// Priority written when enabling a PLIC source
    pub fn plic_priority(&self) -> u32 {
        self.enable_priority.map_or(1, u32::from)
    }
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            enable_priority: Some(0xFE),
            default_control: InterruptControl {
                pending: PendingState::Clear,
                enable: EnableState::Masked,
                attr: IntAttr {
                    shv: VectorMode::Off,
                    trig: TriggerType::PositiveEdge,
                    mode: PrivilegeMode::Supervisor,
                },
                ctl: 0x00,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_bounds() {
        assert!(SOFT_INT_ID < CLIC_MAX_INTERRUPTS);
        assert!(TIMR_INT_ID < CLIC_MAX_INTERRUPTS);
        assert!(EXTR_INT_ID < CLIC_MAX_INTERRUPTS);
        assert_eq!(CLIC_MAX_VSID, 1 << 6);
    }

    #[test]
    fn test_default_config() {
        let config = InterruptConfig::default();
        assert_eq!(config.enable_priority, Some(0xFE));
        assert_eq!(config.plic_priority(), 0xFE);
        assert_eq!(config.default_control.enable, EnableState::Masked);
        assert_eq!(config.default_control.attr.mode, PrivilegeMode::Supervisor);
        assert_eq!(config.default_control.attr.trig, TriggerType::PositiveEdge);
    }

    #[test]
    fn test_cva6_platform() {
        let platform = PlatformDescriptor::cva6();
        assert!(platform.has_clic());
        assert_eq!(platform.plic_base, 0x0c00_0000);

        let legacy = PlatformDescriptor { clic_base: None, ..platform };
        assert!(!legacy.has_clic());
    }
}
