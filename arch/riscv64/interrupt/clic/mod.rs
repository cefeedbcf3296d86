//! RISC-V CLIC (Core-Local Interrupt Controller) Support
//!
//! Driver for the S-mode view of the CLIC register file. Every field setter
//! is a read-modify-write of one CLICINT word, serialized by a driver-wide
//! lock so that concurrent updates of different fields of the same source
//! cannot lose each other.
//!
//! The bring-up pass ([`Clic::delegate_sources`]) asks firmware to hand
//! every implemented source to S-mode and programs the ones it gets with
//! the default descriptor.

pub mod regs;

use self::regs::{
    clic_regs, decode_interrupt_control, decode_virt_control, encode_global_config,
    encode_interrupt_control, encode_virt_control, EnableState, InterruptControl, PendingState,
    VirtControl,
};
use super::mmio::RegisterIo;
use crate::arch::riscv64::smp::sbi::Firmware;
use crate::config::CLIC_MAX_INTERRUPTS;
use crate::{Error, IrqId, Result};
use heapless::Vec;
use spin::{Mutex, MutexGuard};

/// Size of the CLIC window the hypervisor maps: up to the last CLICINTV
pub const CLIC_MMIO_SIZE: usize = clic_regs::clicintv(CLIC_MAX_INTERRUPTS);

/// Number of failed source IDs kept in a [`DelegationSummary`]
pub const MAX_RECORDED_FAILURES: usize = 64;

/// Outcome of the bring-up delegation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationSummary {
    /// Number of sources firmware reported
    pub discovered: usize,
    /// Number of sources delegated and programmed
    pub delegated: usize,
    /// Sources firmware refused to delegate
    pub failed: Vec<u32, MAX_RECORDED_FAILURES>,
    /// Failures beyond the capacity of `failed`
    pub failed_overflow: usize,
}

impl DelegationSummary {
    /// Total number of sources that failed delegation
    pub fn failed_count(&self) -> usize {
        self.failed.len() + self.failed_overflow
    }

    fn record_failure(&mut self, id: u32) {
        if self.failed.push(id).is_err() {
            self.failed_overflow += 1;
        }
    }
}

/// CLIC driver
pub struct Clic<R> {
    /// Register window
    regs: R,
    /// Number of implemented sources reported by firmware
    num_sources: usize,
    /// Held across every read-modify-write of a CLICINT word
    rmw: Mutex<()>,
}

impl<R: RegisterIo> Clic<R> {
    /// Create new CLIC driver
    pub fn new(regs: R, num_sources: usize) -> Self {
        Self {
            regs,
            num_sources: num_sources.min(CLIC_MAX_INTERRUPTS),
            rmw: Mutex::new(()),
        }
    }

    /// Ask firmware how many sources the CLIC implements
    pub fn discover<F: Firmware>(firmware: &F) -> Result<usize> {
        let count = firmware.clic_num_sources()?;
        if count > CLIC_MAX_INTERRUPTS {
            log::warn!(
                "CLIC: firmware reports {} sources, clamping to {}",
                count,
                CLIC_MAX_INTERRUPTS
            );
        }
        Ok(count.min(CLIC_MAX_INTERRUPTS))
    }

    /// Number of implemented sources
    pub fn num_sources(&self) -> usize {
        self.num_sources
    }

    /// Check if `id` is an implemented source
    pub fn has_source(&self, id: IrqId) -> bool {
        id < self.num_sources
    }

    /// Delegate every implemented source to S-mode
    ///
    /// Source 0 is reserved and skipped. A source firmware refuses is left
    /// untouched and recorded; the pass carries on with the next one.
    pub fn delegate_sources<F: Firmware>(
        &self,
        firmware: &F,
        default_control: &InterruptControl,
    ) -> DelegationSummary {
        let mut summary = DelegationSummary {
            discovered: self.num_sources,
            ..DelegationSummary::default()
        };

        for id in 1..self.num_sources {
            if let Err(e) = firmware.clic_delegate(id) {
                log::warn!("CLIC: firmware refused to delegate source {}: {:?}", id, e);
                summary.record_failure(id as u32);
                continue;
            }
            match self.write_control(id, default_control) {
                Ok(()) => summary.delegated += 1,
                Err(e) => {
                    log::warn!("CLIC: cannot program delegated source {}: {}", id, e);
                    summary.record_failure(id as u32);
                }
            }
        }

        log::info!(
            "CLIC: {} sources, {} delegated, {} failed",
            summary.discovered,
            summary.delegated,
            summary.failed_count()
        );
        summary
    }

    /// Program CLICCFG
    pub fn write_global_config(&self, nmbits: u8, mnlbits: u8, snlbits: u8, unlbits: u8) -> Result<()> {
        self.regs.write32(
            clic_regs::CLICCFG,
            encode_global_config(nmbits, mnlbits, snlbits, unlbits),
        )
    }

    /// Read the control descriptor of a source
    pub fn read_control(&self, id: IrqId) -> Result<InterruptControl> {
        Ok(decode_interrupt_control(self.regs.read32(clic_regs::clicint(id))?))
    }

    /// Write the control descriptor of a source
    pub fn write_control(&self, id: IrqId, cfg: &InterruptControl) -> Result<()> {
        self.regs.write32(clic_regs::clicint(id), encode_interrupt_control(cfg))
    }

    /// Read the virtualization descriptor of a source
    pub fn read_virt_control(&self, id: IrqId) -> Result<VirtControl> {
        Ok(decode_virt_control(self.regs.read32(clic_regs::clicintv(id))?))
    }

    /// Write the virtualization descriptor of a source
    pub fn write_virt_control(&self, id: IrqId, cfg: &VirtControl) -> Result<()> {
        self.regs.write32(clic_regs::clicintv(id), encode_virt_control(cfg))
    }

    /// Take the read-modify-write lock without spinning
    pub(crate) fn try_lock_rmw(&self) -> Result<MutexGuard<'_, ()>> {
        self.rmw.try_lock().ok_or(Error::Busy)
    }

    fn modify_control(&self, id: IrqId, f: impl FnOnce(&mut InterruptControl)) -> Result<()> {
        let _guard = self.rmw.lock();
        let mut cfg = self.read_control(id)?;
        f(&mut cfg);
        self.write_control(id, &cfg)
    }

    /// Set or clear the enable bit of a source
    pub fn set_enable(&self, id: IrqId, enabled: bool) -> Result<()> {
        self.modify_control(id, |cfg| {
            cfg.enable = if enabled { EnableState::Enabled } else { EnableState::Masked };
        })
    }

    /// Enable a source
    pub fn enable(&self, id: IrqId) -> Result<()> {
        self.set_enable(id, true)
    }

    /// Mask a source
    pub fn disable(&self, id: IrqId) -> Result<()> {
        self.set_enable(id, false)
    }

    /// Set the level/priority byte of a source
    pub fn set_priority(&self, id: IrqId, priority: u8) -> Result<()> {
        self.modify_control(id, |cfg| cfg.ctl = priority)
    }

    /// Check the pending bit of a source
    pub fn get_pending(&self, id: IrqId) -> Result<bool> {
        Ok(self.read_control(id)?.is_pending())
    }

    /// Set or clear the pending bit of a source
    pub fn set_pending(&self, id: IrqId, pending: bool) -> Result<()> {
        self.modify_control(id, |cfg| {
            cfg.pending = if pending { PendingState::Set } else { PendingState::Clear };
        })
    }
}
