//! CLIC source delegation to guests
//!
//! This module binds CLIC sources to guests through CLICINTV:
//! - Static assignment of a source to a VM's virtual supervisor ID
//! - Runtime re-delegation of a source that fires while still owned by
//!   M-mode, issued from the trap path

use crate::arch::riscv64::interrupt::clic::regs::{
    InterruptControl, PrivilegeMode, VirtControl, VirtState,
};
use crate::arch::riscv64::interrupt::clic::Clic;
use crate::arch::riscv64::interrupt::mmio::RegisterIo;
use crate::arch::riscv64::smp::sbi::Firmware;
use crate::config::CLIC_MAX_VSID;
use crate::{IrqId, VmId};

/// Virtualization descriptor tagging a source for `vm`
///
/// `None` when `vm` does not fit the 6-bit VSID field.
pub fn vm_virt_control(vm: VmId) -> Option<VirtControl> {
    if vm >= CLIC_MAX_VSID {
        return None;
    }
    Some(VirtControl { v: VirtState::Enabled, vsid: vm as u8 })
}

impl<R: RegisterIo> Clic<R> {
    /// Tag source `id` for guest `vm`
    ///
    /// Only CLICINTV is written; priority and trigger are left as they are.
    pub fn delegate_to_vm(&self, id: IrqId, vm: VmId) {
        let Some(vcfg) = vm_virt_control(vm) else {
            log::warn!("CLIC: VM id {} exceeds VSID width, irq {} not delegated", vm, id);
            return;
        };
        if !self.has_source(id) {
            log::warn!("CLIC: cannot delegate unimplemented irq {} to VM {}", id, vm);
            return;
        }

        match self.write_virt_control(id, &vcfg) {
            Ok(()) => log::debug!("CLIC: irq {} delegated to VM {}", id, vm),
            Err(e) => log::warn!("CLIC: delegating irq {} to VM {} failed: {}", id, vm, e),
        }
    }

    /// Hand source `id` to the running guest after it fired
    ///
    /// Runs on the trap path and never spins: if another hart is in the
    /// middle of reconfiguring the CLIC, this occurrence is dropped. A
    /// source still owned by M-mode is first delegated through firmware;
    /// if firmware refuses, the occurrence is dropped too.
    pub fn delegate_pending_irq<F: Firmware>(
        &self,
        firmware: &F,
        id: IrqId,
        running_vm: VmId,
        default_control: &InterruptControl,
    ) {
        if !cfg!(feature = "vclic") {
            return;
        }

        let Some(vcfg) = vm_virt_control(running_vm) else {
            log::warn!("CLIC: VM id {} exceeds VSID width, irq {} dropped", running_vm, id);
            return;
        };
        let Ok(_guard) = self.try_lock_rmw() else {
            log::warn!("CLIC: irq {} busy, re-delegation abandoned", id);
            return;
        };

        let cfg = match self.read_control(id) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("CLIC: cannot read irq {}: {}", id, e);
                return;
            }
        };

        if cfg.attr.mode == PrivilegeMode::Machine {
            log::trace!("CLIC: irq {} still owned by M-mode, asking firmware", id);
            if let Err(e) = firmware.clic_delegate(id) {
                log::warn!("CLIC: firmware delegation of irq {} failed: {:?}", id, e);
                return;
            }
        }

        let result = self
            .write_control(id, default_control)
            .and_then(|_| self.write_virt_control(id, &vcfg));
        if let Err(e) = result {
            log::warn!("CLIC: re-delegating irq {} failed: {}", id, e);
        }
    }
}
