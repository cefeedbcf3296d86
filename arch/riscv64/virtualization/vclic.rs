//! Virtual CLIC
//!
//! Per-VM mirror of the CLIC sources delegated to a guest. Guest accesses
//! to its CLICCFG and CLICINT registers are trapped and served from this
//! state instead of the hardware. The hypervisor reconciles the mirror
//! with the physical CLIC before any change takes effect.

use crate::arch::riscv64::interrupt::clic::regs::{
    clic_regs, decode_global_config, decode_interrupt_control, encode_global_config,
    encode_interrupt_control, EnableState, IntAttr, InterruptControl, PendingState, PrivilegeMode,
    TriggerType, VectorMode,
};
use crate::arch::riscv64::interrupt::mmio::check_access;
use crate::config::CLIC_MAX_INTERRUPTS;
use crate::utils::IrqBitmap;
use crate::{Error, IrqId, Result, VmId};
use spin::Mutex;

/// Guest-physical range trapped for emulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulRegion {
    pub base: usize,
    pub size: usize,
}

impl EmulRegion {
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Check if `addr` falls in the region
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// A trapped guest access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulAccess {
    /// Guest-physical address
    pub addr: usize,
    /// Access width in bytes
    pub width: usize,
    /// Store if set, load otherwise
    pub write: bool,
    /// Value stored; ignored for loads
    pub value: u32,
}

impl EmulAccess {
    pub const fn read(addr: usize, width: usize) -> Self {
        Self { addr, width, write: false, value: 0 }
    }

    pub const fn write(addr: usize, width: usize, value: u32) -> Self {
        Self { addr, width, write: true, value }
    }
}

struct VclicState {
    owned: IrqBitmap,
    pend: IrqBitmap,
    enbl: IrqBitmap,
    prio: [u8; CLIC_MAX_INTERRUPTS],
    cliccfg: u32,
}

/// Virtual CLIC of one VM
pub struct Vclic {
    vm_id: VmId,
    cfg_region: EmulRegion,
    int_region: EmulRegion,
    state: Mutex<VclicState>,
}

impl Vclic {
    /// Create the virtual CLIC of `vm_id`, with the guest's CLIC at `guest_base`
    pub fn new(vm_id: VmId, guest_base: usize) -> Self {
        Self {
            vm_id,
            cfg_region: EmulRegion::new(guest_base + clic_regs::CLICCFG, 4),
            int_region: EmulRegion::new(
                guest_base + clic_regs::CLICINT_BASE,
                4 * CLIC_MAX_INTERRUPTS,
            ),
            state: Mutex::new(VclicState {
                owned: IrqBitmap::new(),
                pend: IrqBitmap::new(),
                enbl: IrqBitmap::new(),
                prio: [0; CLIC_MAX_INTERRUPTS],
                cliccfg: 0,
            }),
        }
    }

    pub fn vm_id(&self) -> VmId {
        self.vm_id
    }

    /// Region trapped for CLICCFG
    pub fn cfg_region(&self) -> EmulRegion {
        self.cfg_region
    }

    /// Region trapped for the CLICINT array
    pub fn int_region(&self) -> EmulRegion {
        self.int_region
    }

    /// Mark source `id` as delegated to this VM
    pub fn assign(&self, id: IrqId) -> Result<()> {
        if id >= CLIC_MAX_INTERRUPTS {
            return Err(Error::OutOfRange);
        }
        self.state.lock().owned.set(id, true);
        log::debug!("vCLIC{}: source {} assigned", self.vm_id, id);
        Ok(())
    }

    /// Check if source `id` is delegated to this VM
    pub fn is_owned(&self, id: IrqId) -> bool {
        self.state.lock().owned.get(id)
    }

    /// Latch an occurrence of source `id`
    ///
    /// Returns whether the guest has the source enabled.
    pub fn inject(&self, id: IrqId) -> bool {
        let mut state = self.state.lock();
        if !state.owned.get(id) {
            log::warn!("vCLIC{}: inject of unowned source {}", self.vm_id, id);
            return false;
        }
        state.pend.set(id, true);
        state.enbl.get(id)
    }

    /// Drop the pending state of source `id`
    pub fn clear(&self, id: IrqId) {
        self.state.lock().pend.set(id, false);
    }

    /// Most urgent source that is both pending and enabled
    ///
    /// Ties in priority go to the lowest source ID.
    pub fn highest_pending(&self) -> Option<IrqId> {
        let state = self.state.lock();
        let mut best: Option<IrqId> = None;
        for id in state.pend.iter_set() {
            if !state.enbl.get(id) {
                continue;
            }
            match best {
                Some(b) if state.prio[b] >= state.prio[id] => {}
                _ => best = Some(id),
            }
        }
        best
    }

    /// Serve a trapped guest access
    ///
    /// Returns the value loaded, or 0 for stores.
    pub fn emulate(&self, access: &EmulAccess) -> Result<u32> {
        if self.cfg_region.contains(access.addr) {
            let offset = access.addr - self.cfg_region.base;
            Self::check_width(access, offset, self.cfg_region.size)?;
            if access.write {
                self.handle_cliccfg_write(access.value);
                Ok(0)
            } else {
                Ok(self.handle_cliccfg_read())
            }
        } else if self.int_region.contains(access.addr) {
            let offset = access.addr - self.int_region.base;
            Self::check_width(access, offset, self.int_region.size)?;
            let id = offset / 4;
            if access.write {
                self.handle_clicint_write(id, access.value);
                Ok(0)
            } else {
                Ok(self.handle_clicint_read(id))
            }
        } else {
            Err(Error::OutOfRange)
        }
    }

    fn check_width(access: &EmulAccess, offset: usize, size: usize) -> Result<()> {
        if access.width != 4 {
            log::warn!("vCLIC: {}-byte access at {:#x} not supported", access.width, access.addr);
            return Err(Error::InvalidArgument);
        }
        check_access(offset, size)
    }

    /// Guest load of CLICCFG
    pub fn handle_cliccfg_read(&self) -> u32 {
        self.state.lock().cliccfg
    }

    /// Guest store to CLICCFG; reserved bits read back as zero
    pub fn handle_cliccfg_write(&self, value: u32) {
        let cfg = decode_global_config(value);
        self.state.lock().cliccfg =
            encode_global_config(cfg.nmbits, cfg.mnlbits, cfg.snlbits, cfg.unlbits);
    }

    /// Guest load of CLICINT for source `id`
    pub fn handle_clicint_read(&self, id: IrqId) -> u32 {
        let state = self.state.lock();
        if !state.owned.get(id) {
            return 0;
        }

        let cfg = InterruptControl {
            pending: if state.pend.get(id) { PendingState::Set } else { PendingState::Clear },
            enable: if state.enbl.get(id) { EnableState::Enabled } else { EnableState::Masked },
            attr: IntAttr {
                shv: VectorMode::Off,
                trig: TriggerType::PositiveEdge,
                mode: PrivilegeMode::Supervisor,
            },
            ctl: state.prio[id],
        };
        encode_interrupt_control(&cfg)
    }

    /// Guest store to CLICINT for source `id`
    ///
    /// Only pending, enable and priority are guest-writable.
    pub fn handle_clicint_write(&self, id: IrqId, value: u32) {
        let mut state = self.state.lock();
        if !state.owned.get(id) {
            log::warn!("vCLIC{}: write to unowned source {} ignored", self.vm_id, id);
            return;
        }

        let cfg = decode_interrupt_control(value);
        state.pend.set(id, cfg.is_pending());
        state.enbl.set(id, cfg.is_enabled());
        state.prio[id] = cfg.ctl;
    }
}
