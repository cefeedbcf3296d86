//! RISC-V PLIC (Platform-Level Interrupt Controller) Support
//!
//! The unified dispatch layer talks to the PLIC through [`LegacyController`],
//! using PLIC-local source IDs (logical ID minus the partition boundary).
//! [`Plic`] is a thin driver for the standard PLIC memory map covering:
//! - Interrupt priority management
//! - Per-context enable and threshold
//! - Interrupt claiming and completion
//! - Hardware ownership of sources passed through to guests

use super::mmio::{DeviceMapper, RegisterIo};
use crate::config::{PlatformDescriptor, PLIC_MAX_INTERRUPTS};
use crate::{Error, HartId, Result, VmId};
use heapless::FnvIndexMap;
use spin::Mutex;

/// Operations the dispatch layer needs from the legacy controller
pub trait LegacyController {
    /// Global initialization, boot hart only
    fn init(&self);

    /// Per-hart initialization of the hart's S-mode context
    fn cpu_init(&self, hart: HartId);

    /// Enable or disable source `id` for `hart`
    fn set_enable(&self, hart: HartId, id: u32, enabled: bool);

    /// Set the priority of source `id`
    fn set_priority(&self, id: u32, priority: u32);

    /// Check if source `id` is pending
    fn pending(&self, id: u32) -> bool;

    /// Claim the highest priority pending source for `hart`, 0 if none
    fn claim(&self, hart: HartId) -> u32;

    /// Signal completion of source `id` for `hart`
    fn complete(&self, hart: HartId, id: u32);

    /// Hand hardware ownership of source `id` to guest `vm`
    fn assign_to_vm(&self, vm: VmId, id: u32);
}

/// PLIC register offsets
pub mod plic_regs {
    // Priority registers (4 bytes each)
    pub const PRIORITY_BASE: usize = 0x000000;
    // Pending bits, 32 sources per word
    pub const PENDING_BASE: usize = 0x001000;
    // Enable bits per context
    pub const ENABLE_BASE: usize = 0x002000;
    pub const ENABLE_STRIDE: usize = 0x80;
    // Per-context threshold and claim/complete, relative to CLAIMCMPLT_OFF
    pub const CLAIMCMPLT_OFF: usize = 0x200000;
    pub const CONTEXT_STRIDE: usize = 0x1000;
    pub const THRESHOLD: usize = 0x0;
    pub const CLAIM_COMPLETE: usize = 0x4;
}

/// Number of guest-owned PLIC sources tracked by [`Plic`]
pub const PLIC_MAX_HW_ASSIGNED: usize = 64;

/// S-mode PLIC context of `hart`
pub const fn plic_context(hart: HartId) -> usize {
    2 * hart + 1
}

/// PLIC driver
pub struct Plic<R> {
    /// Priority, pending and enable registers
    global: R,
    /// Threshold and claim/complete registers
    hart: R,
    /// Number of contexts mapped in `hart`
    num_contexts: usize,
    /// Guest owning each passed-through source
    owners: Mutex<FnvIndexMap<u32, VmId, PLIC_MAX_HW_ASSIGNED>>,
}

impl<R: RegisterIo> Plic<R> {
    /// Create new PLIC driver over already mapped windows
    pub fn new(global: R, hart: R, num_contexts: usize) -> Self {
        Self {
            global,
            hart,
            num_contexts,
            owners: Mutex::new(FnvIndexMap::new()),
        }
    }

    /// Map the PLIC windows described by `platform` and create the driver
    pub fn map<M>(mapper: &M, platform: &PlatformDescriptor) -> Result<Self>
    where
        M: DeviceMapper<Io = R>,
    {
        let num_contexts = 2 * platform.cpu_num;
        let global = mapper.map_device(platform.plic_base, plic_regs::CLAIMCMPLT_OFF)?;
        let hart = mapper.map_device(
            platform.plic_base + plic_regs::CLAIMCMPLT_OFF,
            plic_regs::CONTEXT_STRIDE * num_contexts,
        )?;
        log::info!(
            "PLIC mapped at {:#x} with {} contexts",
            platform.plic_base,
            num_contexts
        );
        Ok(Self::new(global, hart, num_contexts))
    }

    fn check_source(id: u32) -> Result<usize> {
        let id = id as usize;
        if id == 0 || id >= PLIC_MAX_INTERRUPTS {
            return Err(Error::OutOfRange);
        }
        Ok(id)
    }

    fn check_context(&self, hart: HartId) -> Result<usize> {
        let context = plic_context(hart);
        if context >= self.num_contexts {
            return Err(Error::OutOfRange);
        }
        Ok(context)
    }

    /// Set interrupt priority
    pub fn try_set_priority(&self, id: u32, priority: u32) -> Result<()> {
        let id = Self::check_source(id)?;
        self.global.write32(plic_regs::PRIORITY_BASE + id * 4, priority)
    }

    /// Get interrupt priority
    pub fn priority(&self, id: u32) -> Result<u32> {
        let id = Self::check_source(id)?;
        self.global.read32(plic_regs::PRIORITY_BASE + id * 4)
    }

    /// Check the pending bit of a source
    pub fn try_pending(&self, id: u32) -> Result<bool> {
        let id = Self::check_source(id)?;
        let word = self.global.read32(plic_regs::PENDING_BASE + (id / 32) * 4)?;
        Ok(word & (1 << (id % 32)) != 0)
    }

    /// Enable or disable a source for a hart's S-mode context
    pub fn try_set_enable(&self, hart: HartId, id: u32, enabled: bool) -> Result<()> {
        let id = Self::check_source(id)?;
        let context = self.check_context(hart)?;
        let offset = plic_regs::ENABLE_BASE + context * plic_regs::ENABLE_STRIDE + (id / 32) * 4;

        let mut value = self.global.read32(offset)?;
        if enabled {
            value |= 1 << (id % 32);
        } else {
            value &= !(1 << (id % 32));
        }
        self.global.write32(offset, value)
    }

    /// Check if a source is enabled for a hart's S-mode context
    pub fn enabled(&self, hart: HartId, id: u32) -> Result<bool> {
        let id = Self::check_source(id)?;
        let context = self.check_context(hart)?;
        let offset = plic_regs::ENABLE_BASE + context * plic_regs::ENABLE_STRIDE + (id / 32) * 4;
        Ok(self.global.read32(offset)? & (1 << (id % 32)) != 0)
    }

    /// Set the priority threshold of a hart's S-mode context
    pub fn set_threshold(&self, hart: HartId, threshold: u32) -> Result<()> {
        let context = self.check_context(hart)?;
        self.hart
            .write32(context * plic_regs::CONTEXT_STRIDE + plic_regs::THRESHOLD, threshold)
    }

    fn try_claim(&self, hart: HartId) -> Result<u32> {
        let context = self.check_context(hart)?;
        self.hart
            .read32(context * plic_regs::CONTEXT_STRIDE + plic_regs::CLAIM_COMPLETE)
    }

    fn try_complete(&self, hart: HartId, id: u32) -> Result<()> {
        let context = self.check_context(hart)?;
        self.hart
            .write32(context * plic_regs::CONTEXT_STRIDE + plic_regs::CLAIM_COMPLETE, id)
    }

    fn disable_all(&self, hart: HartId) -> Result<()> {
        let context = self.check_context(hart)?;
        for word in 0..PLIC_MAX_INTERRUPTS / 32 {
            self.global.write32(
                plic_regs::ENABLE_BASE + context * plic_regs::ENABLE_STRIDE + word * 4,
                0,
            )?;
        }
        Ok(())
    }

    /// Guest owning a passed-through source
    pub fn owner(&self, id: u32) -> Option<VmId> {
        self.owners.lock().get(&id).copied()
    }
}

impl<R: RegisterIo> LegacyController for Plic<R> {
    fn init(&self) {
        // Priority 0 never interrupts: every source starts disabled
        for id in 1..PLIC_MAX_INTERRUPTS as u32 {
            if let Err(e) = self.try_set_priority(id, 0) {
                log::error!("PLIC: failed to reset priority of source {}: {}", id, e);
                return;
            }
        }
        log::info!("PLIC initialized with {} sources", PLIC_MAX_INTERRUPTS);
    }

    fn cpu_init(&self, hart: HartId) {
        let result = self.disable_all(hart).and_then(|_| self.set_threshold(hart, 0));
        if let Err(e) = result {
            log::error!("PLIC: hart {} context init failed: {}", hart, e);
        }
    }

    fn set_enable(&self, hart: HartId, id: u32, enabled: bool) {
        if let Err(e) = self.try_set_enable(hart, id, enabled) {
            log::warn!("PLIC: cannot set enable of source {} on hart {}: {}", id, hart, e);
        }
    }

    fn set_priority(&self, id: u32, priority: u32) {
        if let Err(e) = self.try_set_priority(id, priority) {
            log::warn!("PLIC: cannot set priority of source {}: {}", id, e);
        }
    }

    fn pending(&self, id: u32) -> bool {
        self.try_pending(id).unwrap_or_else(|e| {
            log::warn!("PLIC: cannot read pending bit of source {}: {}", id, e);
            false
        })
    }

    fn claim(&self, hart: HartId) -> u32 {
        self.try_claim(hart).unwrap_or_else(|e| {
            log::warn!("PLIC: claim failed on hart {}: {}", hart, e);
            0
        })
    }

    fn complete(&self, hart: HartId, id: u32) {
        if let Err(e) = self.try_complete(hart, id) {
            log::warn!("PLIC: complete of source {} failed on hart {}: {}", id, hart, e);
        }
    }

    fn assign_to_vm(&self, vm: VmId, id: u32) {
        if Self::check_source(id).is_err() {
            log::warn!("PLIC: cannot assign source {} to VM {}", id, vm);
            return;
        }
        let mut owners = self.owners.lock();
        match owners.insert(id, vm) {
            Ok(Some(previous)) if previous != vm => {
                log::warn!("PLIC: source {} moved from VM {} to VM {}", id, previous, vm)
            }
            Ok(_) => log::debug!("PLIC: source {} assigned to VM {}", id, vm),
            Err(_) => log::warn!("PLIC: ownership table full, source {} not assigned", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMapper, FakeRegisters};

    fn plic() -> (Plic<FakeRegisters>, FakeRegisters, FakeRegisters) {
        let global = FakeRegisters::new(plic_regs::CLAIMCMPLT_OFF);
        let hart = FakeRegisters::new(2 * plic_regs::CONTEXT_STRIDE);
        (Plic::new(global.clone(), hart.clone(), 2), global, hart)
    }

    #[test]
    fn test_priority_and_pending() {
        let (plic, global, _hart) = plic();

        LegacyController::set_priority(&plic, 10, 0xFE);
        assert_eq!(plic.priority(10), Ok(0xFE));
        assert_eq!(plic.try_set_priority(0, 1), Err(Error::OutOfRange));

        global.poke(plic_regs::PENDING_BASE, 1 << 10);
        assert!(LegacyController::pending(&plic, 10));
        assert!(!LegacyController::pending(&plic, 11));
    }

    #[test]
    fn test_enable_uses_supervisor_context() {
        let (plic, global, _hart) = plic();

        LegacyController::set_enable(&plic, 0, 33, true);
        let offset = plic_regs::ENABLE_BASE + plic_regs::ENABLE_STRIDE + 4;
        assert_eq!(global.peek(offset), 1 << 1);
        assert_eq!(plic.enabled(0, 33), Ok(true));

        LegacyController::set_enable(&plic, 0, 33, false);
        assert_eq!(global.peek(offset), 0);

        // Hart 1 has no context in a two-context window
        assert_eq!(plic.try_set_enable(1, 33, true), Err(Error::OutOfRange));
    }

    #[test]
    fn test_claim_complete() {
        let (plic, _global, hart) = plic();

        let claim = plic_regs::CONTEXT_STRIDE + plic_regs::CLAIM_COMPLETE;
        hart.poke(claim, 7);
        assert_eq!(plic.claim(0), 7);
        plic.complete(0, 7);
        assert_eq!(hart.writes_to(claim), vec![7]);
    }

    #[test]
    fn test_assign_to_vm_records_owner() {
        let (plic, _global, _hart) = plic();

        plic.assign_to_vm(3, 12);
        assert_eq!(plic.owner(12), Some(3));
        assert_eq!(plic.owner(13), None);

        plic.assign_to_vm(3, PLIC_MAX_INTERRUPTS as u32);
        assert_eq!(plic.owner(PLIC_MAX_INTERRUPTS as u32), None);
    }

    #[test]
    fn test_map_uses_platform_layout() {
        let mapper = FakeMapper::new();
        let platform = PlatformDescriptor {
            clic_base: None,
            cpu_num: 2,
            ..PlatformDescriptor::cva6()
        };
        let plic = Plic::map(&mapper, &platform).unwrap();
        assert_eq!(plic.num_contexts, 4);
        assert_eq!(
            mapper.mappings(),
            vec![
                (0x0c00_0000, plic_regs::CLAIMCMPLT_OFF),
                (0x0c00_0000 + plic_regs::CLAIMCMPLT_OFF, 4 * plic_regs::CONTEXT_STRIDE),
            ]
        );
    }

    #[test]
    fn test_cpu_init_clears_context() {
        let (plic, global, hart) = plic();

        let offset = plic_regs::ENABLE_BASE + plic_regs::ENABLE_STRIDE;
        global.poke(offset, 0xffff_ffff);
        hart.poke(plic_regs::CONTEXT_STRIDE, 5);
        plic.cpu_init(0);
        assert_eq!(global.peek(offset), 0);
        assert_eq!(hart.peek(plic_regs::CONTEXT_STRIDE), 0);
    }
}
