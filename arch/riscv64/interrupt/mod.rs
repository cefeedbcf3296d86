//! RISC-V Interrupt Module
//!
//! Unified interrupt dispatch for the hypervisor. Callers use one flat
//! logical ID space:
//! - IDs below [`CLIC_MAX_INTERRUPTS`] are CLIC sources
//! - IDs from [`CLIC_MAX_INTERRUPTS`] up are PLIC sources, offset by it
//! - Without a CLIC, [`SOFT_INT_ID`] and [`TIMR_INT_ID`] map to the
//!   `sie`/`sip` lines and other IDs below the boundary name PLIC sources
//!   directly
//!
//! Whether the CLIC is in use is decided once at bring-up and stored in
//! [`ControllerMode`]. Nothing in this layer aborts: unsupported requests
//! are logged and ignored.

pub mod clic;
pub mod mmio;
pub mod plic;

use self::clic::{Clic, DelegationSummary, CLIC_MMIO_SIZE};
use self::mmio::{DeviceMapper, RegisterIo};
use self::plic::LegacyController;
use crate::arch::riscv64::cpu::csr::{scause_code, Csrs, Sie, Sip};
use crate::arch::riscv64::smp::sbi::Firmware;
use crate::config::{
    InterruptConfig, PlatformDescriptor, CLIC_MAX_INTERRUPTS, EXTR_INT_ID, PLIC_MAX_INTERRUPTS,
    SOFT_INT_ID, TIMR_INT_ID,
};
use crate::utils::{fence_sync, IrqBitmap, SyncBarrier};
use crate::{Error, HartId, IrqId, Result, VmId};
use spin::Once;

/// Low bits of `scause` carrying the source ID in CLIC mode
pub const CLIC_SCAUSE_ID_MASK: usize = 0xFFF;

/// Result of the hypervisor's per-ID handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqResult {
    /// The hypervisor consumed the interrupt
    HandledByHyp,
    /// The interrupt was injected into a guest, which completes it
    ForwardToVm,
}

/// The hypervisor's generic per-ID interrupt handler
pub trait IrqHandler {
    fn handle(&mut self, id: IrqId) -> IrqResult;
}

impl<F: FnMut(IrqId) -> IrqResult> IrqHandler for F {
    fn handle(&mut self, id: IrqId) -> IrqResult {
        self(id)
    }
}

/// Routing decision taken by [`InterruptController::handle_trap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Forwarded straight to the handler
    Dispatched { id: IrqId, result: IrqResult },
    /// Claimed from the PLIC; `id` is the logical ID
    External { id: IrqId, result: IrqResult },
    /// External interrupt with nothing to claim
    NothingClaimed,
    /// Cause not recognised
    Ignored { cause: usize },
}

/// Interrupt hardware in use, fixed at bring-up
pub enum ControllerMode<R> {
    /// CLIC sources delegated to S-mode, PLIC behind source [`EXTR_INT_ID`]
    Clic(Clic<R>),
    /// PLIC only, software and timer lines through `sie`/`sip`
    Legacy,
}

/// Hypervisor-wide interrupt controller
pub struct InterruptController<R, L, F, C> {
    mode: ControllerMode<R>,
    legacy: L,
    firmware: F,
    csrs: C,
    config: InterruptConfig,
    delegation: Option<DelegationSummary>,
}

/// Logical ID of PLIC source `id`
pub const fn plic_to_logical(id: u32) -> IrqId {
    CLIC_MAX_INTERRUPTS + id as IrqId
}

/// Check if `id` is already claimed in `bitmap`
pub fn conflict(bitmap: &IrqBitmap, id: IrqId) -> bool {
    bitmap.get(id)
}

impl<R, L, F, C> InterruptController<R, L, F, C>
where
    R: RegisterIo,
    L: LegacyController,
    F: Firmware,
    C: Csrs,
{
    /// Global bring-up, boot hart only
    ///
    /// Maps the CLIC window when the platform has one, delegates its
    /// sources to S-mode and switches firmware to CLIC mode, then runs the
    /// legacy controller's initializer. Any CLIC failure leaves the
    /// controller in legacy mode.
    pub fn bring_up<M>(
        platform: &PlatformDescriptor,
        config: InterruptConfig,
        mapper: &M,
        legacy: L,
        firmware: F,
        csrs: C,
    ) -> Self
    where
        M: DeviceMapper<Io = R>,
    {
        let mut delegation = None;
        let mode = match platform.clic_base {
            Some(base) => {
                log::info!("Platform has CLIC at {:#x}", base);
                match Self::clic_bring_up(base, &config, mapper, &firmware) {
                    Ok((clic, summary)) => {
                        delegation = Some(summary);
                        ControllerMode::Clic(clic)
                    }
                    Err(e) => {
                        log::error!("CLIC unavailable ({}), falling back to PLIC", e);
                        ControllerMode::Legacy
                    }
                }
            }
            None => ControllerMode::Legacy,
        };

        legacy.init();

        Self {
            mode,
            legacy,
            firmware,
            csrs,
            config,
            delegation,
        }
    }

    fn clic_bring_up<M>(
        base: usize,
        config: &InterruptConfig,
        mapper: &M,
        firmware: &F,
    ) -> Result<(Clic<R>, DelegationSummary)>
    where
        M: DeviceMapper<Io = R>,
    {
        let regs = mapper.map_device(base, CLIC_MMIO_SIZE)?;
        fence_sync();

        let num_sources = Clic::<R>::discover(firmware)?;
        if num_sources == 0 {
            return Err(Error::ResourceUnavailable);
        }

        let clic = Clic::new(regs, num_sources);
        let summary = clic.delegate_sources(firmware, &config.default_control);

        if let Err(e) = firmware.clic_enable() {
            log::error!("Firmware refused to switch to CLIC mode: {:?}", e);
        }
        Ok((clic, summary))
    }

    /// Per-hart setup, after the global bring-up
    pub fn cpu_init(&self, hart: HartId) {
        self.legacy.cpu_init(hart);
        self.csrs.sie_set(Sie::SEIE);
        self.enable(hart, TIMR_INT_ID, true);
        if self.is_clic_mode() {
            self.enable(hart, EXTR_INT_ID, true);
        }
        log::debug!("Hart {} interrupts initialized", hart);
    }

    /// Active mode
    pub fn mode(&self) -> &ControllerMode<R> {
        &self.mode
    }

    /// Check if CLIC mode is active
    pub fn is_clic_mode(&self) -> bool {
        matches!(self.mode, ControllerMode::Clic(_))
    }

    /// CLIC driver, in CLIC mode
    pub fn clic(&self) -> Option<&Clic<R>> {
        match &self.mode {
            ControllerMode::Clic(clic) => Some(clic),
            ControllerMode::Legacy => None,
        }
    }

    /// Legacy controller
    pub fn legacy(&self) -> &L {
        &self.legacy
    }

    /// Firmware interface
    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    /// CSR interface
    pub fn csrs(&self) -> &C {
        &self.csrs
    }

    /// Runtime tunables
    pub fn config(&self) -> &InterruptConfig {
        &self.config
    }

    /// Outcome of the CLIC delegation pass, in CLIC mode
    pub fn delegation_summary(&self) -> Option<&DelegationSummary> {
        self.delegation.as_ref()
    }

    /// PLIC-local ID of a logical interrupt routed to the legacy controller
    ///
    /// IDs from the partition boundary up are offset by it. Without a CLIC,
    /// IDs below the boundary name PLIC sources directly.
    fn legacy_id(id: IrqId) -> Option<u32> {
        let local = id.checked_sub(CLIC_MAX_INTERRUPTS).unwrap_or(id);
        (local < PLIC_MAX_INTERRUPTS).then_some(local as u32)
    }

    /// Enable or disable logical interrupt `id` for `hart`
    pub fn enable(&self, hart: HartId, id: IrqId, enabled: bool) {
        if id >= CLIC_MAX_INTERRUPTS {
            self.plic_enable(hart, id, enabled);
            return;
        }

        match &self.mode {
            ControllerMode::Clic(clic) => {
                if !clic.has_source(id) {
                    log::warn!("Ignoring enabling irq {} in CLIC mode", id);
                    return;
                }
                let mut result = clic.set_enable(id, enabled);
                if let (true, Some(priority)) = (enabled, self.config.enable_priority) {
                    result = result.and_then(|_| clic.set_priority(id, priority));
                }
                if let Err(e) = result {
                    log::warn!("CLIC: cannot configure irq {}: {}", id, e);
                }
            }
            ControllerMode::Legacy => {
                let line = match id {
                    SOFT_INT_ID => Sie::SSIE,
                    TIMR_INT_ID => Sie::STIE,
                    _ => {
                        self.plic_enable(hart, id, enabled);
                        return;
                    }
                };
                if enabled {
                    self.csrs.sie_set(line);
                } else {
                    self.csrs.sie_clear(line);
                }
            }
        }
    }

    fn plic_enable(&self, hart: HartId, id: IrqId, enabled: bool) {
        let Some(local) = Self::legacy_id(id) else {
            log::warn!("Ignoring enabling out-of-range irq {}", id);
            return;
        };
        self.legacy.set_enable(hart, local, enabled);
        if enabled {
            self.legacy.set_priority(local, self.config.plic_priority());
        }
    }

    /// Check if logical interrupt `id` is pending
    pub fn check_pending(&self, id: IrqId) -> bool {
        if id >= CLIC_MAX_INTERRUPTS {
            return self.plic_pending(id);
        }

        match &self.mode {
            ControllerMode::Clic(clic) if clic.has_source(id) => {
                clic.get_pending(id).unwrap_or_else(|e| {
                    log::warn!("CLIC: cannot read pending bit of irq {}: {}", id, e);
                    false
                })
            }
            ControllerMode::Clic(_) => {
                log::warn!("Checking unimplemented irq {} in CLIC mode", id);
                false
            }
            ControllerMode::Legacy => match id {
                SOFT_INT_ID => self.csrs.sip().contains(Sip::SSIP),
                TIMR_INT_ID => self.csrs.sip().contains(Sip::STIP),
                _ => self.plic_pending(id),
            },
        }
    }

    fn plic_pending(&self, id: IrqId) -> bool {
        match Self::legacy_id(id) {
            Some(local) => self.legacy.pending(local),
            None => {
                log::warn!("Checking out-of-range irq {}", id);
                false
            }
        }
    }

    /// Clear the pending state of logical interrupt `id`
    ///
    /// Timer and external pending state cannot be cleared by software in
    /// either mode. Those requests, like any other unsupported one, are
    /// reported and left alone.
    pub fn clear(&self, id: IrqId) {
        match &self.mode {
            _ if id == TIMR_INT_ID || id == EXTR_INT_ID => {
                log::warn!("trying to clear timer or external interrupt (irq {})", id)
            }
            ControllerMode::Clic(clic) if clic.has_source(id) => {
                if let Err(e) = clic.set_pending(id, false) {
                    log::warn!("CLIC: cannot clear irq {}: {}", id, e);
                }
            }
            ControllerMode::Legacy if id == SOFT_INT_ID => self.csrs.sip_clear(Sip::SSIP),
            _ => log::warn!("Ignoring clear of irq {}", id),
        }
    }

    /// Handle an interrupt trap on `hart`
    pub fn handle_trap<H: IrqHandler>(&self, hart: HartId, handler: &mut H) -> TrapOutcome {
        let cause = self.csrs.scause();

        if self.is_clic_mode() {
            let id = cause & CLIC_SCAUSE_ID_MASK;
            if id == EXTR_INT_ID {
                return self.plic_handle(hart, handler);
            }
            return TrapOutcome::Dispatched { id, result: handler.handle(id) };
        }

        match cause {
            scause_code::SSI => {
                let result = handler.handle(SOFT_INT_ID);
                self.csrs.sip_clear(Sip::SSIP);
                TrapOutcome::Dispatched { id: SOFT_INT_ID, result }
            }
            // STIP is cleared by programming the next timer event
            scause_code::STI => TrapOutcome::Dispatched {
                id: TIMR_INT_ID,
                result: handler.handle(TIMR_INT_ID),
            },
            scause_code::SEI => self.plic_handle(hart, handler),
            _ => {
                log::warn!("Ignoring unknown interrupt (scause={:#x})", cause);
                TrapOutcome::Ignored { cause }
            }
        }
    }

    fn plic_handle<H: IrqHandler>(&self, hart: HartId, handler: &mut H) -> TrapOutcome {
        let local = self.legacy.claim(hart);
        if local == 0 {
            return TrapOutcome::NothingClaimed;
        }

        let id = plic_to_logical(local);
        let result = handler.handle(id);
        if result == IrqResult::HandledByHyp {
            self.legacy.complete(hart, local);
        }
        TrapOutcome::External { id, result }
    }

    /// Give guest `vm` ownership of logical interrupt `id`
    pub fn assign_to_vm(&self, vm: VmId, id: IrqId) {
        match &self.mode {
            ControllerMode::Clic(clic) if id < CLIC_MAX_INTERRUPTS => clic.delegate_to_vm(id, vm),
            _ => match Self::legacy_id(id) {
                Some(local) => self.legacy.assign_to_vm(vm, local),
                None => log::warn!("Cannot assign out-of-range irq {} to VM {}", id, vm),
            },
        }
    }

    /// Re-delegate a CLIC source that fired while `running_vm` executed
    pub fn delegate_pending_irq(&self, id: IrqId, running_vm: VmId) {
        match &self.mode {
            ControllerMode::Clic(clic) if clic.has_source(id) => {
                clic.delegate_pending_irq(&self.firmware, id, running_vm, &self.config.default_control)
            }
            _ => log::warn!("Cannot re-delegate irq {}", id),
        }
    }

    /// Send an IPI to `target`
    pub fn ipi_send(&self, target: HartId) {
        let Some(mask) = 1usize.checked_shl(target as u32) else {
            log::warn!("Cannot send IPI to hart {}", target);
            return;
        };
        if let Err(e) = self.firmware.send_ipi(mask, 0) {
            log::warn!("IPI to hart {} failed: {:?}", target, e);
        }
    }

    /// Set or clear the hart-wide interrupt enable
    pub fn cpu_enable(&self, enabled: bool) {
        self.csrs.set_interrupts_enabled(enabled);
    }
}

/// Bring the interrupt layer up on `hart`
///
/// The platform's boot hart builds the controller with `make` and stores it
/// in `slot`.
/// Every hart then meets at `barrier` before running its per-hart setup, so
/// no hart touches its PLIC context before the global bring-up is done.
pub fn system_init<'a, R, L, F, C, B>(
    slot: &'a Once<InterruptController<R, L, F, C>>,
    barrier: &SyncBarrier,
    platform: &PlatformDescriptor,
    hart: HartId,
    make: B,
) -> Result<&'a InterruptController<R, L, F, C>>
where
    R: RegisterIo,
    L: LegacyController,
    F: Firmware,
    C: Csrs,
    B: FnOnce() -> Result<InterruptController<R, L, F, C>>,
{
    let built = if hart == platform.boot_hart {
        slot.try_call_once(make).map(|_| ())
    } else {
        Ok(())
    };

    barrier.wait();
    built?;

    let controller = slot.get().ok_or(Error::NotInitialized)?;
    controller.cpu_init(hart);
    Ok(controller)
}
