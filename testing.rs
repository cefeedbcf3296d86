//! Test doubles for the hardware seams
//!
//! Only built for unit tests. Every fake is `Sync` so a controller built
//! from them can live in a `spin::Once` shared between test threads.

use crate::arch::riscv64::cpu::csr::{Csrs, Sie, Sip};
use crate::arch::riscv64::interrupt::mmio::{check_access, DeviceMapper, RegisterIo};
use crate::arch::riscv64::interrupt::plic::LegacyController;
use crate::arch::riscv64::interrupt::{IrqHandler, IrqResult};
use crate::arch::riscv64::smp::sbi::{Firmware, SbiError};
use crate::{Error, HartId, IrqId, Result, VmId};
use spin::Mutex;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::string::{String, ToString};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::vec::Vec;

#[derive(Debug, Default)]
struct RegisterFile {
    values: BTreeMap<usize, u32>,
    writes: Vec<(usize, u32)>,
}

/// Sparse register file; clones share the same registers
#[derive(Debug, Clone)]
pub struct FakeRegisters {
    size: usize,
    file: Arc<Mutex<RegisterFile>>,
}

impl FakeRegisters {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            file: Arc::new(Mutex::new(RegisterFile::default())),
        }
    }

    /// Set a register without recording a write
    pub fn poke(&self, offset: usize, value: u32) {
        self.file.lock().values.insert(offset, value);
    }

    /// Read a register without going through `RegisterIo`
    pub fn peek(&self, offset: usize) -> u32 {
        self.file.lock().values.get(&offset).copied().unwrap_or(0)
    }

    /// Values written to `offset` through `RegisterIo`, oldest first
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.file
            .lock()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of writes through `RegisterIo`
    pub fn write_count(&self) -> usize {
        self.file.lock().writes.len()
    }
}

impl RegisterIo for FakeRegisters {
    fn read32(&self, offset: usize) -> Result<u32> {
        check_access(offset, self.size)?;
        Ok(self.peek(offset))
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        check_access(offset, self.size)?;
        let mut file = self.file.lock();
        file.values.insert(offset, value);
        file.writes.push((offset, value));
        Ok(())
    }
}

/// Mapper handing out fake windows
#[derive(Debug, Default)]
pub struct FakeMapper {
    windows: Mutex<BTreeMap<usize, FakeRegisters>>,
    mappings: Mutex<Vec<(usize, usize)>>,
    failing: Mutex<BTreeSet<usize>>,
}

impl FakeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `regs` when `phys` is mapped
    pub fn with_window(self, phys: usize, regs: FakeRegisters) -> Self {
        self.windows.lock().insert(phys, regs);
        self
    }

    /// Fail every mapping of `phys`
    pub fn failing_at(self, phys: usize) -> Self {
        self.failing.lock().insert(phys);
        self
    }

    /// `(phys, size)` of every successful mapping, in order
    pub fn mappings(&self) -> Vec<(usize, usize)> {
        self.mappings.lock().clone()
    }
}

impl DeviceMapper for FakeMapper {
    type Io = FakeRegisters;

    fn map_device(&self, phys: usize, size: usize) -> Result<FakeRegisters> {
        if self.failing.lock().contains(&phys) {
            return Err(Error::ResourceUnavailable);
        }
        self.mappings.lock().push((phys, size));
        let regs = self
            .windows
            .lock()
            .get(&phys)
            .map(|regs| FakeRegisters { size, file: regs.file.clone() })
            .unwrap_or_else(|| FakeRegisters::new(size));
        Ok(regs)
    }
}

/// Scriptable firmware
#[derive(Debug)]
pub struct FakeFirmware {
    num_sources: core::result::Result<usize, SbiError>,
    failing: BTreeSet<usize>,
    enable_result: core::result::Result<(), SbiError>,
    delegated: Mutex<Vec<usize>>,
    enable_calls: AtomicUsize,
    ipis: Mutex<Vec<(usize, usize)>>,
}

impl FakeFirmware {
    pub fn new(num_sources: core::result::Result<usize, SbiError>) -> Self {
        Self {
            num_sources,
            failing: BTreeSet::new(),
            enable_result: Ok(()),
            delegated: Mutex::new(Vec::new()),
            enable_calls: AtomicUsize::new(0),
            ipis: Mutex::new(Vec::new()),
        }
    }

    /// Refuse delegation of `ids`
    pub fn failing(mut self, ids: &[usize]) -> Self {
        self.failing.extend(ids.iter().copied());
        self
    }

    /// Make the CLIC mode switch fail
    pub fn enable_fails(mut self, error: SbiError) -> Self {
        self.enable_result = Err(error);
        self
    }

    /// Every delegation request, in order
    pub fn delegated(&self) -> Vec<usize> {
        self.delegated.lock().clone()
    }

    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    pub fn ipis(&self) -> Vec<(usize, usize)> {
        self.ipis.lock().clone()
    }
}

impl Firmware for FakeFirmware {
    fn clic_num_sources(&self) -> core::result::Result<usize, SbiError> {
        self.num_sources
    }

    fn clic_delegate(&self, irq: usize) -> core::result::Result<(), SbiError> {
        self.delegated.lock().push(irq);
        if self.failing.contains(&irq) {
            Err(SbiError::Denied)
        } else {
            Ok(())
        }
    }

    fn clic_enable(&self) -> core::result::Result<(), SbiError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.enable_result
    }

    fn send_ipi(&self, hart_mask: usize, hart_mask_base: HartId) -> core::result::Result<(), SbiError> {
        self.ipis.lock().push((hart_mask, hart_mask_base));
        Ok(())
    }
}

/// Supervisor CSRs backed by atomics
#[derive(Debug, Default)]
pub struct FakeCsrs {
    scause: AtomicUsize,
    sie: AtomicUsize,
    sip: AtomicUsize,
    interrupts_enabled: AtomicBool,
}

impl FakeCsrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scause(&self, cause: usize) {
        self.scause.store(cause, Ordering::SeqCst);
    }

    /// Raise pending bits as hardware would
    pub fn raise(&self, bits: Sip) {
        self.sip.fetch_or(bits.bits(), Ordering::SeqCst);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::SeqCst)
    }
}

impl Csrs for FakeCsrs {
    fn scause(&self) -> usize {
        self.scause.load(Ordering::SeqCst)
    }

    fn sie(&self) -> Sie {
        Sie::from_bits_truncate(self.sie.load(Ordering::SeqCst))
    }

    fn sie_set(&self, bits: Sie) {
        self.sie.fetch_or(bits.bits(), Ordering::SeqCst);
    }

    fn sie_clear(&self, bits: Sie) {
        self.sie.fetch_and(!bits.bits(), Ordering::SeqCst);
    }

    fn sip(&self) -> Sip {
        Sip::from_bits_truncate(self.sip.load(Ordering::SeqCst))
    }

    fn sip_clear(&self, bits: Sip) {
        // Only SSIP is writable from S-mode
        let writable = bits & Sip::SSIP;
        self.sip.fetch_and(!writable.bits(), Ordering::SeqCst);
    }

    fn set_interrupts_enabled(&self, enabled: bool) {
        self.interrupts_enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Call made on a [`RecordingPlic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlicCall {
    Init,
    CpuInit(HartId),
    SetEnable(HartId, u32, bool),
    SetPriority(u32, u32),
    Pending(u32),
    Claim(HartId),
    Complete(HartId, u32),
    AssignToVm(VmId, u32),
}

/// Legacy controller that records every call
#[derive(Debug, Default)]
pub struct RecordingPlic {
    calls: Mutex<Vec<PlicCall>>,
    claims: Mutex<VecDeque<u32>>,
    pending: Mutex<BTreeSet<u32>>,
}

impl RecordingPlic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a source for the next claim
    pub fn queue_claim(&self, id: u32) {
        self.claims.lock().push_back(id);
    }

    pub fn set_pending(&self, id: u32) {
        self.pending.lock().insert(id);
    }

    pub fn calls(&self) -> Vec<PlicCall> {
        self.calls.lock().clone()
    }
}

impl LegacyController for RecordingPlic {
    fn init(&self) {
        self.calls.lock().push(PlicCall::Init);
    }

    fn cpu_init(&self, hart: HartId) {
        self.calls.lock().push(PlicCall::CpuInit(hart));
    }

    fn set_enable(&self, hart: HartId, id: u32, enabled: bool) {
        self.calls.lock().push(PlicCall::SetEnable(hart, id, enabled));
    }

    fn set_priority(&self, id: u32, priority: u32) {
        self.calls.lock().push(PlicCall::SetPriority(id, priority));
    }

    fn pending(&self, id: u32) -> bool {
        self.calls.lock().push(PlicCall::Pending(id));
        self.pending.lock().contains(&id)
    }

    fn claim(&self, hart: HartId) -> u32 {
        self.calls.lock().push(PlicCall::Claim(hart));
        self.claims.lock().pop_front().unwrap_or(0)
    }

    fn complete(&self, hart: HartId, id: u32) {
        self.calls.lock().push(PlicCall::Complete(hart, id));
    }

    fn assign_to_vm(&self, vm: VmId, id: u32) {
        self.calls.lock().push(PlicCall::AssignToVm(vm, id));
    }
}

/// Generic handler that records the IDs it sees
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub handled: Vec<IrqId>,
    forwarded: BTreeSet<IrqId>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `id` as belonging to a guest
    pub fn forwarding(mut self, id: IrqId) -> Self {
        self.forwarded.insert(id);
        self
    }
}

impl IrqHandler for RecordingHandler {
    fn handle(&mut self, id: IrqId) -> IrqResult {
        self.handled.push(id);
        if self.forwarded.contains(&id) {
            IrqResult::ForwardToVm
        } else {
            IrqResult::HandledByHyp
        }
    }
}

std::thread_local! {
    static CAPTURED: RefCell<Vec<(log::Level, String)>> = RefCell::new(Vec::new());
}

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let message = record.args().to_string();
        CAPTURED.with(|logs| logs.borrow_mut().push((record.level(), message)));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static LOGGER_INIT: std::sync::Once = std::sync::Once::new();

/// Log records emitted on the current thread since [`LogCapture::start`]
pub struct LogCapture;

impl LogCapture {
    pub fn start() -> Self {
        LOGGER_INIT.call_once(|| {
            // Another logger may only be installed by a test binary wrapper
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(log::LevelFilter::Trace);
        });
        CAPTURED.with(|logs| logs.borrow_mut().clear());
        LogCapture
    }

    /// Messages logged at `level`
    pub fn at(&self, level: log::Level) -> Vec<String> {
        CAPTURED.with(|logs| {
            logs.borrow()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, m)| m.clone())
                .collect()
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(log::Level::Warn)
    }

    pub fn errors(&self) -> Vec<String> {
        self.at(log::Level::Error)
    }

    /// Check a warning containing `needle` was logged
    pub fn warned(&self, needle: &str) -> bool {
        self.warnings().iter().any(|m| m.contains(needle))
    }
}
