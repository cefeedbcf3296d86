//! CLIC register layout
//!
//! Bit-exact pack/unpack of the three CLIC register kinds the hypervisor
//! touches: CLICCFG (global configuration), CLICINT (per-source control)
//! and CLICINTV (per-source virtualization control).
//!
//! Every field is masked to its reserved width on encode, matching the
//! truncating behaviour of the hardware registers. Nothing here fails.

/// CLIC register offsets relative to the CLIC base (S-mode view)
pub mod clic_regs {
    /// CLICCFG global configuration register
    pub const CLICCFG: usize = 0x0000_8000;
    /// First CLICINT register, one 32-bit register per source
    pub const CLICINT_BASE: usize = 0x0000_9000;
    /// First CLICINTV register, one 32-bit register per source
    pub const CLICINTV_BASE: usize = 0x0000_d000;

    /// Offset of CLICINT for `irq`
    pub const fn clicint(irq: usize) -> usize {
        CLICINT_BASE + 4 * irq
    }

    /// Offset of CLICINTV for `irq`
    pub const fn clicintv(irq: usize) -> usize {
        CLICINTV_BASE + 4 * irq
    }
}

/* CLICCFG fields */
pub const CLICCFG_MNLBITS_OFFSET: u32 = 0;
pub const CLICCFG_NMBITS_OFFSET: u32 = 4;
pub const CLICCFG_SNLBITS_OFFSET: u32 = 16;
pub const CLICCFG_UNLBITS_OFFSET: u32 = 24;

pub const CLICCFG_MNLBITS_MASK: u32 = 0x0000_000F;
pub const CLICCFG_NMBITS_MASK: u32 = 0x0000_0030;
pub const CLICCFG_SNLBITS_MASK: u32 = 0x000F_0000;
pub const CLICCFG_UNLBITS_MASK: u32 = 0x0F00_0000;

/* CLICINT fields */
pub const CLICINT_IP_OFFSET: u32 = 0;
pub const CLICINT_IE_OFFSET: u32 = 7;
pub const CLICINT_ATTR_SHV_OFFSET: u32 = 16;
pub const CLICINT_ATTR_TRIG_OFFSET: u32 = 17;
pub const CLICINT_ATTR_MODE_OFFSET: u32 = 22;
pub const CLICINT_CTL_OFFSET: u32 = 24;

pub const CLICINT_IP_MASK: u32 = 0x0000_0001;
pub const CLICINT_IE_MASK: u32 = 0x0000_0080;
pub const CLICINT_ATTR_SHV_MASK: u32 = 0x0001_0000;
pub const CLICINT_ATTR_TRIG_MASK: u32 = 0x0006_0000;
pub const CLICINT_ATTR_MODE_MASK: u32 = 0x00C0_0000;
pub const CLICINT_CTL_MASK: u32 = 0xFF00_0000;

/* CLICINTV fields */
pub const CLICINTV_V_OFFSET: u32 = 0;
pub const CLICINTV_VSID_OFFSET: u32 = 2;

pub const CLICINTV_V_MASK: u32 = 0x0000_0001;
pub const CLICINTV_VSID_MASK: u32 = 0x0000_00FC;

#[inline]
const fn pack(value: u32, offset: u32, mask: u32) -> u32 {
    (value << offset) & mask
}

#[inline]
const fn unpack(reg: u32, offset: u32, mask: u32) -> u32 {
    (reg & mask) >> offset
}

/// Interrupt pending bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PendingState {
    Clear = 0,
    Set = 1,
}

/// Interrupt enable bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnableState {
    Masked = 0,
    Enabled = 1,
}

/// Selective hardware vectoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VectorMode {
    Off = 0,
    On = 1,
}

/// Trigger type; bit 0 selects edge, bit 1 selects negative polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerType {
    PositiveLevel = 0,
    PositiveEdge = 1,
    NegativeLevel = 2,
    NegativeEdge = 3,
}

impl TriggerType {
    /// Check if the source is edge-triggered
    pub fn is_edge(self) -> bool {
        (self as u8) & 1 != 0
    }
}

/// Privilege mode an interrupt is taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrivilegeMode {
    User = 0,
    Supervisor = 1,
    /// Encoding 0b10 is reserved by the CLIC
    Reserved = 2,
    Machine = 3,
}

/// Virtualization enable bit of CLICINTV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VirtState {
    Disabled = 0,
    Enabled = 1,
}

impl PendingState {
    fn from_bits(bits: u32) -> Self {
        if bits & 1 != 0 { Self::Set } else { Self::Clear }
    }
}

impl EnableState {
    fn from_bits(bits: u32) -> Self {
        if bits & 1 != 0 { Self::Enabled } else { Self::Masked }
    }
}

impl VectorMode {
    fn from_bits(bits: u32) -> Self {
        if bits & 1 != 0 { Self::On } else { Self::Off }
    }
}

impl TriggerType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::PositiveLevel,
            1 => Self::PositiveEdge,
            2 => Self::NegativeLevel,
            _ => Self::NegativeEdge,
        }
    }
}

impl PrivilegeMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            _ => Self::Machine,
        }
    }
}

impl VirtState {
    fn from_bits(bits: u32) -> Self {
        if bits & 1 != 0 { Self::Enabled } else { Self::Disabled }
    }
}

/// Interrupt attributes (CLICINT.attr)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntAttr {
    pub shv: VectorMode,
    pub trig: TriggerType,
    pub mode: PrivilegeMode,
}

/// Per-source interrupt control descriptor (CLICINT)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptControl {
    pub pending: PendingState,
    pub enable: EnableState,
    pub attr: IntAttr,
    /// Level/priority byte
    pub ctl: u8,
}

impl InterruptControl {
    /// Check if the pending bit is set
    pub fn is_pending(&self) -> bool {
        self.pending == PendingState::Set
    }

    /// Check if the source is enabled
    pub fn is_enabled(&self) -> bool {
        self.enable == EnableState::Enabled
    }
}

/// Per-source virtualization control descriptor (CLICINTV)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtControl {
    pub v: VirtState,
    /// Virtual supervisor identifier, 6 bits wide in hardware
    pub vsid: u8,
}

/// Decoded CLICCFG register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Number of privilege mode bits
    pub nmbits: u8,
    /// Interrupt level bits for M-mode
    pub mnlbits: u8,
    /// Interrupt level bits for S-mode
    pub snlbits: u8,
    /// Interrupt level bits for U-mode
    pub unlbits: u8,
}

/// Build a CLICCFG register value from its fields
pub fn encode_global_config(nmbits: u8, mnlbits: u8, snlbits: u8, unlbits: u8) -> u32 {
    pack(nmbits as u32, CLICCFG_NMBITS_OFFSET, CLICCFG_NMBITS_MASK)
        | pack(mnlbits as u32, CLICCFG_MNLBITS_OFFSET, CLICCFG_MNLBITS_MASK)
        | pack(snlbits as u32, CLICCFG_SNLBITS_OFFSET, CLICCFG_SNLBITS_MASK)
        | pack(unlbits as u32, CLICCFG_UNLBITS_OFFSET, CLICCFG_UNLBITS_MASK)
}

/// Split a CLICCFG register value into its fields
pub fn decode_global_config(reg: u32) -> GlobalConfig {
    GlobalConfig {
        nmbits: unpack(reg, CLICCFG_NMBITS_OFFSET, CLICCFG_NMBITS_MASK) as u8,
        mnlbits: unpack(reg, CLICCFG_MNLBITS_OFFSET, CLICCFG_MNLBITS_MASK) as u8,
        snlbits: unpack(reg, CLICCFG_SNLBITS_OFFSET, CLICCFG_SNLBITS_MASK) as u8,
        unlbits: unpack(reg, CLICCFG_UNLBITS_OFFSET, CLICCFG_UNLBITS_MASK) as u8,
    }
}

/// Build a CLICINT register value from a descriptor
pub fn encode_interrupt_control(cfg: &InterruptControl) -> u32 {
    pack(cfg.pending as u32, CLICINT_IP_OFFSET, CLICINT_IP_MASK)
        | pack(cfg.enable as u32, CLICINT_IE_OFFSET, CLICINT_IE_MASK)
        | pack(cfg.attr.shv as u32, CLICINT_ATTR_SHV_OFFSET, CLICINT_ATTR_SHV_MASK)
        | pack(cfg.attr.trig as u32, CLICINT_ATTR_TRIG_OFFSET, CLICINT_ATTR_TRIG_MASK)
        | pack(cfg.attr.mode as u32, CLICINT_ATTR_MODE_OFFSET, CLICINT_ATTR_MODE_MASK)
        | pack(cfg.ctl as u32, CLICINT_CTL_OFFSET, CLICINT_CTL_MASK)
}

/// Parse a CLICINT register value
pub fn decode_interrupt_control(reg: u32) -> InterruptControl {
    InterruptControl {
        pending: PendingState::from_bits(unpack(reg, CLICINT_IP_OFFSET, CLICINT_IP_MASK)),
        enable: EnableState::from_bits(unpack(reg, CLICINT_IE_OFFSET, CLICINT_IE_MASK)),
        attr: IntAttr {
            shv: VectorMode::from_bits(unpack(reg, CLICINT_ATTR_SHV_OFFSET, CLICINT_ATTR_SHV_MASK)),
            trig: TriggerType::from_bits(unpack(
                reg,
                CLICINT_ATTR_TRIG_OFFSET,
                CLICINT_ATTR_TRIG_MASK,
            )),
            mode: PrivilegeMode::from_bits(unpack(
                reg,
                CLICINT_ATTR_MODE_OFFSET,
                CLICINT_ATTR_MODE_MASK,
            )),
        },
        ctl: unpack(reg, CLICINT_CTL_OFFSET, CLICINT_CTL_MASK) as u8,
    }
}

/// Build a CLICINTV register value from a descriptor
pub fn encode_virt_control(cfg: &VirtControl) -> u32 {
    pack(cfg.v as u32, CLICINTV_V_OFFSET, CLICINTV_V_MASK)
        | pack(cfg.vsid as u32, CLICINTV_VSID_OFFSET, CLICINTV_VSID_MASK)
}

/// Parse a CLICINTV register value
pub fn decode_virt_control(reg: u32) -> VirtControl {
    VirtControl {
        v: VirtState::from_bits(unpack(reg, CLICINTV_V_OFFSET, CLICINTV_V_MASK)),
        vsid: unpack(reg, CLICINTV_VSID_OFFSET, CLICINTV_VSID_MASK) as u8,
    }
}
