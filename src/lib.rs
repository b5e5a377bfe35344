//! Rust host binding for the Capstone disassembly engine compiled to
//! WebAssembly.
//!
//! The engine itself is an opaque wasm module with a C-style ABI over one
//! linear memory. This crate is the marshaling and lifecycle layer on top of
//! it: it instantiates the module, reproduces the engine's fixed-layout
//! instruction record by hand, manages the foreign-heap scratch buffers each
//! decoder instance needs, and drives the streaming disassembly loop.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use wasmstone::{initialize, loader, Architecture, Mode};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! // Load and instantiate the engine module once per process. Subsequent
//! // calls resolve immediately with the same engine.
//! let engine = initialize(|| loader::from_path("capstone.wasm")).await?;
//!
//! // Create an instance that disassembles Arm Thumb code.
//! let mut instance = engine.create_instance(Architecture::Arm, Mode::THUMB)?;
//!
//! let code = [0x4f, 0xf0, 0x00, 0x01, 0xbd, 0xe8, 0x00, 0x88];
//! for insn in instance.disassemble(&code, 0)? {
//!     println!("{:#x}: {} {}", insn.address, insn.mnemonic, insn.operands);
//! }
//!
//! // Frees the engine-side handle and scratch buffers. Dropping the
//! // instance does the same thing.
//! engine.free_instance(&mut instance);
//! # Ok(())
//! # }
//! ```

pub mod loader;

mod engine;
mod instance;
mod memory;
mod module;
mod record;

pub use engine::{initialize, try_get, Engine};
pub use instance::Instance;

use std::fmt;

use bitflags::bitflags;

/// Represents an address in memory
pub type Address = u64;

/// Errors surfaced by the binding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine module bytes could not be obtained or instantiated.
    #[error("failed to load engine module: {0}")]
    Load(anyhow::Error),

    /// The engine rejected the architecture/mode pair; carries the engine
    /// status code.
    #[error("engine open failed with status {0}")]
    Open(i32),

    /// The engine rejected an option setting; carries the engine status code.
    #[error("engine option failed with status {0}")]
    Option(i32),

    /// A foreign heap allocation returned the null offset.
    #[error("engine allocation failed for {0}")]
    Allocation(&'static str),

    /// An operation was issued on an instance after `free()`.
    #[error("instance used after free")]
    UseAfterFree,

    /// A typed access fell outside the current linear memory bounds.
    #[error("linear memory access out of bounds: {len} bytes at offset {offset:#x}")]
    OutOfBounds { offset: u32, len: u32 },

    /// A call into the engine module trapped.
    #[error("engine call failed: {0}")]
    Call(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Call(err)
    }
}

/// An instruction set architecture. Discriminants match the engine ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum Architecture {
    /// 32 bit Arm architectures (e.g. Armv6 and Armv7)
    Arm = 0,
    /// 64 bit Arm (e.g. Armv8-A)
    Arm64 = 1,
    /// Mips
    Mips = 2,
    /// x86 related architectures (including x64)
    X86 = 3,
    /// PowerPC
    Ppc = 4,
    /// Sparc
    Sparc = 5,
    /// System-Z
    SysZ = 6,
    /// XCore
    XCore = 7,
    M68k = 8,
    Tms320C64x = 9,
    M680x = 10,
    /// Ethereum virtual machine
    Evm = 11,
    Mos65xx = 12,
    /// WebAssembly
    Wasm = 13,
    /// Berkeley Packet Filter
    Bpf = 14,
    /// RISC-V
    RiscV = 15,
    /// Tensilica Xtensa
    Xtensa = 16,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Arm => write!(f, "ARM"),
            Architecture::Arm64 => write!(f, "ARM64"),
            Architecture::Mips => write!(f, "MIPS"),
            Architecture::X86 => write!(f, "x86"),
            Architecture::Ppc => write!(f, "PPC"),
            Architecture::Sparc => write!(f, "SPARC"),
            Architecture::SysZ => write!(f, "SystemZ"),
            Architecture::XCore => write!(f, "XCore"),
            Architecture::M68k => write!(f, "M68K"),
            Architecture::Tms320C64x => write!(f, "TMS320C64x"),
            Architecture::M680x => write!(f, "M680X"),
            Architecture::Evm => write!(f, "EVM"),
            Architecture::Mos65xx => write!(f, "MOS65XX"),
            Architecture::Wasm => write!(f, "WASM"),
            Architecture::Bpf => write!(f, "BPF"),
            Architecture::RiscV => write!(f, "RISC-V"),
            Architecture::Xtensa => write!(f, "Xtensa"),
        }
    }
}

bitflags! {
    /// Architecture-specific sub-mode flags (e.g. Thumb for Arm or
    /// `BITS_64` for x86).
    ///
    /// The flag semantics depend entirely on which [`Architecture`] the mode
    /// is paired with, so several names intentionally alias the same bit.
    /// The pairing is validated by the engine at `cs_open` time, not here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        /// little-endian mode (default mode)
        const LITTLE_ENDIAN = 0;
        /// 32-bit ARM
        const ARM = 0;
        /// 16-bit mode (x86)
        const BITS_16 = 1 << 1;
        /// 32-bit mode (x86)
        const BITS_32 = 1 << 2;
        /// 64-bit mode (x86, PPC)
        const BITS_64 = 1 << 3;
        /// ARM's Thumb mode, including Thumb-2
        const THUMB = 1 << 4;
        /// ARM's Cortex-M series
        const MCLASS = 1 << 5;
        /// ARMv8 A32 encodings for ARM
        const V8 = 1 << 6;
        /// MicroMips mode (MIPS)
        const MICRO = 1 << 4;
        /// Mips III ISA
        const MIPS3 = 1 << 5;
        /// Mips32r6 ISA
        const MIPS32R6 = 1 << 6;
        /// Mips II ISA
        const MIPS2 = 1 << 7;
        /// SparcV9 mode (Sparc)
        const V9 = 1 << 4;
        /// Quad Processing eXtensions mode (PPC)
        const QPX = 1 << 4;
        /// Signal Processing Engine mode (PPC)
        const SPE = 1 << 5;
        /// Book-E mode (PPC)
        const BOOKE = 1 << 6;
        /// M68K 68000 mode
        const M68K_000 = 1 << 1;
        /// M68K 68010 mode
        const M68K_010 = 1 << 2;
        /// M68K 68020 mode
        const M68K_020 = 1 << 3;
        /// M68K 68030 mode
        const M68K_030 = 1 << 4;
        /// M68K 68040 mode
        const M68K_040 = 1 << 5;
        /// M68K 68060 mode
        const M68K_060 = 1 << 6;
        /// Mips32 ISA (Mips)
        const MIPS32 = 1 << 2;
        /// Mips64 ISA (Mips)
        const MIPS64 = 1 << 3;
        /// M680X Hitachi 6301,6303 mode
        const M680X_6301 = 1 << 1;
        /// M680X Hitachi 6309 mode
        const M680X_6309 = 1 << 2;
        /// M680X Motorola 6800,6802 mode
        const M680X_6800 = 1 << 3;
        /// M680X Motorola 6801,6803 mode
        const M680X_6801 = 1 << 4;
        /// M680X Motorola/Freescale 6805 mode
        const M680X_6805 = 1 << 5;
        /// M680X Motorola/Freescale/NXP 68HC08 mode
        const M680X_6808 = 1 << 6;
        /// M680X Motorola 6809 mode
        const M680X_6809 = 1 << 7;
        /// M680X Motorola/Freescale/NXP 68HC11 mode
        const M680X_6811 = 1 << 8;
        /// M680X Motorola/Freescale/NXP CPU12
        const M680X_CPU12 = 1 << 9;
        /// M680X Freescale/NXP HCS08 mode
        const M680X_HCS08 = 1 << 10;
        /// Classic BPF mode (default)
        const BPF_CLASSIC = 0;
        /// Extended BPF mode
        const BPF_EXTENDED = 1 << 0;
        /// RISC-V RV32G
        const RISCV32 = 1 << 0;
        /// RISC-V RV64G
        const RISCV64 = 1 << 1;
        /// RISC-V compressed instruction mode
        const RISCVC = 1 << 2;
        /// MOS65XX MOS 6502
        const MOS65XX_6502 = 1 << 1;
        /// MOS65XX WDC 65c02
        const MOS65XX_65C02 = 1 << 2;
        /// MOS65XX WDC W65c02
        const MOS65XX_W65C02 = 1 << 3;
        /// MOS65XX WDC 65816, 8-bit m/x
        const MOS65XX_65816 = 1 << 4;
        /// MOS65XX WDC 65816, 16-bit m, 8-bit x
        const MOS65XX_65816_LONG_M = 1 << 5;
        /// MOS65XX WDC 65816, 8-bit m, 16-bit x
        const MOS65XX_65816_LONG_X = 1 << 6;
        const MOS65XX_65816_LONG_MX =
            Self::MOS65XX_65816_LONG_M.bits() | Self::MOS65XX_65816_LONG_X.bits();
        /// big-endian mode
        const BIG_ENDIAN = 1 << 31;
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::LITTLE_ENDIAN
    }
}

/// `cs_option` option types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OptionKind {
    /// No option specified
    Invalid = 0,
    /// Assembly output syntax
    Syntax = 1,
    /// Break down instruction structure into details
    Detail = 2,
    /// Change engine's mode at run-time
    Mode = 3,
    /// User-defined dynamic memory related functions
    Mem = 4,
    /// Skip data when disassembling
    SkipData = 5,
    /// Setup user-defined function for SKIPDATA option
    SkipDataSetup = 6,
    /// Customize instruction mnemonic
    Mnemonic = 7,
    /// Print immediate operands in unsigned form
    Unsigned = 8,
}

/// A `cs_option` value.
///
/// The engine overloads the value space per option kind (e.g. `ON` and
/// `SYNTAX_NOREGNAME` share the numeric value 3), so this is a plain
/// newtype with named constants rather than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionValue(pub u32);

impl OptionValue {
    /// Turn OFF an option - default for DETAIL, SKIPDATA, UNSIGNED.
    pub const OFF: OptionValue = OptionValue(0);
    /// Turn ON an option (DETAIL, SKIPDATA).
    pub const ON: OptionValue = OptionValue(3);
    /// Default asm syntax (SYNTAX).
    pub const SYNTAX_DEFAULT: OptionValue = OptionValue(0);
    /// X86 Intel asm syntax - default on x86 (SYNTAX).
    pub const SYNTAX_INTEL: OptionValue = OptionValue(1);
    /// X86 ATT asm syntax (SYNTAX).
    pub const SYNTAX_ATT: OptionValue = OptionValue(2);
    /// Prints register name with only number (SYNTAX).
    pub const SYNTAX_NOREGNAME: OptionValue = OptionValue(3);
    /// X86 Intel Masm syntax (SYNTAX).
    pub const SYNTAX_MASM: OptionValue = OptionValue(4);
    /// MOS65XX use $ as hex prefix (SYNTAX).
    pub const SYNTAX_MOTOROLA: OptionValue = OptionValue(5);
}

/// One decoded instruction.
///
/// Owned value; carries no reference back into the engine's linear memory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Instruction ID (a numeric ID for the instruction mnemonic). The IDs
    /// live in the `[ARCH]_insn` enums of the engine's C headers, e.g.
    /// `arm_insn` for ARM or `x86_insn` for x86.
    pub id: u32,
    /// Address of this instruction
    pub address: Address,
    /// Size of this instruction in bytes
    pub size: u16,
    /// Machine bytes of this instruction (length = `size`, clamped to the
    /// record's fixed byte field)
    pub bytes: Vec<u8>,
    /// Instruction mnemonic (e.g. "mov", "add")
    pub mnemonic: String,
    /// Instruction operands as string representation
    pub operands: String,
    /// Instruction details. Present only when the engine's DETAIL option is
    /// enabled, which this binding does not do by default.
    pub detail: Option<InstructionDetail>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mnemonic, self.operands)
    }
}

/// Per-instruction detail block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstructionDetail {
    /// Implicit registers read by this instruction
    pub regs_read: Vec<u16>,
    /// Implicit registers modified by this instruction
    pub regs_write: Vec<u16>,
    /// Groups this instruction belongs to
    pub groups: Vec<u8>,
}
