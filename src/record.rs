//! Decoding of the engine's fixed-layout instruction record.
//!
//! The engine writes every decoded instruction into one reusable record
//! buffer in linear memory, so decoding is eager: all fields are copied out
//! before the next streaming step overwrites the buffer.

use wasmtime::Store;

use crate::memory::MemView;
use crate::{Architecture, Error, Instruction, InstructionDetail};

/// Byte offsets of the record fields, measured from the record start.
///
/// This is the binding's only knowledge of the engine's internal struct
/// layout. The header is architecture-independent; the detail block at
/// [`layout::DETAIL`] is architecture-specific and left undecoded.
pub(crate) mod layout {
    /// Instruction id, 4-byte unsigned.
    pub const ID: u32 = 0;
    /// Instruction address, 8-byte unsigned.
    pub const ADDRESS: u32 = 8;
    /// Instruction size in bytes, 2-byte unsigned.
    pub const SIZE: u32 = 16;
    /// Raw instruction bytes, `SIZE` of them up to `BYTES_MAX`.
    pub const BYTES: u32 = 18;
    pub const BYTES_MAX: u32 = 24;
    /// Mnemonic text, NUL-terminated.
    pub const MNEMONIC: u32 = 42;
    pub const MNEMONIC_MAX: u32 = 32;
    /// Operand text, NUL-terminated.
    pub const OP_STR: u32 = 74;
    pub const OP_STR_MAX: u32 = 160;
    /// Start of the architecture-specific detail block.
    pub const DETAIL: u32 = 240;
}

/// Decode the instruction record at offset `at` into an owned value.
pub(crate) fn read_instruction(
    view: &MemView,
    store: &Store<()>,
    at: u32,
    arch: Architecture,
) -> Result<Instruction, Error> {
    let id = view.read_u32(store, at + layout::ID)?;
    let address = view.read_u64(store, at + layout::ADDRESS)?;
    let size = view.read_u16(store, at + layout::SIZE)?;
    let take = u32::from(size).min(layout::BYTES_MAX);
    // Copy, not alias: the record buffer is overwritten by the next step.
    let bytes = view.read_bytes_copy(store, at + layout::BYTES, take)?;
    let mnemonic = view.read_str(store, at + layout::MNEMONIC, layout::MNEMONIC_MAX)?;
    let operands = view.read_str(store, at + layout::OP_STR, layout::OP_STR_MAX)?;
    let detail = read_detail(view, store, at + layout::DETAIL, arch);

    Ok(Instruction {
        id,
        address,
        size,
        bytes,
        mnemonic,
        operands,
        detail,
    })
}

/// The detail block is only populated when the DETAIL option is enabled,
/// which the default path never does, so nothing is decoded here. The
/// per-architecture layout would have to be keyed by `arch` if this ever
/// grows a real implementation.
fn read_detail(
    _view: &MemView,
    _store: &Store<()>,
    _at: u32,
    _arch: Architecture,
) -> Option<InstructionDetail> {
    None
}
