//! A configured decoder instance and its streaming disassembly loop.

use std::fmt;

use log::{debug, trace, warn};

use crate::engine::Engine;
use crate::module::EngineModule;
use crate::record;
use crate::{Architecture, Error, Instruction, Mode, OptionKind, OptionValue};

/// Size in bytes of the streaming cursor block: a `u32` code pointer, a
/// `u32` remaining-size counter, and a `u64` current address.
pub(crate) const STATE_BLOCK_SIZE: u32 = 16;

/// One configured decoder: an engine-side handle bound to an
/// [`Architecture`] and [`Mode`] at creation, plus the two foreign-heap
/// scratch allocations it reuses across calls.
///
/// Create via [`Engine::create_instance`]; release via [`Instance::free`] or
/// [`Engine::free_instance`] (dropping the instance does the same). Any
/// operation after `free` fails with [`Error::UseAfterFree`].
pub struct Instance<'e> {
    engine: &'e Engine,
    architecture: Architecture,
    mode: Mode,
    handle: u32,
    record_ptr: u32,
    state_ptr: u32,
    valid: bool,
}

impl<'e> Instance<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        architecture: Architecture,
        mode: Mode,
        handle: u32,
        record_ptr: u32,
        state_ptr: u32,
    ) -> Self {
        Self {
            engine,
            architecture,
            mode,
            handle,
            record_ptr,
            state_ptr,
            valid: true,
        }
    }

    /// Whether the engine-side resources are still alive.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The architecture this instance disassembles for.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// The mode flags this instance was configured with.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Configure an engine option on this instance (e.g. output syntax).
    ///
    /// Not needed on the default path; exposed for callers that want to
    /// adjust the engine's behavior per handle.
    pub fn set_option(&mut self, kind: OptionKind, value: OptionValue) -> Result<(), Error> {
        if !self.valid {
            return Err(Error::UseAfterFree);
        }
        let mut module = self.engine.lock();
        let status = module.set_option(self.handle, kind as u32, value.0)?;
        if status != 0 {
            return Err(Error::Option(status));
        }
        Ok(())
    }

    /// Disassemble `code`, treating its first byte as residing at `address`.
    ///
    /// Returns the decoded instructions in order. The sequence is empty if
    /// nothing decoded; decoding stops without error at end-of-input or at
    /// the first byte sequence the engine cannot decode, so the concatenated
    /// `bytes` of the results always reconstruct a prefix of `code`.
    ///
    /// Calls on one instance must not interleave; `&mut self` enforces that.
    pub fn disassemble(&mut self, code: &[u8], address: u64) -> Result<Vec<Instruction>, Error> {
        if !self.valid {
            return Err(Error::UseAfterFree);
        }
        if code.is_empty() {
            // Nothing to copy into foreign memory, and `malloc(0)` is not
            // guaranteed to return a usable offset.
            return Ok(Vec::new());
        }
        // The engine addresses its heap with 32-bit offsets; a buffer the
        // length cannot represent can never be allocated, and a blind cast
        // would silently truncate the requested size.
        let code_len = match u32::try_from(code.len()) {
            Ok(len) => len,
            Err(_) => return Err(Error::Allocation("code buffer")),
        };

        let mut module = self.engine.lock();

        // Temporary foreign-heap copy of the caller's code bytes.
        let code_ptr = module.heap_alloc(code_len)?;
        if code_ptr == 0 {
            return Err(Error::Allocation("code buffer"));
        }

        let result = self.run(&mut module, code_ptr, code_len, code, address);
        // Released on every exit path of the loop, success or failure.
        module.heap_free(code_ptr)?;

        if let Ok(insns) = &result {
            trace!(
                "decoded {} instructions from {} byte buffer at {address:#x}",
                insns.len(),
                code.len()
            );
        }
        result
    }

    fn run(
        &self,
        module: &mut EngineModule,
        code_ptr: u32,
        code_len: u32,
        code: &[u8],
        address: u64,
    ) -> Result<Vec<Instruction>, Error> {
        module.write_bytes(code_ptr, code)?;

        // The three cursor fields the engine advances in place.
        let code_ptr_ptr = self.state_ptr;
        let size_ptr = self.state_ptr + 4;
        let address_ptr = self.state_ptr + 8;
        module.write_u32(code_ptr_ptr, code_ptr)?;
        module.write_u32(size_ptr, code_len)?;
        module.write_u64(address_ptr, address)?;

        let mut result = Vec::new();
        loop {
            let decoded =
                module.disasm_iter(self.handle, code_ptr_ptr, size_ptr, address_ptr, self.record_ptr)?;
            if !decoded {
                // End of input or undecodable bytes; either way, done.
                break;
            }
            result.push(record::read_instruction(
                module.view(),
                module.store(),
                self.record_ptr,
                self.architecture,
            )?);
        }
        Ok(result)
    }

    /// Release the engine-side handle and both scratch allocations.
    ///
    /// Idempotent: calling `free` on an already-freed instance is a no-op,
    /// so unconditional cleanup code stays simple.
    pub fn free(&mut self) {
        if !self.valid {
            return;
        }
        self.valid = false;

        let mut module = self.engine.lock();
        if let Err(e) = module.record_free(self.record_ptr, 1) {
            warn!("failed to release instruction record buffer: {e}");
        }
        if let Err(e) = module.heap_free(self.state_ptr) {
            warn!("failed to release cursor state block: {e}");
        }
        if self.handle != 0 {
            match module.close(self.handle) {
                Ok(0) => {}
                Ok(status) => warn!("engine close returned status {status}"),
                Err(e) => warn!("engine close trapped: {e}"),
            }
        }
        drop(module);

        debug!("freed {} instance (handle {})", self.architecture, self.handle);
        self.record_ptr = 0;
        self.state_ptr = 0;
        self.handle = 0;
    }
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("architecture", &self.architecture)
            .field("mode", &self.mode)
            .field("handle", &self.handle)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        self.free();
    }
}
