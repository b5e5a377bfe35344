//! Instantiation of the engine wasm module and its typed entry points.
//!
//! The engine is one opaque wasm binary. It imports its linear memory as
//! `env.memory` plus a WASI-shaped syscall surface that is structurally
//! required for linking but never reached from the disassembly entry points.

use wasmtime::{Linker, Memory, MemoryType, Store, TypedFunc};

use crate::memory::MemView;
use crate::{Architecture, Error, Mode};

/// Initial size of the shared linear memory, in 64 KiB wasm pages.
const INITIAL_PAGES: u32 = 96;

/// One instantiated engine module: the store, its linear memory, and the
/// typed entry points the binding drives.
pub(crate) struct EngineModule {
    store: Store<()>,
    view: MemView,
    cs_open: TypedFunc<(i32, i32, i32), i32>,
    cs_close: TypedFunc<i32, i32>,
    cs_option: TypedFunc<(i32, i32, i32), i32>,
    cs_malloc: TypedFunc<i32, i32>,
    cs_free: TypedFunc<(i32, i32), ()>,
    cs_disasm_iter: TypedFunc<(i32, i32, i32, i32, i32), i32>,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
}

impl EngineModule {
    /// Instantiate the engine from its raw module bytes.
    pub(crate) fn instantiate(bytes: &[u8]) -> Result<Self, Error> {
        let engine = wasmtime::Engine::default();
        let module = wasmtime::Module::new(&engine, bytes).map_err(Error::Load)?;

        let mut store = Store::new(&engine, ());
        let memory =
            Memory::new(&mut store, MemoryType::new(INITIAL_PAGES, None)).map_err(Error::Load)?;

        let mut linker: Linker<()> = Linker::new(&engine);
        linker
            .define(&store, "env", "memory", memory)
            .map_err(Error::Load)?;
        // The WASI import surface must exist for the module to link, but the
        // decode path never calls into it. Reaching one of these stubs is a
        // defect in the engine build, so they all trap.
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(Error::Load)?;

        let instance = linker.instantiate(&mut store, &module).map_err(Error::Load)?;

        let cs_open = instance
            .get_typed_func::<(i32, i32, i32), i32>(&mut store, "cs_open")
            .map_err(Error::Load)?;
        let cs_close = instance
            .get_typed_func::<i32, i32>(&mut store, "cs_close")
            .map_err(Error::Load)?;
        let cs_option = instance
            .get_typed_func::<(i32, i32, i32), i32>(&mut store, "cs_option")
            .map_err(Error::Load)?;
        let cs_malloc = instance
            .get_typed_func::<i32, i32>(&mut store, "cs_malloc")
            .map_err(Error::Load)?;
        let cs_free = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, "cs_free")
            .map_err(Error::Load)?;
        let cs_disasm_iter = instance
            .get_typed_func::<(i32, i32, i32, i32, i32), i32>(&mut store, "cs_disasm_iter")
            .map_err(Error::Load)?;
        let malloc = instance
            .get_typed_func::<i32, i32>(&mut store, "malloc")
            .map_err(Error::Load)?;
        let free = instance
            .get_typed_func::<i32, ()>(&mut store, "free")
            .map_err(Error::Load)?;

        Ok(Self {
            store,
            view: MemView::new(memory),
            cs_open,
            cs_close,
            cs_option,
            cs_malloc,
            cs_free,
            cs_disasm_iter,
            malloc,
            free,
        })
    }

    pub(crate) fn view(&self) -> &MemView {
        &self.view
    }

    pub(crate) fn store(&self) -> &Store<()> {
        &self.store
    }

    /// `cs_open(arch, mode, out_handle)`: configures a new decoder context
    /// and writes its handle to `out_handle`. Returns the engine status code.
    pub(crate) fn open(&mut self, arch: Architecture, mode: Mode, out_handle: u32) -> Result<i32, Error> {
        Ok(self
            .cs_open
            .call(&mut self.store, (arch as i32, mode.bits() as i32, out_handle as i32))?)
    }

    pub(crate) fn close(&mut self, handle: u32) -> Result<i32, Error> {
        Ok(self.cs_close.call(&mut self.store, handle as i32)?)
    }

    pub(crate) fn set_option(&mut self, handle: u32, kind: u32, value: u32) -> Result<i32, Error> {
        Ok(self
            .cs_option
            .call(&mut self.store, (handle as i32, kind as i32, value as i32))?)
    }

    /// Allocate the reusable instruction-record buffer for `handle`.
    /// Returns the null offset on failure.
    pub(crate) fn record_alloc(&mut self, handle: u32) -> Result<u32, Error> {
        Ok(self.cs_malloc.call(&mut self.store, handle as i32)? as u32)
    }

    pub(crate) fn record_free(&mut self, record: u32, count: u32) -> Result<(), Error> {
        Ok(self
            .cs_free
            .call(&mut self.store, (record as i32, count as i32))?)
    }

    /// One step of streaming disassembly. The engine consumes bytes from the
    /// code region and advances all three referenced cursor fields in place.
    /// Returns `false` at end-of-input or on undecodable bytes.
    pub(crate) fn disasm_iter(
        &mut self,
        handle: u32,
        code_ptr_ptr: u32,
        size_ptr: u32,
        address_ptr: u32,
        record: u32,
    ) -> Result<bool, Error> {
        let decoded = self.cs_disasm_iter.call(
            &mut self.store,
            (
                handle as i32,
                code_ptr_ptr as i32,
                size_ptr as i32,
                address_ptr as i32,
                record as i32,
            ),
        )?;
        Ok(decoded != 0)
    }

    /// Generic foreign-heap allocation. Returns the null offset on failure.
    pub(crate) fn heap_alloc(&mut self, size: u32) -> Result<u32, Error> {
        Ok(self.malloc.call(&mut self.store, size as i32)? as u32)
    }

    pub(crate) fn heap_free(&mut self, ptr: u32) -> Result<(), Error> {
        Ok(self.free.call(&mut self.store, ptr as i32)?)
    }

    pub(crate) fn read_u32(&self, at: u32) -> Result<u32, Error> {
        self.view.read_u32(&self.store, at)
    }

    pub(crate) fn write_u32(&mut self, at: u32, value: u32) -> Result<(), Error> {
        self.view.write_u32(&mut self.store, at, value)
    }

    pub(crate) fn write_u64(&mut self, at: u32, value: u64) -> Result<(), Error> {
        self.view.write_u64(&mut self.store, at, value)
    }

    pub(crate) fn write_bytes(&mut self, at: u32, data: &[u8]) -> Result<(), Error> {
        self.view.write_bytes(&mut self.store, at, data)
    }
}
