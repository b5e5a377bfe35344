//! Engine facade: instance bookkeeping and one-time global initialization.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::OnceCell;

use crate::instance::{Instance, STATE_BLOCK_SIZE};
use crate::module::EngineModule;
use crate::{Architecture, Error, Mode};

/// An instantiated disassembly engine.
///
/// One engine owns the wasm store and linear memory every [`Instance`]
/// shares. Most callers want the process-wide engine from [`initialize`];
/// [`Engine::new`] and [`Engine::from_loader`] exist for embedders and tests
/// that manage their own lifetime.
pub struct Engine {
    module: Mutex<EngineModule>,
}

impl Engine {
    /// Instantiate the engine from raw wasm module bytes.
    pub fn new(bytes: &[u8]) -> Result<Engine, Error> {
        let module = EngineModule::instantiate(bytes)?;
        debug!("engine module instantiated ({} bytes)", bytes.len());
        Ok(Engine {
            module: Mutex::new(module),
        })
    }

    /// Instantiate the engine by awaiting module bytes from `load`.
    ///
    /// Loader failures surface as [`Error::Load`] and are not retried.
    pub async fn from_loader<F, Fut>(load: F) -> Result<Engine, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        let bytes = load().await.map_err(Error::Load)?;
        Engine::new(&bytes)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineModule> {
        // A poisoned lock only means an earlier call panicked mid-operation;
        // the store carries no host-side invariants, and panicking here
        // again would turn every later call (including `Instance::drop`
        // during unwind) into an abort.
        self.module.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a decoder instance for `architecture` with the given mode
    /// flags.
    ///
    /// Fails with [`Error::Open`] (carrying the engine status code) if the
    /// engine rejects the pairing, or [`Error::Allocation`] if foreign
    /// memory is exhausted.
    pub fn create_instance(
        &self,
        architecture: Architecture,
        mode: Mode,
    ) -> Result<Instance<'_>, Error> {
        let mut module = self.lock();

        // Scratch cell the engine writes the new handle into.
        let cell = module.heap_alloc(4)?;
        if cell == 0 {
            return Err(Error::Allocation("handle cell"));
        }

        let status = match module.open(architecture, mode, cell) {
            Ok(status) => status,
            Err(e) => {
                let _ = module.heap_free(cell);
                return Err(e);
            }
        };
        if status != 0 {
            module.heap_free(cell)?;
            return Err(Error::Open(status));
        }

        // From here on the handle is open engine-side; close it again on
        // every failure path so nothing leaks.
        let handle = match module.read_u32(cell) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = module.heap_free(cell);
                return Err(e);
            }
        };
        if let Err(e) = module.heap_free(cell) {
            let _ = module.close(handle);
            return Err(e);
        }

        // The reusable record buffer and the streaming cursor block. On
        // failure the handle is closed again so nothing leaks engine-side.
        let record_ptr = module.record_alloc(handle)?;
        if record_ptr == 0 {
            let _ = module.close(handle);
            return Err(Error::Allocation("instruction record buffer"));
        }
        let state_ptr = module.heap_alloc(STATE_BLOCK_SIZE)?;
        if state_ptr == 0 {
            let _ = module.record_free(record_ptr, 1);
            let _ = module.close(handle);
            return Err(Error::Allocation("cursor state block"));
        }
        drop(module);

        debug!("created {architecture} instance (handle {handle})");
        Ok(Instance::new(
            self,
            architecture,
            mode,
            handle,
            record_ptr,
            state_ptr,
        ))
    }

    /// [`Engine::create_instance`] with the default (little-endian) mode.
    pub fn create_instance_default(&self, architecture: Architecture) -> Result<Instance<'_>, Error> {
        self.create_instance(architecture, Mode::default())
    }

    /// Free an instance's engine-side resources. Safe to call more than
    /// once.
    pub fn free_instance(&self, instance: &mut Instance<'_>) {
        instance.free();
    }
}

// Manual impl: the wasm store behind the mutex is not `Debug`.
impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

static ENGINE: OnceCell<Engine> = OnceCell::const_new();

/// Load and instantiate the process-wide engine.
///
/// The first call awaits `load` for the module bytes and instantiates the
/// engine; concurrent callers attach to that same in-flight attempt rather
/// than loading twice. Once loaded, every later call resolves immediately
/// with the same engine, which lives for the rest of the process. A failed
/// load leaves the engine unloaded and the next call retries from scratch.
pub async fn initialize<F, Fut>(load: F) -> Result<&'static Engine, Error>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<u8>>>,
{
    ENGINE.get_or_try_init(|| Engine::from_loader(load)).await
}

/// Non-blocking peek at the process-wide engine.
///
/// Returns `None` until a call to [`initialize`] has completed successfully.
pub fn try_get() -> Option<&'static Engine> {
    ENGINE.get()
}
