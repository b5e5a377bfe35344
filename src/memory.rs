//! Typed access to the engine module's linear memory.
//!
//! All engine "pointers" are `u32` offsets into one shared linear memory.
//! The backing buffer can move whenever the module grows its memory, so the
//! raw slice is re-derived from the [`Memory`] handle on every access and
//! never cached across calls.

use wasmtime::{Memory, Store};

use crate::Error;

/// A view over the engine's linear memory with little-endian accessors.
///
/// Cheap to copy; holds only the memory handle, not the buffer itself.
#[derive(Clone, Copy)]
pub(crate) struct MemView {
    memory: Memory,
}

// Full typed accessor surface; the decode path only needs a subset of it.
#[allow(dead_code)]
impl MemView {
    pub(crate) fn new(memory: Memory) -> Self {
        Self { memory }
    }

    fn slice<'a>(&self, store: &'a Store<()>, at: u32, len: u32) -> Result<&'a [u8], Error> {
        let data = self.memory.data(store);
        data.get(at as usize..at as usize + len as usize)
            .ok_or(Error::OutOfBounds { offset: at, len })
    }

    fn slice_mut<'a>(
        &self,
        store: &'a mut Store<()>,
        at: u32,
        len: u32,
    ) -> Result<&'a mut [u8], Error> {
        let data = self.memory.data_mut(store);
        data.get_mut(at as usize..at as usize + len as usize)
            .ok_or(Error::OutOfBounds { offset: at, len })
    }

    pub(crate) fn read_u8(&self, store: &Store<()>, at: u32) -> Result<u8, Error> {
        Ok(self.slice(store, at, 1)?[0])
    }

    pub(crate) fn read_u16(&self, store: &Store<()>, at: u32) -> Result<u16, Error> {
        let b = self.slice(store, at, 2)?;
        Ok(u16::from_le_bytes(b.try_into().expect("length checked")))
    }

    pub(crate) fn read_u32(&self, store: &Store<()>, at: u32) -> Result<u32, Error> {
        let b = self.slice(store, at, 4)?;
        Ok(u32::from_le_bytes(b.try_into().expect("length checked")))
    }

    pub(crate) fn read_u64(&self, store: &Store<()>, at: u32) -> Result<u64, Error> {
        let b = self.slice(store, at, 8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("length checked")))
    }

    pub(crate) fn read_i16(&self, store: &Store<()>, at: u32) -> Result<i16, Error> {
        let b = self.slice(store, at, 2)?;
        Ok(i16::from_le_bytes(b.try_into().expect("length checked")))
    }

    pub(crate) fn read_i32(&self, store: &Store<()>, at: u32) -> Result<i32, Error> {
        let b = self.slice(store, at, 4)?;
        Ok(i32::from_le_bytes(b.try_into().expect("length checked")))
    }

    pub(crate) fn read_i64(&self, store: &Store<()>, at: u32) -> Result<i64, Error> {
        let b = self.slice(store, at, 8)?;
        Ok(i64::from_le_bytes(b.try_into().expect("length checked")))
    }

    /// Borrowed view of `len` bytes at `at`. Valid only until the next call
    /// that can grow memory.
    pub(crate) fn read_bytes<'a>(
        &self,
        store: &'a Store<()>,
        at: u32,
        len: u32,
    ) -> Result<&'a [u8], Error> {
        self.slice(store, at, len)
    }

    /// Owned copy of `len` bytes at `at`, safe to retain across engine calls.
    pub(crate) fn read_bytes_copy(
        &self,
        store: &Store<()>,
        at: u32,
        len: u32,
    ) -> Result<Vec<u8>, Error> {
        Ok(self.slice(store, at, len)?.to_vec())
    }

    /// Decode a NUL-terminated UTF-8 string of at most `max` bytes.
    ///
    /// Scans forward for the first zero byte; if none is found within `max`
    /// bytes the whole span is decoded.
    pub(crate) fn read_str(&self, store: &Store<()>, at: u32, max: u32) -> Result<String, Error> {
        let b = self.slice(store, at, max)?;
        let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
        Ok(String::from_utf8_lossy(&b[..end]).into_owned())
    }

    pub(crate) fn write_u32(&self, store: &mut Store<()>, at: u32, value: u32) -> Result<(), Error> {
        self.slice_mut(store, at, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Little-endian 64-bit store. The low and high halves are encoded
    /// independently so the full unsigned range round-trips.
    pub(crate) fn write_u64(&self, store: &mut Store<()>, at: u32, value: u64) -> Result<(), Error> {
        self.slice_mut(store, at, 8)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub(crate) fn write_bytes(&self, store: &mut Store<()>, at: u32, data: &[u8]) -> Result<(), Error> {
        // A slice longer than the 32-bit offset space cannot fit in linear
        // memory; casting its length would truncate the bounds check.
        let len = u32::try_from(data.len())
            .map_err(|_| Error::OutOfBounds { offset: at, len: u32::MAX })?;
        self.slice_mut(store, at, len)?.copy_from_slice(data);
        Ok(())
    }
}
