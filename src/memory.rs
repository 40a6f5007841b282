use std::ops::Range;
use std::sync::Arc;

use guestmemo_identity::Handle;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::scope::CacheScope;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("access of {len} byte(s) at {address:#x} is outside guest memory of {size} byte(s)")]
    OutOfBounds { address: u64, len: usize, size: usize },
    #[error("cannot allocate {requested} byte(s), {available} left")]
    Exhausted { requested: usize, available: usize },
}

/// Byte-addressed view of a guest's linear memory. Values are little-endian.
pub trait GuestMemory: Send + Sync {
    fn read_bytes(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError>;
    fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), MemoryError>;

    fn read_i32(&self, address: u32) -> Result<i32, MemoryError> {
        let mut buf = [0; 4];
        self.read_bytes(address, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_i64(&self, address: u32) -> Result<i64, MemoryError> {
        let mut buf = [0; 8];
        self.read_bytes(address, &mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn read_f32(&self, address: u32) -> Result<f32, MemoryError> {
        let mut buf = [0; 4];
        self.read_bytes(address, &mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    fn read_f64(&self, address: u32) -> Result<f64, MemoryError> {
        let mut buf = [0; 8];
        self.read_bytes(address, &mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
        let mut buf = [0; 4];
        self.read_bytes(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_i32(&self, address: u32, value: i32) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_i64(&self, address: u32, value: i64) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_f32(&self, address: u32, value: f32) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_f64(&self, address: u32, value: f64) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_u32(&self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

impl<T: GuestMemory + ?Sized> GuestMemory for Arc<T> {
    fn read_bytes(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read_bytes(address, out)
    }

    fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        (**self).write_bytes(address, bytes)
    }
}

/// Fixed-size in-process memory with a bump allocator.
///
/// The first word is reserved so that no allocation ever lands on the null
/// pointer.
#[derive(Debug)]
pub struct LinearMemory {
    bytes: RwLock<Vec<u8>>,
    next: Mutex<usize>,
}

const RESERVED: usize = 8;

impl LinearMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: RwLock::new(vec![0; size]),
            next: Mutex::new(RESERVED),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.read().len()
    }

    /// Reserves `size` zeroed bytes aligned to `align` (a power of two) and
    /// returns their address.
    pub fn alloc(&self, size: usize, align: usize) -> Result<u32, MemoryError> {
        let capacity = self.size().min(u32::MAX as usize);
        let mut next = self.next.lock();
        let start = next.next_multiple_of(align.max(1));
        let end = start.checked_add(size).filter(|end| *end <= capacity).ok_or(
            MemoryError::Exhausted {
                requested: size,
                available: capacity.saturating_sub(*next),
            },
        )?;
        *next = end;
        u32::try_from(start).map_err(|_| MemoryError::Exhausted {
            requested: size,
            available: 0,
        })
    }
}

fn byte_range(address: u32, len: usize, size: usize) -> Result<Range<usize>, MemoryError> {
    let start = address as usize;
    start
        .checked_add(len)
        .filter(|end| *end <= size)
        .map(|end| start..end)
        .ok_or(MemoryError::OutOfBounds {
            address: u64::from(address),
            len,
            size,
        })
}

impl GuestMemory for LinearMemory {
    fn read_bytes(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        let bytes = self.bytes.read();
        let range = byte_range(address, out.len(), bytes.len())?;
        out.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn write_bytes(&self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let mut bytes = self.bytes.write();
        let range = byte_range(address, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }
}

/// Field access for one entity.
///
/// Reads go straight to guest memory. Every setter writes and then fires the
/// entity's mutation hook before returning, so no memoized result computed
/// from the old value survives the write.
pub struct Fields<'a, M: GuestMemory + ?Sized> {
    memory: &'a M,
    handle: &'a Handle,
}

impl<'a, M: GuestMemory + ?Sized> Fields<'a, M> {
    pub const fn new(memory: &'a M, handle: &'a Handle) -> Self {
        Self { memory, handle }
    }

    pub const fn handle(&self) -> &Handle {
        self.handle
    }

    fn at(&self, offset: u32) -> Result<u32, MemoryError> {
        self.handle
            .pointer()
            .checked_add(offset)
            .ok_or(MemoryError::OutOfBounds {
                address: u64::from(self.handle.pointer()) + u64::from(offset),
                len: 0,
                size: 0,
            })
    }

    pub fn read_i32(&self, offset: u32) -> Result<i32, MemoryError> {
        self.memory.read_i32(self.at(offset)?)
    }

    pub fn read_i64(&self, offset: u32) -> Result<i64, MemoryError> {
        self.memory.read_i64(self.at(offset)?)
    }

    pub fn read_f32(&self, offset: u32) -> Result<f32, MemoryError> {
        self.memory.read_f32(self.at(offset)?)
    }

    pub fn read_f64(&self, offset: u32) -> Result<f64, MemoryError> {
        self.memory.read_f64(self.at(offset)?)
    }

    pub fn read_bool(&self, offset: u32) -> Result<bool, MemoryError> {
        Ok(self.read_i32(offset)? != 0)
    }

    /// Reads a pointer field and resolves it to the scope's handle. A null
    /// pointer is `None`.
    pub fn read_reference(
        &self,
        offset: u32,
        scope: &CacheScope,
    ) -> Result<Option<Arc<Handle>>, MemoryError> {
        let pointer = self.memory.read_u32(self.at(offset)?)?;
        Ok(scope.handle(pointer))
    }

    pub fn set_i32(&self, offset: u32, value: i32) -> Result<(), MemoryError> {
        self.memory.write_i32(self.at(offset)?, value)?;
        self.handle.invalidate_self();
        Ok(())
    }

    pub fn set_i64(&self, offset: u32, value: i64) -> Result<(), MemoryError> {
        self.memory.write_i64(self.at(offset)?, value)?;
        self.handle.invalidate_self();
        Ok(())
    }

    pub fn set_f32(&self, offset: u32, value: f32) -> Result<(), MemoryError> {
        self.memory.write_f32(self.at(offset)?, value)?;
        self.handle.invalidate_self();
        Ok(())
    }

    pub fn set_f64(&self, offset: u32, value: f64) -> Result<(), MemoryError> {
        self.memory.write_f64(self.at(offset)?, value)?;
        self.handle.invalidate_self();
        Ok(())
    }

    pub fn set_bool(&self, offset: u32, value: bool) -> Result<(), MemoryError> {
        self.set_i32(offset, i32::from(value))
    }

    /// Stores a pointer to `target`, or null for `None`.
    pub fn set_reference(&self, offset: u32, target: Option<&Handle>) -> Result<(), MemoryError> {
        let pointer = target.map_or(0, Handle::pointer);
        self.memory.write_u32(self.at(offset)?, pointer)?;
        self.handle.invalidate_self();
        Ok(())
    }
}
