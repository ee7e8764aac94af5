//! In-memory archives

use super::{wrap_load, wrap_store, Archivable, InputArchive, OutputArchive};
use crate::core::error::{CloudError, Result};
use crate::core::world::World;

/// Growable byte buffer archive
#[derive(Debug, Default, Clone)]
pub struct BufferOutputArchive {
    bytes: Vec<u8>,
}

impl BufferOutputArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BufferOutputArchive {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Append one wrapped value
    pub fn store<T: Archivable>(&mut self, value: &T) -> Result<()> {
        wrap_store(self, value)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl OutputArchive for BufferOutputArchive {
    fn store_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

/// Read cursor over a borrowed byte slice
///
/// Binding a world lets distributed handles resolve while loading.
pub struct BufferInputArchive<'a> {
    bytes: &'a [u8],
    position: usize,
    world: Option<&'a dyn World>,
}

impl<'a> BufferInputArchive<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        BufferInputArchive {
            bytes,
            position: 0,
            world: None,
        }
    }

    pub fn with_world(bytes: &'a [u8], world: &'a dyn World) -> Self {
        BufferInputArchive {
            bytes,
            position: 0,
            world: Some(world),
        }
    }

    /// Read one wrapped value into `value`
    pub fn load<T: Archivable>(&mut self, value: &mut T) -> Result<()> {
        wrap_load(self, value)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == self.bytes.len()
    }
}

impl InputArchive for BufferInputArchive<'_> {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.bytes.len() - self.position;
        if buf.len() > available {
            return Err(CloudError::UnexpectedEof {
                needed: buf.len(),
                available,
            });
        }
        buf.copy_from_slice(&self.bytes[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.bytes.len() - self.position)
    }

    fn world(&self) -> Option<&dyn World> {
        self.world
    }
}

/// Serialize one wrapped value into a fresh buffer
pub fn to_bytes<T: Archivable>(value: &T) -> Result<Vec<u8>> {
    let mut ar = BufferOutputArchive::new();
    ar.store(value)?;
    Ok(ar.into_inner())
}

/// Deserialize one wrapped value into a default instance
pub fn from_bytes<T: Archivable + Default>(bytes: &[u8]) -> Result<T> {
    let mut value = T::default();
    load_from_bytes(bytes, &mut value)?;
    Ok(value)
}

/// Deserialize one wrapped value into an existing instance
pub fn load_from_bytes<T: Archivable>(bytes: &[u8], value: &mut T) -> Result<()> {
    BufferInputArchive::new(bytes).load(value)
}
