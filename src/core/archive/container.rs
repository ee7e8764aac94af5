//! Archives over a single container record

use super::{wrap_load, wrap_store, Archivable, InputArchive, OutputArchive};
use crate::core::compression::{decode_frame, encode_frame, CompressionConfig};
use crate::core::container::{RecordContainer, RecordId};
use crate::core::error::{CloudError, Result};
use crate::core::world::World;

/// Collects one record and writes it to the container on [`close`](Self::close)
pub struct ContainerRecordOutputArchive<'c> {
    container: &'c dyn RecordContainer,
    record: RecordId,
    compression: CompressionConfig,
    bytes: Vec<u8>,
}

impl<'c> ContainerRecordOutputArchive<'c> {
    pub fn new(
        container: &'c dyn RecordContainer,
        record: RecordId,
        compression: &CompressionConfig,
    ) -> Self {
        ContainerRecordOutputArchive {
            container,
            record,
            compression: *compression,
            bytes: Vec::new(),
        }
    }

    /// Append one wrapped value to the record
    pub fn store<T: Archivable>(&mut self, value: &T) -> Result<()> {
        wrap_store(self, value)
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    /// Frame the record and put it, returning whether it was newly inserted
    pub fn close(self) -> Result<bool> {
        let frame = encode_frame(&self.bytes, &self.compression)?;
        self.container.put(self.record, frame)
    }
}

impl OutputArchive for ContainerRecordOutputArchive<'_> {
    fn store_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

/// Reads back one container record
pub struct ContainerRecordInputArchive<'c> {
    record: RecordId,
    bytes: Vec<u8>,
    position: usize,
    world: Option<&'c dyn World>,
}

impl<'c> ContainerRecordInputArchive<'c> {
    /// Fetch and unframe `record`
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if the container has no such record, and any
    /// framing fault (`ChecksumMismatch`, `UnknownCompression`, ...).
    pub fn open(
        container: &dyn RecordContainer,
        record: RecordId,
        world: Option<&'c dyn World>,
        verify: bool,
    ) -> Result<Self> {
        let frame = container
            .get(record)?
            .ok_or_else(|| CloudError::RecordNotFound(record.to_string()))?;
        let bytes = decode_frame(&frame, verify, &record.to_string())?;

        Ok(ContainerRecordInputArchive {
            record,
            bytes,
            position: 0,
            world,
        })
    }

    /// Read one wrapped value into `value`
    pub fn load<T: Archivable>(&mut self, value: &mut T) -> Result<()> {
        wrap_load(self, value)
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == self.bytes.len()
    }
}

impl InputArchive for ContainerRecordInputArchive<'_> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::ShardedContainer;

    #[test]
    fn test_record_roundtrip() {
        let container = ShardedContainer::default();
        let id = RecordId(77);

        let mut out = ContainerRecordOutputArchive::new(&container, id, &CompressionConfig::lz4());
        out.store(&vec![0.5f64; 1000]).unwrap();
        out.store(&"tail".to_string()).unwrap();
        assert!(out.close().unwrap());

        let mut input = ContainerRecordInputArchive::open(&container, id, None, true).unwrap();
        let mut values: Vec<f64> = Vec::new();
        let mut tail = String::new();
        input.load(&mut values).unwrap();
        input.load(&mut tail).unwrap();

        assert_eq!(values, vec![0.5; 1000]);
        assert_eq!(tail, "tail");
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_second_close_is_dropped() {
        let container = ShardedContainer::default();
        let id = RecordId(1);

        let mut first = ContainerRecordOutputArchive::new(&container, id, &CompressionConfig::none());
        first.store(&1i32).unwrap();
        assert!(first.close().unwrap());

        let mut second = ContainerRecordOutputArchive::new(&container, id, &CompressionConfig::none());
        second.store(&1i32).unwrap();
        assert!(!second.close().unwrap());
        assert_eq!(container.stats().writes, 1);
    }

    #[test]
    fn test_missing_record() {
        let container = ShardedContainer::default();
        assert!(matches!(
            ContainerRecordInputArchive::open(&container, RecordId(3), None, true),
            Err(CloudError::RecordNotFound(_))
        ));
    }
}
