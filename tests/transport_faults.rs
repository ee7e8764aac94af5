//! Fault injection at the container and file layers

use archive_cloud::core::compression::FRAME_HEADER_SIZE;
use archive_cloud::{
    Cloud, CloudConfig, CloudError, ContainerStats, FileInputArchive, FileOutputArchive,
    RecordContainer, RecordId, Result, ShardedContainer, ThreadWorld,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    RejectWrites,
    FlipPayloadByte,
    BadMethod,
    Truncate,
}

/// Container that damages traffic on demand
struct FaultyContainer {
    inner: ShardedContainer,
    fault: Mutex<Fault>,
}

impl FaultyContainer {
    fn new() -> Self {
        FaultyContainer {
            inner: ShardedContainer::default(),
            fault: Mutex::new(Fault::None),
        }
    }

    fn inject(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }
}

impl RecordContainer for FaultyContainer {
    fn put(&self, id: RecordId, frame: Vec<u8>) -> Result<bool> {
        if *self.fault.lock() == Fault::RejectWrites {
            return Err(CloudError::Container(format!("write of {} refused", id)));
        }
        self.inner.put(id, frame)
    }

    fn get(&self, id: RecordId) -> Result<Option<Arc<[u8]>>> {
        let Some(frame) = self.inner.get(id)? else {
            return Ok(None);
        };

        let mut damaged = frame.to_vec();
        match *self.fault.lock() {
            Fault::FlipPayloadByte => {
                let last = damaged.len() - 1;
                damaged[last] ^= 0x01;
            }
            Fault::BadMethod => damaged[0] = 0x7f,
            Fault::Truncate => damaged.truncate(3),
            Fault::None | Fault::RejectWrites => return Ok(Some(frame)),
        }
        Ok(Some(Arc::from(damaged)))
    }

    fn contains(&self, id: RecordId) -> bool {
        self.inner.contains(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn stats(&self) -> ContainerStats {
        self.inner.stats()
    }
}

fn cloud_over(container: &Arc<FaultyContainer>, verify: bool) -> Cloud {
    let config = CloudConfig {
        verify_checksums: verify,
        ..CloudConfig::default()
    };
    Cloud::with_config(container.clone(), config).unwrap()
}

#[test]
fn test_rejected_write_propagates() {
    let container = Arc::new(FaultyContainer::new());
    let mut cloud = cloud_over(&container, true);
    let world = ThreadWorld::solo();

    container.inject(Fault::RejectWrites);
    let err = cloud.store(&world, &vec![1.0f64]).unwrap_err();
    assert!(matches!(err, CloudError::Container(_)));
    assert!(container.is_empty());

    // a failed store is not remembered as present
    container.inject(Fault::None);
    let records = cloud.store(&world, &vec![1.0f64]).unwrap();
    assert_eq!(container.len(), 1);
    assert_eq!(cloud.load::<Vec<f64>>(&world, &records).unwrap(), vec![1.0]);
}

#[test]
fn test_corrupted_payload_fails_checksum() {
    let container = Arc::new(FaultyContainer::new());
    let mut cloud = cloud_over(&container, true);
    let world = ThreadWorld::solo();

    let records = cloud.store(&world, &"integrity".to_string()).unwrap();
    container.inject(Fault::FlipPayloadByte);

    let err = cloud.load::<String>(&world, &records).unwrap_err();
    assert!(matches!(err, CloudError::ChecksumMismatch(ref r) if *r == records.front().unwrap().to_string()));
    assert!(!cloud.is_cached(records.front().unwrap()));

    container.inject(Fault::None);
    assert_eq!(cloud.load::<String>(&world, &records).unwrap(), "integrity");
}

#[test]
fn test_unverified_corruption_goes_unnoticed() {
    let container = Arc::new(FaultyContainer::new());
    let mut cloud = cloud_over(&container, false);
    let world = ThreadWorld::solo();

    let records = cloud.store(&world, &"integrity".to_string()).unwrap();
    container.inject(Fault::FlipPayloadByte);

    // last byte 'y' becomes 'x'
    assert_eq!(cloud.load::<String>(&world, &records).unwrap(), "integritx");
}

#[test]
fn test_unknown_compression_method() {
    let container = Arc::new(FaultyContainer::new());
    let mut cloud = cloud_over(&container, true);
    let world = ThreadWorld::solo();

    let records = cloud.store(&world, &17i64).unwrap();
    container.inject(Fault::BadMethod);
    assert!(matches!(
        cloud.load::<i64>(&world, &records),
        Err(CloudError::UnknownCompression(0x7f))
    ));
}

#[test]
fn test_truncated_frame() {
    let container = Arc::new(FaultyContainer::new());
    let mut cloud = cloud_over(&container, true);
    let world = ThreadWorld::solo();

    let records = cloud.store(&world, &17i64).unwrap();
    container.inject(Fault::Truncate);
    assert!(matches!(
        cloud.load::<i64>(&world, &records),
        Err(CloudError::UnexpectedEof {
            needed: FRAME_HEADER_SIZE,
            available: 3
        })
    ));
}

#[test]
fn test_truncated_file_archive() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cut.ar");

    let mut out = FileOutputArchive::create(&path).unwrap();
    out.store(&vec![0.5f64; 32]).unwrap();
    out.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 40]).unwrap();

    let mut input = FileInputArchive::open(&path).unwrap();
    let mut values: Vec<f64> = Vec::new();
    assert!(matches!(
        input.load(&mut values),
        Err(CloudError::UnexpectedEof { .. })
    ));
}

#[test]
fn test_foreign_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let short = temp_dir.path().join("short.ar");
    let foreign = temp_dir.path().join("foreign.ar");
    let future = temp_dir.path().join("future.ar");

    std::fs::write(&short, b"arch").unwrap();
    std::fs::write(&foreign, b"notanarchive").unwrap();
    let mut header = b"archive\0".to_vec();
    header.extend_from_slice(&7u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    std::fs::write(&future, &header).unwrap();

    assert!(matches!(FileInputArchive::open(&short), Err(CloudError::InvalidMagic)));
    assert!(matches!(FileInputArchive::open(&foreign), Err(CloudError::InvalidMagic)));
    assert!(matches!(
        FileInputArchive::open(&future),
        Err(CloudError::UnsupportedVersion { major: 7, .. })
    ));
    assert!(matches!(
        FileInputArchive::open(temp_dir.path().join("missing.ar")),
        Err(CloudError::Io(_))
    ));
}
