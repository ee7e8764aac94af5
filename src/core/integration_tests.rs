//! Cross-module tests
//!
//! Tests the interaction between:
//! - User types and the archive macros
//! - File, buffer and container record archives
//! - The cloud with compression and distributed handles

#[cfg(test)]
mod tests {
    use crate::core::archive::{
        from_bytes, to_bytes, ContainerRecordInputArchive, ContainerRecordOutputArchive,
        FileInputArchive, FileOutputArchive, InputArchive, OutputArchive, SelfDescribing,
    };
    use crate::core::cloud::Cloud;
    use crate::core::compression::{CompressionConfig, CompressionMethod};
    use crate::core::config::CloudConfig;
    use crate::core::container::{RecordContainer, RecordId, ShardedContainer};
    use crate::core::error::{CloudError, Result};
    use crate::core::objects::ObjectRef;
    use crate::core::tensor::Tensor;
    use crate::core::world::{LocalUniverse, ThreadWorld, World};
    use crate::{archive_fields, self_describing, wrap_load, wrap_store};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Molecule {
        name: String,
        charges: Vec<f64>,
        bonds: BTreeMap<u32, u32>,
        spin: Option<i8>,
    }

    archive_fields!(Molecule => 150 { name, charges, bonds, spin });

    /// Stores a derived value that is recomputed on load
    #[derive(Debug, Default, PartialEq)]
    struct Histogram {
        bins: Vec<u32>,
        total: u64,
    }

    impl SelfDescribing for Histogram {
        fn store_fields<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
            wrap_store(ar, &self.bins)
        }

        fn load_fields<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
            wrap_load(ar, &mut self.bins)?;
            self.total = self.bins.iter().map(|&b| b as u64).sum();
            Ok(())
        }
    }

    self_describing!(Histogram);

    fn water() -> Molecule {
        let mut bonds = BTreeMap::new();
        bonds.insert(0, 1);
        bonds.insert(0, 2);
        Molecule {
            name: "H2O".to_string(),
            charges: vec![-0.8, 0.4, 0.4],
            bonds,
            spin: Some(0),
        }
    }

    #[test]
    fn test_field_list_roundtrip() {
        let bytes = to_bytes(&water()).unwrap();
        assert_eq!(bytes[0], 150);
        assert_eq!(from_bytes::<Molecule>(&bytes).unwrap(), water());
    }

    #[test]
    fn test_asymmetric_self_describing() {
        let h = Histogram {
            bins: vec![1, 2, 3],
            total: 999,
        };
        let back: Histogram = from_bytes(&to_bytes(&h).unwrap()).unwrap();
        assert_eq!(back.bins, vec![1, 2, 3]);
        assert_eq!(back.total, 6);
    }

    #[test]
    fn test_user_type_mismatch_reports_cookies() {
        let bytes = to_bytes(&water()).unwrap();
        match from_bytes::<Histogram>(&bytes) {
            Err(CloudError::TypeMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 255);
                assert_eq!(found, 150);
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_same_bytes_in_every_archive_kind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("molecule.ar");
        let value = (water(), vec![1u16, 2, 3], 'x');

        let mut file = FileOutputArchive::create(&path).unwrap();
        file.store(&value).unwrap();
        file.close().unwrap();

        let container = ShardedContainer::default();
        let mut record =
            ContainerRecordOutputArchive::new(&container, RecordId(1), &CompressionConfig::zstd());
        record.store(&value).unwrap();
        record.close().unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[12..], to_bytes(&value).unwrap().as_slice());

        let mut from_file = <(Molecule, Vec<u16>, char)>::default();
        FileInputArchive::open(&path)
            .unwrap()
            .load(&mut from_file)
            .unwrap();

        let mut from_record = <(Molecule, Vec<u16>, char)>::default();
        ContainerRecordInputArchive::open(&container, RecordId(1), None, true)
            .unwrap()
            .load(&mut from_record)
            .unwrap();

        assert_eq!(from_file, value);
        assert_eq!(from_record, value);
    }

    #[test]
    fn test_compressed_cloud_records() {
        let container = Arc::new(ShardedContainer::default());
        let config = CloudConfig::default().with_compression(CompressionConfig {
            method: CompressionMethod::Lz4,
            threshold: 64,
            min_ratio: 0.9,
        });
        let mut cloud = Cloud::with_config(container.clone(), config).unwrap();
        let world = ThreadWorld::solo();

        let big = vec![0.25f64; 4096];
        let records = cloud.store(&world, &big).unwrap();
        let frame = container.get(records.front().unwrap()).unwrap().unwrap();
        assert_eq!(frame[0], CompressionMethod::Lz4 as u8);
        assert!(frame.len() < big.len() * 8);

        let back: Vec<f64> = cloud.load(&world, &records).unwrap();
        assert_eq!(back, big);
    }

    #[test]
    fn test_tensor_through_cloud() {
        let container = Arc::new(ShardedContainer::default());
        let mut cloud = Cloud::new(container);
        let world = ThreadWorld::solo();

        let t = Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let records = cloud.store(&world, &t).unwrap();
        let same = cloud.store(&world, &t.clone()).unwrap();
        assert_eq!(records, same);

        let back: Tensor<f64> = cloud.load(&world, &records).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_handles_across_subworlds() {
        #[derive(Debug)]
        struct Basis {
            size: usize,
        }

        let universe = LocalUniverse::new(4);
        let container = universe.container();

        let results = universe.run(|world| -> Result<(bool, usize)> {
            let mut cloud = Cloud::new(container.clone());
            let basis: Vec<ObjectRef<Basis>> = (1..=3)
                .map(|size| ObjectRef::share(&world, || Basis { size }))
                .collect::<Result<_>>()?;

            let records = cloud.store(&world, &basis)?;
            let sub = world.split(2)?;
            let loaded: Vec<ObjectRef<Basis>> = cloud.load(&sub, &records)?;

            let same = loaded.iter().zip(&basis).all(|(a, b)| a.ptr_eq(b));
            let sizes = loaded.iter().filter_map(|h| h.get()).map(|b| b.size).sum();
            Ok((same, sizes))
        });

        for result in results {
            assert_eq!(result.unwrap(), (true, 6));
        }
        // one length record plus three handle records
        assert_eq!(container.len(), 4);
    }

    #[test]
    fn test_handle_records_follow_identity() {
        let container = Arc::new(ShardedContainer::default());
        let mut cloud = Cloud::new(container.clone());
        let world = ThreadWorld::solo();

        let a = ObjectRef::share(&world, || 1u32).unwrap();
        let b = ObjectRef::share(&world, || 1u32).unwrap();

        let ra = cloud.store(&world, &a).unwrap();
        let rb = cloud.store(&world, &b).unwrap();
        assert_ne!(ra, rb);
        assert_eq!(ra.front(), Some(a.id().record()));
        assert_eq!(container.len(), 2);
        assert_eq!(world.objects().len(), 2);
    }
}
