//! Property-based tests for the archive and the cloud
//!
//! Uses proptest to check that values survive archiving and that record ids
//! depend only on content.

use archive_cloud::{
    from_bytes, load_from_bytes, to_bytes, BufferInputArchive, Cloud, RecordContainer,
    ShardedContainer, Tensor, ThreadWorld,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

proptest! {
    #[test]
    fn prop_nested_values_survive(
        names in prop::collection::vec(".{0,12}", 0..8),
        table in prop::collection::hash_map(any::<i16>(), prop::collection::vec(any::<u64>(), 0..6), 0..10),
        flags in prop::collection::vec(any::<bool>(), 0..40),
        extra in any::<Option<(char, i128)>>(),
    ) {
        let value = (names, table, flags, extra);
        let bytes = to_bytes(&value).unwrap();
        let back: (Vec<String>, HashMap<i16, Vec<u64>>, Vec<bool>, Option<(char, i128)>) =
            from_bytes(&bytes).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn prop_floats_are_bit_exact(values in prop::collection::vec(any::<f64>(), 0..64)) {
        let back: Vec<f64> = from_bytes(&to_bytes(&values).unwrap()).unwrap();
        prop_assert_eq!(back.len(), values.len());
        for (a, b) in back.iter().zip(&values) {
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn prop_vec_load_replaces_target(
        stored in prop::collection::vec(any::<i32>(), 0..50),
        previous in prop::collection::vec(any::<i32>(), 0..50),
    ) {
        let mut target = previous;
        load_from_bytes(&to_bytes(&stored).unwrap(), &mut target).unwrap();
        prop_assert_eq!(target, stored);
    }

    #[test]
    fn prop_map_load_is_a_merge(
        stored in prop::collection::btree_map(0u8..32, any::<i64>(), 0..16),
        previous in prop::collection::btree_map(0u8..32, any::<i64>(), 0..16),
    ) {
        let mut expected = previous.clone();
        expected.extend(stored.iter().map(|(k, v)| (*k, *v)));

        let mut target: BTreeMap<u8, i64> = previous;
        load_from_bytes(&to_bytes(&stored).unwrap(), &mut target).unwrap();
        prop_assert_eq!(target, expected);
    }

    #[test]
    fn prop_every_prefix_is_rejected(values in prop::collection::vec(any::<u32>(), 1..20)) {
        let bytes = to_bytes(&values).unwrap();
        for cut in 0..bytes.len() {
            let mut input = BufferInputArchive::new(&bytes[..cut]);
            let mut target: Vec<u32> = Vec::new();
            prop_assert!(input.load(&mut target).is_err());
        }
    }

    #[test]
    fn prop_equal_content_equal_records(
        data in prop::collection::vec(-1e6f64..1e6, 1..32),
        dims_split in 1usize..4,
    ) {
        let container = Arc::new(ShardedContainer::default());
        let mut first = Cloud::new(container.clone());
        let mut second = Cloud::new(container.clone());
        let world = ThreadWorld::solo();

        let a = first.store(&world, &data).unwrap();
        let b = second.store(&world, &data.clone()).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(container.len(), 1);

        let rows = if data.len() % dims_split == 0 { dims_split } else { 1 };
        let tensor = Tensor::from_vec(&[rows, data.len() / rows], data.clone()).unwrap();
        let records = first.store(&world, &tensor).unwrap();
        let back: Tensor<f64> = second.load(&world, &records).unwrap();
        prop_assert_eq!(back, tensor);
    }
}
