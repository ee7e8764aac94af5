#![no_main]
use archive_cloud::{from_bytes, BufferInputArchive, Recordlist, Tensor};
use libfuzzer_sys::fuzz_target;
use std::collections::{BTreeMap, HashMap};

// Arbitrary bytes must never panic or over-allocate, whatever shape is asked for

fuzz_target!(|data: &[u8]| {
    let _ = from_bytes::<Vec<f64>>(data);
    let _ = from_bytes::<String>(data);
    let _ = from_bytes::<(i32, String, Option<u64>)>(data);
    let _ = from_bytes::<HashMap<u16, Vec<String>>>(data);
    let _ = from_bytes::<BTreeMap<String, [u8; 4]>>(data);
    let _ = from_bytes::<Tensor<f32>>(data);
    let _ = from_bytes::<Recordlist>(data);
    let _ = from_bytes::<Vec<Vec<char>>>(data);

    let mut input = BufferInputArchive::new(data);
    let mut value = 0i64;
    while input.load(&mut value).is_ok() {}
});
