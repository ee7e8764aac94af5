#![no_main]
use arbitrary::Arbitrary;
use archive_cloud::core::compression::{decode_frame, encode_frame};
use archive_cloud::{CompressionConfig, CompressionMethod};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    method: u8,
    threshold: u16,
    payload: Vec<u8>,
    damage: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let method = CompressionMethod::from_u8(input.method % 3).unwrap_or(CompressionMethod::None);
    let config = CompressionConfig {
        method,
        threshold: input.threshold as usize,
        min_ratio: 0.9,
    };

    let frame = match encode_frame(&input.payload, &config) {
        Ok(frame) => frame,
        Err(_) => return,
    };
    let decoded = decode_frame(&frame, true, "fuzz").unwrap();
    assert_eq!(decoded, input.payload);

    // damaged frames may fail, never panic
    let _ = decode_frame(&input.damage, true, "fuzz");
});
