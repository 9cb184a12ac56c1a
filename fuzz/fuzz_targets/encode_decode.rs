#![no_main]

use libfuzzer_sys::fuzz_target;

/// Round-trips arbitrary bytes through the heap-backed encoder/decoder,
/// deriving `(W, L)` from the first two input bytes so fuzzing also reaches
/// the `W > 8` / `L > 8` decoder paths (the multi-bit-width back-reference
/// fields), not just the default `(8, 4)`.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let window = 4 + (data[0] % 12); // 4..=15
    let lookahead = 3 + (data[1] % (window - 3)); // 3..window
    let payload = &data[2..];

    let mut compressed = vec![0u8; payload.len() * 2 + 64];
    let Ok(compressed) = heatshrink::encoder::encode(payload, &mut compressed, window, lookahead)
    else {
        return;
    };

    let mut decompressed = vec![0u8; payload.len() + 64];
    let decompressed = heatshrink::decoder::decode(compressed, &mut decompressed, 32, window, lookahead)
        .expect("a stream produced by our own encoder must decode cleanly");

    assert_eq!(payload, decompressed);
});
