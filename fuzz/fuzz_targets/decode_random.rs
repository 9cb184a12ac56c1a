#![no_main]

use libfuzzer_sys::fuzz_target;

/// Feeds arbitrary (almost certainly invalid) compressed bytes into the
/// decoder, with `(W, L)` also derived from the input so fuzzing reaches the
/// `W > 8` / `L > 8` back-reference decoding paths, not just the default
/// `(8, 4)`. There is no expected output; this only checks the decoder never
/// panics or loops forever on untrusted input.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let window = 4 + (data[0] % 12); // 4..=15
    let lookahead = 3 + (data[1] % (window - 3)); // 3..window
    let payload = &data[2..];

    let mut out = vec![0u8; payload.len().saturating_mul(64).max(256)];
    let _ = heatshrink::decoder::decode(payload, &mut out, 32, window, lookahead);
});
