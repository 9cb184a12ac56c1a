#![crate_type = "rlib"]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Minimal compression & decompression library for embedded use.
//! Implements the Heatshrink compression algorithm
//! described here <https://github.com/atomicobject/heatshrink>
//! and here <https://spin.atomicobject.com/2013/03/14/heatshrink-embedded-data-compression/>
//!
//! Heatshrink is an LZSS-style sliding-window compressor: a `W`-bit window
//! selects how far back a back-reference may point, an `L`-bit lookahead
//! bounds how long a single back-reference run may be. Both the encoder and
//! the decoder are explicit, non-blocking state machines driven by three
//! calls — `sink` (push input), `poll` (drain output), `finish` (flush) —
//! so a caller on a microcontroller can feed and drain them a byte at a
//! time without ever assuming the whole stream fits in RAM.
//!
//! Two storage strategies share the same wire format and algorithm:
//!
//! * [`encoder`] / [`decoder`] — heap-backed, `(W, L)` chosen at runtime.
//!   Requires the `alloc` (or `std`) feature.
//! * [`static_encoder`] / [`static_decoder`] — const-generic, buffers
//!   in-line, no heap. Available with or without `std`.
//!
//! The wire format itself has no framing: no magic bytes, no length
//! prefix, no checksum. A literal is a `1` tag bit followed by 8 bits of
//! payload; a back-reference is a `0` tag bit followed by a `W`-bit
//! distance-minus-one and an `L`-bit length-minus-one, all MSB-first, with
//! zero padding in the final byte.

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

pub(crate) mod common;

/// module to compress data with a heap-allocated, runtime-sized window
#[cfg(feature = "alloc")]
pub mod encoder;
/// module to uncompress data with a heap-allocated, runtime-sized window
#[cfg(feature = "alloc")]
pub mod decoder;

/// module to compress data with a const-generic, compile-time-sized window
pub mod static_encoder;
/// module to uncompress data with a const-generic, compile-time-sized window
pub mod static_decoder;

/// Smallest valid window size, in bits. See [`HEATSHRINK_MAX_WINDOW_BITS`].
pub const HEATSHRINK_MIN_WINDOW_BITS: u8 = 4;
/// Largest valid window size, in bits. The window holds `1 << W` bytes of
/// back-reference history; the encoder's combined input buffer is twice
/// that.
pub const HEATSHRINK_MAX_WINDOW_BITS: u8 = 15;
/// Smallest valid lookahead size, in bits. Lookahead must always be
/// strictly smaller than the window (`L < W`).
pub const HEATSHRINK_MIN_LOOKAHEAD_BITS: u8 = 3;

/// Window size used when a caller doesn't otherwise specify one.
pub const HEATSHRINK_DEFAULT_WINDOW_BITS: u8 = 8;
/// Lookahead size used when a caller doesn't otherwise specify one.
pub const HEATSHRINK_DEFAULT_LOOKAHEAD_BITS: u8 = 4;
/// Decoder input staging-buffer size used when a caller doesn't otherwise
/// specify one.
pub const HEATSHRINK_DEFAULT_INPUT_BUFFER_SIZE: usize = 32;

/// Return code for a `sink` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HSsinkRes {
    /// instance is not in a state that can accept more input (finishing, or
    /// the input buffer is already full and waiting to be polled).
    SinkErrorMisuse,
    /// internal buffer is full; no data was added.
    SinkFull,
    /// data was correctly added to the internal buffer.
    SinkOK,
}

/// Return code for a `poll` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HSpollRes {
    /// error in input parameters (e.g. an empty output buffer).
    PollErrorMisuse,
    /// more data is available; call `poll` again with a fresh buffer.
    PollMore,
    /// no more data can be produced right now; `sink` more input or call
    /// `finish`.
    PollEmpty,
}

/// Return code for a `finish` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HSfinishRes {
    /// more data is available in the input/output pipeline; keep polling.
    FinishMore,
    /// the stream is fully flushed.
    FinishDone,
}

/// Error that can be encountered while (de)compressing data through the
/// one-shot helper functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HSError {
    /// the output buffer was not large enough to hold the output data.
    OutputFull,
    /// `(window_bits, lookahead_bits)` (or the decoder's input-buffer size)
    /// was out of range.
    InvalidParams,
    /// some internal error did occur (a state machine reported misuse
    /// against its own invariants; this should not happen in practice).
    Internal,
}

impl core::fmt::Display for HSError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HSError::OutputFull => f.write_str("output buffer is too small"),
            HSError::InvalidParams => f.write_str("window/lookahead parameters are out of range"),
            HSError::Internal => f.write_str("internal heatshrink state machine error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HSError {}

/// `true` iff `(window_bits, lookahead_bits)` fall within the ranges every
/// encoder/decoder constructor validates: `4 <= window_bits <= 15` and
/// `3 <= lookahead_bits < window_bits`.
pub(crate) fn params_are_valid(window_bits: u8, lookahead_bits: u8) -> bool {
    (HEATSHRINK_MIN_WINDOW_BITS..=HEATSHRINK_MAX_WINDOW_BITS).contains(&window_bits)
        && lookahead_bits >= HEATSHRINK_MIN_LOOKAHEAD_BITS
        && lookahead_bits < window_bits
}

#[cfg(all(test, feature = "alloc"))]
mod test {
    use super::{decoder, encoder};

    fn compare(src: &[u8]) {
        let mut compressed_buffer: [u8; 512] = [0; 512];
        let mut uncompressed_buffer: [u8; 1024] = [0; 1024];

        let out1 = encoder::encode(src, &mut compressed_buffer, 8, 4).unwrap();
        let out2 = decoder::decode(out1, &mut uncompressed_buffer, 32, 8, 4).unwrap();

        assert_eq!(src, out2);
    }

    #[test]
    fn alpha() {
        let src = [
            33, 82, 149, 84, 52, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 147, 2, 0, 0, 0, 0, 0, 0, 242, 2, 241, 2, 240,
            2, 0, 0, 0, 0, 0, 0, 47, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0,
        ];
        compare(&src);
    }

    #[test]
    fn alpha2() {
        let src = [
            33, 82, 149, 84, 52, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 147, 2, 0, 0, 0, 0, 0, 0, 242, 2, 241, 2, 240,
            2, 0, 0, 0, 0, 0, 0, 47, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            12, 17,
        ];
        compare(&src);
    }

    #[test]
    fn beta() {
        let src = [
            189, 160, 51, 163, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 199, 0, 0, 0, 0, 0, 0, 0, 166, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 154, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0,
        ];
        compare(&src);
    }

    #[test]
    fn beta2() {
        let src: alloc::vec::Vec<u8> = (0u32..512).map(|x| (x % 256) as u8).collect();
        compare(&src);
    }

    #[test]
    fn clib_compatibility() {
        let src = hex_literal::hex!("90D4B2B549A4082BE00F000E4C46DF2817C605F005B4BE0825F00280");
        let expected = hex_literal::hex!(
            "21529554340200000000000000000000000000000000000000000000000000000000000000000
             0009302000000000000F202F102F0020000000000002F0400000000000000000000000000000000000000000000"
        );
        let mut dst: [u8; 100] = [0; 100];

        let out = decoder::decode(&src, &mut dst, 32, 8, 4).unwrap();

        assert_eq!(expected.as_slice(), out);
    }
}

#[cfg(all(test, feature = "alloc"))]
mod proptests {
    use super::{decoder, encoder};
    use proptest::prelude::*;

    proptest! {
        // arbitrary bytes, arbitrary valid (W, L), arbitrary sink chunk size.
        #[test]
        fn roundtrips(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            window_bits in 4u8..=15,
            lookahead_delta in 0u8..11,
            chunk_size in 1usize..64,
        ) {
            let lookahead_bits = (3 + lookahead_delta).min(window_bits.saturating_sub(1)).max(3);
            prop_assume!(lookahead_bits < window_bits);

            let compressed = encoder::encode_to_vec(&data, window_bits, lookahead_bits).unwrap();

            // Feed the decoder one `chunk_size`-sized slice at a time to
            // exercise incremental sink/poll, including 1-byte chunks.
            let mut dec = decoder::HeatshrinkDecoder::new(32, window_bits, lookahead_bits).unwrap();
            let mut out = alloc::vec::Vec::with_capacity(data.len());
            let mut scratch = alloc::vec![0u8; 256];
            let mut offset = 0;

            while offset < compressed.len() {
                let end = (offset + chunk_size).min(compressed.len());
                let mut pos = offset;
                while pos < end {
                    let (_, sunk) = dec.sink(&compressed[pos..end]);
                    pos += sunk;

                    loop {
                        let (res, produced) = dec.poll(&mut scratch);
                        out.extend_from_slice(&scratch[..produced]);
                        if res != super::HSpollRes::PollMore {
                            break;
                        }
                    }
                }
                offset = end;
            }

            loop {
                let done = matches!(dec.finish(), super::HSfinishRes::FinishDone);
                let (res, produced) = dec.poll(&mut scratch);
                out.extend_from_slice(&scratch[..produced]);
                if done && res != super::HSpollRes::PollMore {
                    break;
                }
            }

            prop_assert_eq!(data, out);
        }
    }
}
