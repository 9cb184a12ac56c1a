use alloc::vec;
use alloc::vec::Vec;

use crate::common::OutputInfo;
use crate::{params_are_valid, HSError, HSfinishRes, HSpollRes, HSsinkRes};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum HSDstate {
    TagBit,            /* tag bit */
    YieldLiteral,      /* ready to yield literal byte */
    BackrefIndexMsb,   /* most significant bits of back-reference distance */
    BackrefIndexLsb,   /* least significant byte of back-reference distance */
    BackrefCountMsb,   /* most significant bits of back-reference length */
    BackrefCountLsb,   /* least significant byte of back-reference length */
    YieldBackref,      /* ready to yield back-reference */
}

/// The decoder instance.
///
/// `window_bits`/`lookahead_bits` must match whatever the encoder used to
/// produce the stream being decoded; the wire format carries no self-
/// describing header. See [`crate::static_decoder`] for a no-heap,
/// compile-time-sized variant.
#[derive(Debug)]
pub struct HeatshrinkDecoder {
    input_size: usize,
    input_index: usize,
    output_count: usize,
    output_index: usize,
    head_index: usize,
    current_byte: u8,
    bit_index: u8,
    state: HSDstate,
    window_bits: u8,
    lookahead_bits: u8,
    input_buffer: Vec<u8>,
    output_buffer: Vec<u8>,
}

/// Uncompress `src` into `dst` with a freshly constructed decoder.
pub fn decode<'a>(
    src: &[u8],
    dst: &'a mut [u8],
    input_buffer_size: usize,
    window_bits: u8,
    lookahead_bits: u8,
) -> Result<&'a [u8], HSError> {
    let mut total_input_size = 0;
    let mut total_output_size = 0;

    let mut dec = HeatshrinkDecoder::new(input_buffer_size, window_bits, lookahead_bits)
        .ok_or(HSError::InvalidParams)?;

    while total_input_size < src.len() {
        match dec.sink(&src[total_input_size..]) {
            (HSsinkRes::SinkOK, segment_input_size) => {
                total_input_size += segment_input_size;
            }
            (HSsinkRes::SinkFull, _) => {}
            (HSsinkRes::SinkErrorMisuse, _) => {
                return Err(HSError::Internal);
            }
        }

        if total_output_size == dst.len() {
            return Err(HSError::OutputFull);
        }

        match dec.poll(&mut dst[total_output_size..]) {
            (HSpollRes::PollMore, _) => {
                return Err(HSError::OutputFull);
            }
            (HSpollRes::PollEmpty, segment_output_size) => {
                total_output_size += segment_output_size;
            }
            (HSpollRes::PollErrorMisuse, _) => {
                return Err(HSError::Internal);
            }
        }

        if total_input_size == src.len() {
            match dec.finish() {
                HSfinishRes::FinishDone => {}
                HSfinishRes::FinishMore => {
                    return Err(HSError::OutputFull);
                }
            }
        }
    }

    Ok(&dst[..total_output_size])
}

/// Uncompress all of `src` and return a freshly allocated `Vec`.
pub fn decode_to_vec(
    src: &[u8],
    input_buffer_size: usize,
    window_bits: u8,
    lookahead_bits: u8,
) -> Result<Vec<u8>, HSError> {
    let mut dec = HeatshrinkDecoder::new(input_buffer_size, window_bits, lookahead_bits)
        .ok_or(HSError::InvalidParams)?;
    let mut out = Vec::with_capacity(src.len() * 2);
    let mut scratch = vec![0u8; 256];
    let mut offset = 0;

    while offset < src.len() {
        let (res, consumed) = dec.sink(&src[offset..]);
        if res == HSsinkRes::SinkErrorMisuse {
            return Err(HSError::Internal);
        }
        offset += consumed;

        loop {
            let (res, produced) = dec.poll(&mut scratch);
            out.extend_from_slice(&scratch[..produced]);
            match res {
                HSpollRes::PollMore => continue,
                HSpollRes::PollEmpty => break,
                HSpollRes::PollErrorMisuse => return Err(HSError::Internal),
            }
        }
    }

    loop {
        let done = matches!(dec.finish(), HSfinishRes::FinishDone);
        let (res, produced) = dec.poll(&mut scratch);
        out.extend_from_slice(&scratch[..produced]);
        match res {
            HSpollRes::PollMore => continue,
            HSpollRes::PollEmpty => {
                if done {
                    break;
                }
            }
            HSpollRes::PollErrorMisuse => return Err(HSError::Internal),
        }
    }

    Ok(out)
}

impl HeatshrinkDecoder {
    /// Create a new decoder instance.
    ///
    /// `input_buffer_size` sizes the staging buffer sunk input is held in
    /// before being consumed by `poll`. Returns `None` if `(window_bits,
    /// lookahead_bits)` is out of range or `input_buffer_size` is zero.
    pub fn new(input_buffer_size: usize, window_bits: u8, lookahead_bits: u8) -> Option<Self> {
        if !params_are_valid(window_bits, lookahead_bits) || input_buffer_size == 0 {
            return None;
        }

        Some(HeatshrinkDecoder {
            input_size: 0,
            input_index: 0,
            output_count: 0,
            output_index: 0,
            head_index: 0,
            current_byte: 0,
            bit_index: 0,
            state: HSDstate::TagBit,
            window_bits,
            lookahead_bits,
            input_buffer: vec![0; input_buffer_size],
            output_buffer: vec![0; 1usize << window_bits],
        })
    }

    /// Reset the decoder to its initial state, keeping its `(W, L)` and
    /// input-buffer size.
    pub fn reset(&mut self) {
        self.input_size = 0;
        self.input_index = 0;
        self.output_count = 0;
        self.output_index = 0;
        self.head_index = 0;
        self.current_byte = 0;
        self.bit_index = 0;
        self.state = HSDstate::TagBit;
        self.input_buffer.iter_mut().for_each(|m| *m = 0);
        self.output_buffer.iter_mut().for_each(|m| *m = 0);
    }

    /// Window size in bits, as given to [`HeatshrinkDecoder::new`].
    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// Lookahead size in bits, as given to [`HeatshrinkDecoder::new`].
    pub fn lookahead_bits(&self) -> u8 {
        self.lookahead_bits
    }

    /// Add an input buffer to be processed/uncompressed.
    pub fn sink(&mut self, input_buffer: &[u8]) -> (HSsinkRes, usize) {
        let remaining_size = self.input_buffer.len() - self.input_size;

        if remaining_size == 0 {
            return (HSsinkRes::SinkFull, 0);
        }

        let copy_size = remaining_size.min(input_buffer.len());

        self.input_buffer[self.input_size..self.input_size + copy_size]
            .copy_from_slice(&input_buffer[..copy_size]);
        self.input_size += copy_size;

        (HSsinkRes::SinkOK, copy_size)
    }

    /// Process the input/internal buffer and write the uncompressed stream
    /// into `output_buffer`.
    pub fn poll(&mut self, output_buffer: &mut [u8]) -> (HSpollRes, usize) {
        if output_buffer.is_empty() {
            return (HSpollRes::PollErrorMisuse, 0);
        }

        let mut output_size: usize = 0;
        let mut output_info = OutputInfo::new(output_buffer, &mut output_size);

        loop {
            let in_state = self.state;

            match in_state {
                HSDstate::TagBit => {
                    self.state = self.st_tag_bit();
                }
                HSDstate::YieldLiteral => {
                    self.state = self.st_yield_literal(&mut output_info);
                }
                HSDstate::BackrefIndexMsb => {
                    self.state = self.st_backref_index_msb();
                }
                HSDstate::BackrefIndexLsb => {
                    self.state = self.st_backref_index_lsb();
                }
                HSDstate::BackrefCountMsb => {
                    self.state = self.st_backref_count_msb();
                }
                HSDstate::BackrefCountLsb => {
                    self.state = self.st_backref_count_lsb();
                }
                HSDstate::YieldBackref => {
                    self.state = self.st_yield_backref(&mut output_info);
                }
            }

            if self.state == in_state {
                return if output_info.can_take_byte() {
                    (HSpollRes::PollEmpty, output_size)
                } else {
                    (HSpollRes::PollMore, output_size)
                };
            }
        }
    }

    fn st_tag_bit(&mut self) -> HSDstate {
        match self.get_bits(1) {
            None => HSDstate::TagBit,
            Some(0) => {
                if self.window_bits > 8 {
                    HSDstate::BackrefIndexMsb
                } else {
                    self.output_index = 0;
                    HSDstate::BackrefIndexLsb
                }
            }
            Some(_) => HSDstate::YieldLiteral,
        }
    }

    fn st_yield_literal(&mut self, output_info: &mut OutputInfo) -> HSDstate {
        // Emit a repeated section from the window buffer, and add it (again)
        // to the window buffer. (Note that the repetition can include itself)
        if output_info.can_take_byte() {
            match self.get_bits(8) {
                None => HSDstate::YieldLiteral,
                Some(x) => {
                    let c = (x & 0xff) as u8;
                    let mask = self.output_buffer.len() - 1;
                    self.output_buffer[self.head_index & mask] = c;
                    self.head_index += 1;
                    output_info.push_byte(c);
                    HSDstate::TagBit
                }
            }
        } else {
            HSDstate::YieldLiteral
        }
    }

    // `window_bits`/`lookahead_bits` can be as large as 15/14, but `get_bits`
    // may only ever be asked for at most 8 bits at a time (see its doc
    // comment) — so any field wider than a byte is split into an MSB chunk
    // (`bits - 8`, at most 7/6 here) and an 8-bit LSB chunk, each fetched in
    // its own state, the way the indexed/runtime-sized reference decoder
    // this was generalized from does it.

    fn st_backref_index_msb(&mut self) -> HSDstate {
        match self.get_bits(self.window_bits - 8) {
            None => HSDstate::BackrefIndexMsb,
            Some(x) => {
                self.output_index = (x as usize) << 8;
                HSDstate::BackrefIndexLsb
            }
        }
    }

    fn st_backref_index_lsb(&mut self) -> HSDstate {
        match self.get_bits(self.window_bits.min(8)) {
            None => HSDstate::BackrefIndexLsb,
            Some(x) => {
                self.output_index |= x as usize;
                self.output_index += 1;
                self.output_count = 0;
                if self.lookahead_bits > 8 {
                    HSDstate::BackrefCountMsb
                } else {
                    HSDstate::BackrefCountLsb
                }
            }
        }
    }

    fn st_backref_count_msb(&mut self) -> HSDstate {
        match self.get_bits(self.lookahead_bits - 8) {
            None => HSDstate::BackrefCountMsb,
            Some(x) => {
                self.output_count = (x as usize) << 8;
                HSDstate::BackrefCountLsb
            }
        }
    }

    fn st_backref_count_lsb(&mut self) -> HSDstate {
        match self.get_bits(self.lookahead_bits.min(8)) {
            None => HSDstate::BackrefCountLsb,
            Some(x) => {
                self.output_count |= x as usize;
                self.output_count += 1;
                HSDstate::YieldBackref
            }
        }
    }

    fn st_yield_backref(&mut self, output_info: &mut OutputInfo) -> HSDstate {
        if output_info.can_take_byte() {
            let mask = self.output_buffer.len() - 1;
            let count = self.output_count.min(output_info.remaining_free_size());

            for _ in 0..count {
                let c = if self.output_index > self.head_index {
                    0
                } else {
                    self.output_buffer[(self.head_index - self.output_index) & mask]
                };
                self.output_buffer[self.head_index & mask] = c;
                output_info.push_byte(c);
                self.head_index += 1;
            }

            self.output_count -= count;

            if self.output_count == 0 {
                return HSDstate::TagBit;
            }
        }
        HSDstate::YieldBackref
    }

    /// Get the next COUNT bits from the input buffer, saving incremental
    /// progress. Returns `None` on end of input. Callers must never request
    /// more than 8 bits: the "suspend without consuming" guard below only
    /// accounts for needing at most one more byte from the input buffer,
    /// which holds for any field the MSB/LSB split hands it, but would lose
    /// already-accumulated bits for a wider request.
    fn get_bits(&mut self, count: u8) -> Option<u16> {
        if count > 8 {
            return None;
        }

        if count == 0 {
            return Some(0);
        }

        // If we aren't able to get COUNT bits, suspend immediately, because
        // we don't track how many bits of COUNT we've accumulated before
        // suspend.
        if self.input_size == 0 && self.bit_index < (1 << (count - 1)) {
            return None;
        }

        let mut accumulator: u16 = 0;
        let mut i: u8 = 0;

        while i < count {
            if self.bit_index == 0 {
                if self.input_size == 0 {
                    return None;
                }
                self.current_byte = self.input_buffer[self.input_index];
                self.input_index += 1;
                if self.input_index == self.input_size {
                    self.input_index = 0;
                    self.input_size = 0;
                }
                self.bit_index = 0x80;
            }
            accumulator <<= 1;
            if self.current_byte & self.bit_index != 0 {
                accumulator |= 0x1;
            }
            self.bit_index >>= 1;
            i += 1;
        }

        Some(accumulator)
    }

    /// Finish the uncompress stream. Returns `FinishMore` if input remains
    /// unconsumed, or if we're stopped mid-token (a truncated stream) —
    /// either way the caller should keep polling or treat it as an error,
    /// never silently truncate the output.
    pub fn finish(&self) -> HSfinishRes {
        if self.input_size == 0 && self.state == HSDstate::TagBit {
            HSfinishRes::FinishDone
        } else {
            HSfinishRes::FinishMore
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_params() {
        assert!(HeatshrinkDecoder::new(32, 3, 3).is_none());
        assert!(HeatshrinkDecoder::new(32, 16, 4).is_none());
        assert!(HeatshrinkDecoder::new(0, 8, 4).is_none());
        assert!(HeatshrinkDecoder::new(32, 8, 4).is_some());
    }

    #[test]
    fn empty_stream_finishes_done() {
        let dec = HeatshrinkDecoder::new(32, 8, 4).unwrap();
        assert_eq!(dec.finish(), HSfinishRes::FinishDone);
    }

    #[test]
    fn roundtrips_with_window_above_8_bits() {
        // Exercises the BackrefIndexMsb/Lsb split: W=11 needs a 3-bit MSB
        // chunk plus an 8-bit LSB chunk out of `get_bits`.
        let data: Vec<u8> = (0u32..4000).map(|x| (x % 197) as u8).collect();
        let compressed =
            crate::encoder::encode_to_vec(&data, 11, 6).expect("encode should succeed");
        let decompressed =
            crate::decoder::decode_to_vec(&compressed, 32, 11, 6).expect("decode should succeed");
        assert_eq!(data, decompressed);
    }

    #[test]
    fn roundtrips_with_window_and_lookahead_at_max() {
        // W=15, L=14: both the index and the count need their MSB/LSB split.
        let data: Vec<u8> = (0u32..6000).map(|x| (x % 251) as u8).collect();
        let compressed =
            crate::encoder::encode_to_vec(&data, 15, 14).expect("encode should succeed");
        let decompressed =
            crate::decoder::decode_to_vec(&compressed, 32, 15, 14).expect("decode should succeed");
        assert_eq!(data, decompressed);
    }
}
