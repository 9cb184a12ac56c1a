use crate::common::OutputInfo;
use crate::{params_are_valid, HSfinishRes, HSpollRes, HSsinkRes};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum HSDstate {
    TagBit,
    YieldLiteral,
    BackrefIndexMsb,
    BackrefIndexLsb,
    BackrefCountMsb,
    BackrefCountLsb,
    YieldBackref,
}

/// A no-heap decoder whose buffers are sized at compile time.
///
/// `WINDOW`/`LOOKAHEAD` are the codec parameters in bits and must match the
/// encoder that produced the stream; `WINDOW_BUF_SIZE` must equal
/// `1 << WINDOW` and `INPUT_BUFFER_SIZE` is the size of the staging buffer
/// for not-yet-decoded input, chosen freely by the caller (the teacher
/// defaults to 32). [`StaticHeatshrinkDecoder::new`] validates the
/// relationship and returns `None` if it is wrong.
#[derive(Debug)]
pub struct StaticHeatshrinkDecoder<
    const WINDOW: u8,
    const WINDOW_BUF_SIZE: usize,
    const LOOKAHEAD: u8,
    const INPUT_BUFFER_SIZE: usize,
> {
    input_size: usize,
    input_index: usize,
    output_count: usize,
    output_index: usize,
    head_index: usize,
    current_byte: u8,
    bit_index: u8,
    state: HSDstate,
    input_buffer: [u8; INPUT_BUFFER_SIZE],
    output_buffer: [u8; WINDOW_BUF_SIZE],
}

impl<const WINDOW: u8, const WINDOW_BUF_SIZE: usize, const LOOKAHEAD: u8, const INPUT_BUFFER_SIZE: usize>
    StaticHeatshrinkDecoder<WINDOW, WINDOW_BUF_SIZE, LOOKAHEAD, INPUT_BUFFER_SIZE>
{
    /// Build a new decoder. Returns `None` if `(WINDOW, LOOKAHEAD)` is out of
    /// range, `INPUT_BUFFER_SIZE == 0`, or `WINDOW_BUF_SIZE != 1 << WINDOW`.
    pub fn new() -> Option<Self> {
        if !params_are_valid(WINDOW, LOOKAHEAD)
            || INPUT_BUFFER_SIZE == 0
            || WINDOW_BUF_SIZE != (1usize << WINDOW)
        {
            return None;
        }

        Some(StaticHeatshrinkDecoder {
            input_size: 0,
            input_index: 0,
            output_count: 0,
            output_index: 0,
            head_index: 0,
            current_byte: 0,
            bit_index: 0,
            state: HSDstate::TagBit,
            input_buffer: [0; INPUT_BUFFER_SIZE],
            output_buffer: [0; WINDOW_BUF_SIZE],
        })
    }

    /// Reset the decoder to its initial state.
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

    /// Window size in bits.
    pub fn window_bits(&self) -> u8 {
        WINDOW
    }

    /// Lookahead size in bits.
    pub fn lookahead_bits(&self) -> u8 {
        LOOKAHEAD
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
                HSDstate::TagBit => self.state = self.st_tag_bit(),
                HSDstate::YieldLiteral => self.state = self.st_yield_literal(&mut output_info),
                HSDstate::BackrefIndexMsb => self.state = self.st_backref_index_msb(),
                HSDstate::BackrefIndexLsb => self.state = self.st_backref_index_lsb(),
                HSDstate::BackrefCountMsb => self.state = self.st_backref_count_msb(),
                HSDstate::BackrefCountLsb => self.state = self.st_backref_count_lsb(),
                HSDstate::YieldBackref => self.state = self.st_yield_backref(&mut output_info),
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
                if WINDOW > 8 {
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

    // `WINDOW`/`LOOKAHEAD` can be as large as 15/14, but `get_bits` may only
    // ever be asked for at most 8 bits at a time (see its doc comment) — so
    // any field wider than a byte is split into an MSB chunk (`bits - 8`, at
    // most 7/6 here) and an 8-bit LSB chunk, each fetched in its own state,
    // the way the indexed/runtime-sized reference decoder this was
    // generalized from does it.

    fn st_backref_index_msb(&mut self) -> HSDstate {
        match self.get_bits(WINDOW - 8) {
            None => HSDstate::BackrefIndexMsb,
            Some(x) => {
                self.output_index = (x as usize) << 8;
                HSDstate::BackrefIndexLsb
            }
        }
    }

    fn st_backref_index_lsb(&mut self) -> HSDstate {
        match self.get_bits(WINDOW.min(8)) {
            None => HSDstate::BackrefIndexLsb,
            Some(x) => {
                self.output_index |= x as usize;
                self.output_index += 1;
                self.output_count = 0;
                if LOOKAHEAD > 8 {
                    HSDstate::BackrefCountMsb
                } else {
                    HSDstate::BackrefCountLsb
                }
            }
        }
    }

    fn st_backref_count_msb(&mut self) -> HSDstate {
        match self.get_bits(LOOKAHEAD - 8) {
            None => HSDstate::BackrefCountMsb,
            Some(x) => {
                self.output_count = (x as usize) << 8;
                HSDstate::BackrefCountLsb
            }
        }
    }

    fn st_backref_count_lsb(&mut self) -> HSDstate {
        match self.get_bits(LOOKAHEAD.min(8)) {
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

    /// Finish the uncompress stream.
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
    fn rejects_mismatched_buffer_size() {
        assert!(StaticHeatshrinkDecoder::<8, 255, 4, 32>::new().is_none());
        assert!(StaticHeatshrinkDecoder::<8, 256, 4, 32>::new().is_some());
        assert!(StaticHeatshrinkDecoder::<8, 256, 4, 0>::new().is_none());
    }

    #[cfg(feature = "std")]
    fn roundtrip<
        const WINDOW: u8,
        const ENC_BUF: usize,
        const DEC_BUF: usize,
        const LOOKAHEAD: u8,
    >(
        data: &[u8],
    ) {
        use crate::static_encoder::StaticHeatshrinkEncoder;

        let mut enc = StaticHeatshrinkEncoder::<WINDOW, ENC_BUF, LOOKAHEAD>::new().unwrap();
        let mut dec = StaticHeatshrinkDecoder::<WINDOW, DEC_BUF, LOOKAHEAD, 32>::new().unwrap();

        let mut compressed: std::vec::Vec<u8> = std::vec::Vec::new();
        let mut input_pos = 0;
        while input_pos < data.len() {
            let mut sunk = 0;
            enc.sink(&data[input_pos..], &mut sunk);
            input_pos += sunk;

            let mut scratch = [0u8; 256];
            loop {
                let mut written = 0;
                let res = enc.poll(&mut scratch, &mut written);
                compressed.extend_from_slice(&scratch[..written]);
                if res != HSpollRes::PollMore {
                    break;
                }
            }
        }
        enc.finish();
        loop {
            let mut scratch = [0u8; 256];
            let mut written = 0;
            let res = enc.poll(&mut scratch, &mut written);
            compressed.extend_from_slice(&scratch[..written]);
            if res != HSpollRes::PollMore {
                break;
            }
        }

        let mut decompressed: std::vec::Vec<u8> = std::vec::Vec::new();
        let mut pos = 0;
        while pos < compressed.len() {
            let (_, sunk) = dec.sink(&compressed[pos..]);
            pos += sunk;
            loop {
                let mut scratch = [0u8; 256];
                let (res, produced) = dec.poll(&mut scratch);
                decompressed.extend_from_slice(&scratch[..produced]);
                if res != HSpollRes::PollMore {
                    break;
                }
            }
        }
        loop {
            let done = matches!(dec.finish(), HSfinishRes::FinishDone);
            let mut scratch = [0u8; 256];
            let (res, produced) = dec.poll(&mut scratch);
            decompressed.extend_from_slice(&scratch[..produced]);
            if done && res != HSpollRes::PollMore {
                break;
            }
        }

        assert_eq!(data, decompressed.as_slice());
    }

    #[test]
    #[cfg(feature = "std")]
    fn roundtrips_with_window_above_8_bits() {
        // Exercises the BackrefIndexMsb/Lsb split: W=11 needs a 3-bit MSB
        // chunk plus an 8-bit LSB chunk out of `get_bits`.
        let data: std::vec::Vec<u8> = (0u32..4000).map(|x| (x % 197) as u8).collect();
        roundtrip::<11, 4096, 2048, 6>(&data);
    }

    #[test]
    #[cfg(feature = "std")]
    fn roundtrips_with_window_and_lookahead_at_max() {
        // W=15, L=14: both the index and the count need their MSB/LSB split.
        let data: std::vec::Vec<u8> = (0u32..6000).map(|x| (x % 251) as u8).collect();
        roundtrip::<15, 65536, 32768, 14>(&data);
    }
}
