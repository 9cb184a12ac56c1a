use alloc::vec;
use alloc::vec::Vec;

use crate::common::{
    unlikely, OutputInfo, FLAG_IS_FINISHING, HEATSHRINK_BACKREF_MARKER, HEATSHRINK_LITERAL_MARKER,
};
use crate::{params_are_valid, HSError, HSfinishRes, HSpollRes, HSsinkRes};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum HSEstate {
    HSESNotFull,       /* input buffer not full enough */
    HSESFilled,        /* buffer is full */
    HSESSearch,        /* searching for patterns */
    HSESYieldTagBit,   /* yield tag bit */
    HSESYieldLiteral,  /* emit literal byte */
    HSESYieldBrIndex,  /* yielding backref index */
    HSESYieldBrLength, /* yielding backref length */
    HSESSaveBacklog,   /* copying buffer to backlog */
    HSESFlushBits,     /* flush bit buffer */
    HSESDone,          /* done */
}

/// No match was found within the search window.
const MATCH_NOT_FOUND: usize = usize::MAX;
/// End-of-list marker in the inverted search index.
const INDEX_END_OF_LIST: i32 = -1;

/// The encoder instance.
///
/// `window_bits`/`lookahead_bits` are chosen at construction time and the
/// backing buffers are heap-allocated accordingly; this is the "dynamic
/// allocation" mode described for the codec. For a no-heap, compile-time
/// sized variant see [`crate::static_encoder`].
#[derive(Debug)]
pub struct HeatshrinkEncoder {
    input_size: usize,
    match_scan_index: usize,
    match_length: usize,
    match_pos: usize,
    outgoing_bits: u16,
    outgoing_bits_count: u8,
    flags: u8,
    current_byte: u8,
    bit_index: u8,
    state: HSEstate,
    window_bits: u8,
    lookahead_bits: u8,
    input_buffer_size: usize,
    lookahead_size: usize,
    /// inverted per-byte linked list: `search_index[i]` is the previous
    /// buffer position holding the same byte as `buffer[i]`, or `-1`.
    #[cfg(feature = "heatshrink-use-index")]
    search_index: Vec<i32>,
    buffer: Vec<u8>,
}

/// Compress `src` into `dst` using a freshly constructed encoder.
///
/// Returns `HSError::InvalidParams` if `(window_bits, lookahead_bits)` is
/// out of range, and `HSError::OutputFull` if `dst` cannot hold the whole
/// compressed stream.
pub fn encode<'a>(
    src: &[u8],
    dst: &'a mut [u8],
    window_bits: u8,
    lookahead_bits: u8,
) -> Result<&'a [u8], HSError> {
    let mut total_input_size = 0;
    let mut total_output_size = 0;

    let mut enc = HeatshrinkEncoder::new(window_bits, lookahead_bits).ok_or(HSError::InvalidParams)?;

    while total_input_size < src.len() {
        let mut segment_input_size = 0;

        match enc.sink(&src[total_input_size..], &mut segment_input_size) {
            HSsinkRes::SinkOK => {
                total_input_size += segment_input_size;
            }
            HSsinkRes::SinkFull => {}
            HSsinkRes::SinkErrorMisuse => {
                return Err(HSError::Internal);
            }
        }

        if total_input_size == src.len() {
            let _ = enc.finish();
        }

        if total_output_size == dst.len() {
            return Err(HSError::OutputFull);
        }

        loop {
            let mut segment_output_size = 0;

            match enc.poll(&mut dst[total_output_size..], &mut segment_output_size) {
                HSpollRes::PollMore => {
                    total_output_size += segment_output_size;
                    if total_output_size == dst.len() {
                        return Err(HSError::OutputFull);
                    }
                }
                HSpollRes::PollEmpty => {
                    total_output_size += segment_output_size;
                    break;
                }
                HSpollRes::PollErrorMisuse => {
                    return Err(HSError::Internal);
                }
            }
        }
    }

    Ok(&dst[..total_output_size])
}

/// Compress all of `src` and return a freshly allocated `Vec` with the
/// compressed stream.
pub fn encode_to_vec(src: &[u8], window_bits: u8, lookahead_bits: u8) -> Result<Vec<u8>, HSError> {
    let mut enc = HeatshrinkEncoder::new(window_bits, lookahead_bits).ok_or(HSError::InvalidParams)?;
    let mut compressed = Vec::with_capacity(src.len());
    let mut scratch = vec![0u8; 256];
    let mut offset = 0;

    while offset < src.len() {
        let mut sunk = 0;
        match enc.sink(&src[offset..], &mut sunk) {
            HSsinkRes::SinkOK => offset += sunk,
            HSsinkRes::SinkFull => {}
            HSsinkRes::SinkErrorMisuse => return Err(HSError::Internal),
        }

        loop {
            let mut polled = 0;
            match enc.poll(&mut scratch, &mut polled) {
                HSpollRes::PollMore => compressed.extend_from_slice(&scratch[..polled]),
                HSpollRes::PollEmpty => {
                    compressed.extend_from_slice(&scratch[..polled]);
                    break;
                }
                HSpollRes::PollErrorMisuse => return Err(HSError::Internal),
            }
        }
    }

    loop {
        let done = matches!(enc.finish(), HSfinishRes::FinishDone);
        let mut polled = 0;
        match enc.poll(&mut scratch, &mut polled) {
            HSpollRes::PollMore => compressed.extend_from_slice(&scratch[..polled]),
            HSpollRes::PollEmpty => {
                compressed.extend_from_slice(&scratch[..polled]);
                if done {
                    break;
                }
            }
            HSpollRes::PollErrorMisuse => return Err(HSError::Internal),
        }
    }

    Ok(compressed)
}

impl HeatshrinkEncoder {
    /// Create a new encoder for the given `(window_bits, lookahead_bits)`.
    ///
    /// Returns `None` if `window_bits` is outside `4..=15` or
    /// `lookahead_bits` is outside `3..window_bits`.
    pub fn new(window_bits: u8, lookahead_bits: u8) -> Option<Self> {
        if !params_are_valid(window_bits, lookahead_bits) {
            return None;
        }

        let input_buffer_size = 1usize << window_bits;
        let buf_sz = 2 * input_buffer_size;

        Some(HeatshrinkEncoder {
            input_size: 0,
            match_scan_index: 0,
            match_length: 0,
            match_pos: 0,
            outgoing_bits: 0,
            outgoing_bits_count: 0,
            flags: 0,
            current_byte: 0,
            bit_index: 0x80,
            state: HSEstate::HSESNotFull,
            window_bits,
            lookahead_bits,
            input_buffer_size,
            lookahead_size: 1usize << lookahead_bits,
            #[cfg(feature = "heatshrink-use-index")]
            search_index: vec![INDEX_END_OF_LIST; buf_sz],
            buffer: vec![0; buf_sz],
        })
    }

    /// Reset the encoder to its initial state, keeping its `(W, L)`.
    pub fn reset(&mut self) {
        self.input_size = 0;
        self.match_scan_index = 0;
        self.match_length = 0;
        self.match_pos = 0;
        self.outgoing_bits = 0;
        self.outgoing_bits_count = 0;
        self.flags = 0;
        self.current_byte = 0;
        self.bit_index = 0x80;
        self.state = HSEstate::HSESNotFull;
        self.buffer.iter_mut().for_each(|m| *m = 0);
        #[cfg(feature = "heatshrink-use-index")]
        {
            self.search_index
                .iter_mut()
                .for_each(|m| *m = INDEX_END_OF_LIST);
        }
    }

    /// Window size in bits, as given to [`HeatshrinkEncoder::new`].
    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// Lookahead size in bits, as given to [`HeatshrinkEncoder::new`].
    pub fn lookahead_bits(&self) -> u8 {
        self.lookahead_bits
    }

    /// Add an input buffer to be processed/compressed. Writes as many bytes
    /// as fit into the internal buffer and reports the count sunk.
    pub fn sink(&mut self, input_buffer: &[u8], input_size: &mut usize) -> HSsinkRes {
        if unlikely(self.is_finishing() || self.state != HSEstate::HSESNotFull) {
            *input_size = 0;
            return HSsinkRes::SinkErrorMisuse;
        }

        let write_offset = self.get_input_offset() + self.input_size;
        let remaining_size = self.input_buffer_size - self.input_size;

        if remaining_size == 0 {
            *input_size = 0;
            return HSsinkRes::SinkFull;
        }

        let copy_size = remaining_size.min(input_buffer.len());

        self.buffer[write_offset..write_offset + copy_size]
            .copy_from_slice(&input_buffer[..copy_size]);
        self.input_size += copy_size;
        *input_size = copy_size;

        if self.input_size == self.input_buffer_size {
            self.state = HSEstate::HSESFilled;
        }

        HSsinkRes::SinkOK
    }

    /// Process the input buffer, writing up to `output_buffer.len()`
    /// compressed bytes and reporting the count written.
    pub fn poll(&mut self, output_buffer: &mut [u8], output_size: &mut usize) -> HSpollRes {
        *output_size = 0;

        if output_buffer.is_empty() {
            return HSpollRes::PollMore;
        }

        let mut output_info = OutputInfo::new(output_buffer, output_size);

        loop {
            let in_state = self.state;

            match in_state {
                HSEstate::HSESNotFull | HSEstate::HSESDone => {
                    return HSpollRes::PollEmpty;
                }
                HSEstate::HSESFilled => {
                    self.do_indexing();
                    self.state = HSEstate::HSESSearch;
                }
                HSEstate::HSESSearch => {
                    self.state = self.st_step_search();
                }
                HSEstate::HSESYieldTagBit => {
                    self.state = self.st_yield_tag_bit(&mut output_info);
                }
                HSEstate::HSESYieldLiteral => {
                    self.state = self.st_yield_literal(&mut output_info);
                }
                HSEstate::HSESYieldBrIndex => {
                    self.state = self.st_yield_br_index(&mut output_info);
                }
                HSEstate::HSESYieldBrLength => {
                    self.state = self.st_yield_br_length(&mut output_info);
                }
                HSEstate::HSESSaveBacklog => {
                    self.state = self.st_save_backlog();
                }
                HSEstate::HSESFlushBits => {
                    self.state = self.st_flush_bit_buffer(&mut output_info);
                }
            }

            if self.state == in_state && !output_info.can_take_byte() {
                return HSpollRes::PollMore;
            }
        }
    }

    /// Mark the stream as finishing. Alternate with `poll` until it returns
    /// `FinishDone`.
    pub fn finish(&mut self) -> HSfinishRes {
        self.flags |= FLAG_IS_FINISHING;

        if self.state == HSEstate::HSESNotFull {
            self.state = HSEstate::HSESFilled;
        }

        if self.state == HSEstate::HSESDone {
            HSfinishRes::FinishDone
        } else {
            HSfinishRes::FinishMore
        }
    }

    fn st_step_search(&mut self) -> HSEstate {
        let lookahead = if self.is_finishing() { 1 } else { self.lookahead_size };

        if self.match_scan_index > self.input_size.saturating_sub(lookahead) {
            return if self.is_finishing() {
                HSEstate::HSESFlushBits
            } else {
                HSEstate::HSESSaveBacklog
            };
        }

        let end = self.get_input_offset() + self.match_scan_index;
        let start = end - self.input_buffer_size;
        let max_possible = self
            .lookahead_size
            .min(self.input_size - self.match_scan_index);

        match self.find_longest_match(start, end, max_possible) {
            None => {
                self.match_scan_index += 1;
                self.match_length = 0;
            }
            Some((pos, len)) => {
                self.match_pos = pos;
                self.match_length = len;
            }
        }
        HSEstate::HSESYieldTagBit
    }

    fn st_yield_tag_bit(&mut self, output_info: &mut OutputInfo) -> HSEstate {
        if !output_info.can_take_byte() {
            return HSEstate::HSESYieldTagBit;
        }
        if self.match_length == 0 {
            self.add_tag_bit(output_info, HEATSHRINK_LITERAL_MARKER);
            HSEstate::HSESYieldLiteral
        } else {
            self.add_tag_bit(output_info, HEATSHRINK_BACKREF_MARKER);
            self.outgoing_bits = (self.match_pos - 1) as u16;
            self.outgoing_bits_count = self.window_bits;
            HSEstate::HSESYieldBrIndex
        }
    }

    fn st_yield_literal(&mut self, output_info: &mut OutputInfo) -> HSEstate {
        if output_info.can_take_byte() {
            self.push_literal_byte(output_info);
            HSEstate::HSESSearch
        } else {
            HSEstate::HSESYieldLiteral
        }
    }

    fn st_yield_br_index(&mut self, output_info: &mut OutputInfo) -> HSEstate {
        if !output_info.can_take_byte() {
            return HSEstate::HSESYieldBrIndex;
        }
        if self.push_outgoing_bits(output_info) > 0 {
            HSEstate::HSESYieldBrIndex
        } else {
            self.outgoing_bits = (self.match_length - 1) as u16;
            self.outgoing_bits_count = self.lookahead_bits;
            HSEstate::HSESYieldBrLength
        }
    }

    fn st_yield_br_length(&mut self, output_info: &mut OutputInfo) -> HSEstate {
        if !output_info.can_take_byte() {
            return HSEstate::HSESYieldBrLength;
        }
        if self.push_outgoing_bits(output_info) > 0 {
            HSEstate::HSESYieldBrLength
        } else {
            self.match_scan_index += self.match_length;
            self.match_length = 0;
            HSEstate::HSESSearch
        }
    }

    fn st_save_backlog(&mut self) -> HSEstate {
        self.save_backlog();
        HSEstate::HSESNotFull
    }

    fn st_flush_bit_buffer(&self, output_info: &mut OutputInfo) -> HSEstate {
        if self.bit_index == 0x80 {
            HSEstate::HSESDone
        } else if output_info.can_take_byte() {
            output_info.push_byte(self.current_byte);
            HSEstate::HSESDone
        } else {
            HSEstate::HSESFlushBits
        }
    }

    fn add_tag_bit(&mut self, output_info: &mut OutputInfo, tag: u8) {
        self.push_bits(1, tag, output_info);
    }

    fn get_input_offset(&self) -> usize {
        self.input_buffer_size
    }

    fn is_finishing(&self) -> bool {
        self.flags & FLAG_IS_FINISHING == FLAG_IS_FINISHING
    }

    /// Build the inverted per-byte linked list used to accelerate
    /// [`Self::find_longest_match`]. For each byte value, `last[v]` tracks
    /// the most recent position seen so far; `search_index[i]` becomes the
    /// previous position sharing `buffer[i]`'s value, or `-1`.
    #[cfg(feature = "heatshrink-use-index")]
    fn do_indexing(&mut self) {
        let mut last: [i32; 256] = [INDEX_END_OF_LIST; 256];
        let end = self.get_input_offset() + self.input_size;

        for i in 0..end {
            let v = self.buffer[i] as usize;
            self.search_index[i] = last[v];
            last[v] = i as i32;
        }
    }

    #[cfg(not(feature = "heatshrink-use-index"))]
    fn do_indexing(&mut self) {}

    fn break_even_point(&self) -> usize {
        (1 + self.window_bits as usize + self.lookahead_bits as usize) / 8
    }

    #[cfg(not(feature = "heatshrink-use-index"))]
    fn find_longest_match(
        &self,
        start: usize,
        end: usize,
        maxlen: usize,
    ) -> Option<(usize, usize)> {
        let mut match_maxlen = 0;
        let mut match_index = MATCH_NOT_FOUND;

        let mut pos = end - 1;
        loop {
            if self.buffer[pos + match_maxlen] == self.buffer[end + match_maxlen]
                && self.buffer[pos] == self.buffer[end]
            {
                let mut len = 1;
                while len < maxlen {
                    if self.buffer[pos + len] != self.buffer[end + len] {
                        break;
                    }
                    len += 1;
                }
                if len > match_maxlen {
                    match_maxlen = len;
                    match_index = pos;
                    if len == maxlen {
                        break;
                    }
                }
            }

            if pos == start {
                break;
            }
            pos -= 1;
        }

        if match_maxlen > self.break_even_point() {
            Some((end - match_index, match_maxlen))
        } else {
            None
        }
    }

    #[cfg(feature = "heatshrink-use-index")]
    fn find_longest_match(
        &self,
        start: usize,
        end: usize,
        maxlen: usize,
    ) -> Option<(usize, usize)> {
        let mut match_maxlen = 0;
        let mut match_index = MATCH_NOT_FOUND;

        let mut pos = self.search_index[end];
        while pos >= start as i32 {
            let posidx = pos as usize;

            if self.buffer[posidx + match_maxlen] != self.buffer[end + match_maxlen] {
                pos = self.search_index[posidx];
                continue;
            }

            let mut len = 1;
            while len < maxlen {
                if self.buffer[posidx + len] != self.buffer[end + len] {
                    break;
                }
                len += 1;
            }

            if len > match_maxlen {
                match_maxlen = len;
                match_index = posidx;
                if len == maxlen {
                    break;
                }
            }
            pos = self.search_index[posidx];
        }

        if match_maxlen > self.break_even_point() {
            Some((end - match_index, match_maxlen))
        } else {
            None
        }
    }

    fn push_outgoing_bits(&mut self, output_info: &mut OutputInfo) -> u8 {
        let count;
        let bits;

        if self.outgoing_bits_count > 8 {
            count = 8;
            bits = (self.outgoing_bits >> (self.outgoing_bits_count - 8)) as u8;
        } else {
            count = self.outgoing_bits_count;
            bits = self.outgoing_bits as u8;
        }

        if count > 0 {
            self.push_bits(count, bits, output_info);
            self.outgoing_bits_count -= count;
        }

        count
    }

    fn push_bits(&mut self, count: u8, bits: u8, output_info: &mut OutputInfo) {
        if count == 8 && self.bit_index == 0x80 {
            output_info.push_byte(bits);
        } else {
            for i in (0..count).rev() {
                if (bits & (1 << i)) != 0 {
                    self.current_byte |= self.bit_index;
                }
                self.bit_index >>= 1;
                if self.bit_index == 0 {
                    self.bit_index = 0x80;
                    output_info.push_byte(self.current_byte);
                    self.current_byte = 0;
                }
            }
        }
    }

    fn push_literal_byte(&mut self, output_info: &mut OutputInfo) {
        let input_offset = self.match_scan_index - 1;
        let c = self.buffer[self.get_input_offset() + input_offset];
        self.push_bits(8, c, output_info);
    }

    fn save_backlog(&mut self) {
        // Copy processed data to the beginning of the buffer so it can be
        // used for future matches. No need to check whether the input is
        // less than the maximum size: if it isn't, we're done anyway.
        let remaining_size = self.input_buffer_size - self.match_scan_index;
        let shift_size = self.input_buffer_size + remaining_size;
        self.buffer
            .copy_within(self.match_scan_index..self.match_scan_index + shift_size, 0);
        self.match_scan_index = 0;
        self.input_size -= self.input_buffer_size - remaining_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_params() {
        assert!(HeatshrinkEncoder::new(3, 3).is_none());
        assert!(HeatshrinkEncoder::new(16, 4).is_none());
        assert!(HeatshrinkEncoder::new(8, 8).is_none());
        assert!(HeatshrinkEncoder::new(8, 2).is_none());
        assert!(HeatshrinkEncoder::new(4, 3).is_some());
        assert!(HeatshrinkEncoder::new(15, 14).is_some());
    }

    #[test]
    fn single_byte_literal() {
        let mut enc = HeatshrinkEncoder::new(8, 4).unwrap();
        let mut sunk = 0;
        assert_eq!(enc.sink(b"A", &mut sunk), HSsinkRes::SinkOK);
        assert_eq!(sunk, 1);
        assert_eq!(enc.finish(), HSfinishRes::FinishMore);

        let mut out = [0u8; 8];
        let mut written = 0;
        assert_eq!(enc.poll(&mut out, &mut written), HSpollRes::PollEmpty);
        // tag bit 1, then 0x41 = 01000001, then zero padding: 1 0100 0001 0000000
        assert_eq!(&out[..written], &[0xA0, 0x80]);
    }

    #[test]
    fn sink_full_then_full_again() {
        let mut enc = HeatshrinkEncoder::new(4, 3).unwrap();
        let data = vec![0u8; 64];
        let mut sunk = 0;
        let res = enc.sink(&data, &mut sunk);
        assert_eq!(res, HSsinkRes::SinkOK);
        assert!(sunk < data.len());

        let mut sunk2 = 123;
        let res2 = enc.sink(&data[sunk..], &mut sunk2);
        assert_eq!(res2, HSsinkRes::SinkFull);
        assert_eq!(sunk2, 0);
    }
}
