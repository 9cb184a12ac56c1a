use crate::common::{
    unlikely, OutputInfo, FLAG_IS_FINISHING, HEATSHRINK_BACKREF_MARKER, HEATSHRINK_LITERAL_MARKER,
};
use crate::{params_are_valid, HSfinishRes, HSpollRes, HSsinkRes};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum HSEstate {
    HSESNotFull,
    HSESFilled,
    HSESSearch,
    HSESYieldTagBit,
    HSESYieldLiteral,
    HSESYieldBrIndex,
    HSESYieldBrLength,
    HSESSaveBacklog,
    HSESFlushBits,
    HSESDone,
}

const MATCH_NOT_FOUND: usize = usize::MAX;

/// A no-heap encoder whose buffers are sized at compile time.
///
/// `WINDOW` and `LOOKAHEAD` are the codec parameters in bits; `WINDOW_BUF_SIZE`
/// must be `2 * (1 << WINDOW)` (stable Rust cannot compute an array length
/// from another const generic, so the caller names it explicitly — the same
/// workaround used for const-generic ring buffers elsewhere in the
/// ecosystem). [`StaticHeatshrinkEncoder::new`] checks this relationship at
/// construction time and returns `None` if it is wrong.
///
/// Unlike [`crate::encoder::HeatshrinkEncoder`], this variant always uses a
/// plain backward scan to find matches rather than an inverted search index,
/// trading a little throughput for a fixed, minimal memory footprint — the
/// point of choosing the static allocation mode in the first place.
#[derive(Debug)]
pub struct StaticHeatshrinkEncoder<const WINDOW: u8, const WINDOW_BUF_SIZE: usize, const LOOKAHEAD: u8> {
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
    buffer: [u8; WINDOW_BUF_SIZE],
}

impl<const WINDOW: u8, const WINDOW_BUF_SIZE: usize, const LOOKAHEAD: u8>
    StaticHeatshrinkEncoder<WINDOW, WINDOW_BUF_SIZE, LOOKAHEAD>
{
    const INPUT_BUFFER_SIZE: usize = 1 << WINDOW;

    /// Build a new encoder. Returns `None` if `(WINDOW, LOOKAHEAD)` is out of
    /// range or `WINDOW_BUF_SIZE != 2 * (1 << WINDOW)`.
    pub fn new() -> Option<Self> {
        if !params_are_valid(WINDOW, LOOKAHEAD) || WINDOW_BUF_SIZE != 2 * Self::INPUT_BUFFER_SIZE {
            return None;
        }

        Some(StaticHeatshrinkEncoder {
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
            buffer: [0; WINDOW_BUF_SIZE],
        })
    }

    /// Reset the encoder to its initial state.
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
    }

    /// Window size in bits.
    pub fn window_bits(&self) -> u8 {
        WINDOW
    }

    /// Lookahead size in bits.
    pub fn lookahead_bits(&self) -> u8 {
        LOOKAHEAD
    }

    /// Add an input buffer to be processed/compressed.
    pub fn sink(&mut self, input_buffer: &[u8], input_size: &mut usize) -> HSsinkRes {
        if unlikely(self.is_finishing() || self.state != HSEstate::HSESNotFull) {
            *input_size = 0;
            return HSsinkRes::SinkErrorMisuse;
        }

        let write_offset = Self::INPUT_BUFFER_SIZE + self.input_size;
        let remaining_size = Self::INPUT_BUFFER_SIZE - self.input_size;

        if remaining_size == 0 {
            *input_size = 0;
            return HSsinkRes::SinkFull;
        }

        let copy_size = remaining_size.min(input_buffer.len());

        self.buffer[write_offset..write_offset + copy_size]
            .copy_from_slice(&input_buffer[..copy_size]);
        self.input_size += copy_size;
        *input_size = copy_size;

        if self.input_size == Self::INPUT_BUFFER_SIZE {
            self.state = HSEstate::HSESFilled;
        }

        HSsinkRes::SinkOK
    }

    /// Process the input buffer, writing compressed bytes into
    /// `output_buffer`.
    pub fn poll(&mut self, output_buffer: &mut [u8], output_size: &mut usize) -> HSpollRes {
        *output_size = 0;

        if output_buffer.is_empty() {
            return HSpollRes::PollMore;
        }

        let mut output_info = OutputInfo::new(output_buffer, output_size);

        loop {
            let in_state = self.state;

            match in_state {
                HSEstate::HSESNotFull | HSEstate::HSESDone => return HSpollRes::PollEmpty,
                HSEstate::HSESFilled => self.state = HSEstate::HSESSearch,
                HSEstate::HSESSearch => self.state = self.st_step_search(),
                HSEstate::HSESYieldTagBit => self.state = self.st_yield_tag_bit(&mut output_info),
                HSEstate::HSESYieldLiteral => self.state = self.st_yield_literal(&mut output_info),
                HSEstate::HSESYieldBrIndex => self.state = self.st_yield_br_index(&mut output_info),
                HSEstate::HSESYieldBrLength => {
                    self.state = self.st_yield_br_length(&mut output_info)
                }
                HSEstate::HSESSaveBacklog => self.state = self.st_save_backlog(),
                HSEstate::HSESFlushBits => self.state = self.st_flush_bit_buffer(&mut output_info),
            }

            if self.state == in_state && !output_info.can_take_byte() {
                return HSpollRes::PollMore;
            }
        }
    }

    /// Mark the stream as finishing.
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
        let lookahead_size: usize = 1 << LOOKAHEAD;
        let lookahead = if self.is_finishing() { 1 } else { lookahead_size };

        if self.match_scan_index > self.input_size.saturating_sub(lookahead) {
            return if self.is_finishing() {
                HSEstate::HSESFlushBits
            } else {
                HSEstate::HSESSaveBacklog
            };
        }

        let end = Self::INPUT_BUFFER_SIZE + self.match_scan_index;
        let start = end - Self::INPUT_BUFFER_SIZE;
        let max_possible = lookahead_size.min(self.input_size - self.match_scan_index);

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
            self.push_bits(1, HEATSHRINK_LITERAL_MARKER, output_info);
            HSEstate::HSESYieldLiteral
        } else {
            self.push_bits(1, HEATSHRINK_BACKREF_MARKER, output_info);
            self.outgoing_bits = (self.match_pos - 1) as u16;
            self.outgoing_bits_count = WINDOW;
            HSEstate::HSESYieldBrIndex
        }
    }

    fn st_yield_literal(&mut self, output_info: &mut OutputInfo) -> HSEstate {
        if output_info.can_take_byte() {
            let input_offset = self.match_scan_index - 1;
            let c = self.buffer[Self::INPUT_BUFFER_SIZE + input_offset];
            self.push_bits(8, c, output_info);
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
            self.outgoing_bits_count = LOOKAHEAD;
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
        let remaining_size = Self::INPUT_BUFFER_SIZE - self.match_scan_index;
        let shift_size = Self::INPUT_BUFFER_SIZE + remaining_size;
        self.buffer
            .copy_within(self.match_scan_index..self.match_scan_index + shift_size, 0);
        self.match_scan_index = 0;
        self.input_size -= Self::INPUT_BUFFER_SIZE - remaining_size;
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

    fn is_finishing(&self) -> bool {
        self.flags & FLAG_IS_FINISHING == FLAG_IS_FINISHING
    }

    fn break_even_point(&self) -> usize {
        (1 + WINDOW as usize + LOOKAHEAD as usize) / 8
    }

    fn find_longest_match(&self, start: usize, end: usize, maxlen: usize) -> Option<(usize, usize)> {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer_size() {
        assert!(StaticHeatshrinkEncoder::<8, 511, 4>::new().is_none());
        assert!(StaticHeatshrinkEncoder::<8, 512, 4>::new().is_some());
    }

    #[test]
    fn single_byte_literal() {
        let mut enc = StaticHeatshrinkEncoder::<8, 512, 4>::new().unwrap();
        let mut sunk = 0;
        assert_eq!(enc.sink(b"A", &mut sunk), HSsinkRes::SinkOK);
        assert_eq!(enc.finish(), HSfinishRes::FinishMore);

        let mut out = [0u8; 8];
        let mut written = 0;
        assert_eq!(enc.poll(&mut out, &mut written), HSpollRes::PollEmpty);
        assert_eq!(&out[..written], &[0xA0, 0x80]);
    }
}
