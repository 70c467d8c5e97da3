use crate::MTU_SIZE_BITS;

const INITIAL_CAPACITY_BYTES: usize = 32;

/// Anything that bits can be pushed into: a real packet buffer, or a counter
/// used to measure how large a value would be before committing it.
pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
    fn count_bits(&mut self, bits: u32);
    fn is_counter(&self) -> bool;

    /// Writes the low `bits` bits of `value`, least significant first.
    fn write_bits(&mut self, value: u64, bits: u8) {
        let mut value = value;
        for _ in 0..bits {
            self.write_bit(value & 1 != 0);
            value >>= 1;
        }
    }
}

// BitWriter

/// Packet buffer with a soft size budget.
///
/// The buffer itself grows without limit (starting small and doubling on
/// overflow), while `max_bits` describes how many bits the packet is allowed
/// to carry. Writers check the budget with [`BitWriter::counter`] before
/// committing a value, and use [`BitWriter::reserve_bits`] to keep room for
/// the terminating flags of each block.
pub struct BitWriter {
    buffer: Vec<u8>,
    current_bits: u32,
    max_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_max_bits(MTU_SIZE_BITS)
    }

    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self::with_max_bits((max_bytes as u32) * 8)
    }

    pub fn with_max_bits(max_bits: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_CAPACITY_BYTES),
            current_bits: 0,
            max_bits,
        }
    }

    /// Returns a counter positioned at this writer's current length and
    /// sharing its budget.
    pub fn counter(&self) -> BitCounter {
        BitCounter::new(self.current_bits, self.max_bits)
    }

    pub fn reserve_bits(&mut self, bits: u32) {
        self.max_bits = self.max_bits.saturating_sub(bits);
    }

    pub fn release_bits(&mut self, bits: u32) {
        self.max_bits += bits;
    }

    pub fn bits_written(&self) -> u32 {
        self.current_bits
    }

    pub fn bits_free(&self) -> u32 {
        self.max_bits.saturating_sub(self.current_bits)
    }

    pub fn overflowed(&self) -> bool {
        self.current_bits > self.max_bits
    }

    pub fn byte_count(&self) -> usize {
        self.current_bits.div_ceil(8) as usize
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn grow(&mut self) {
        if self.buffer.len() == self.buffer.capacity() {
            let additional = self.buffer.capacity().max(INITIAL_CAPACITY_BYTES);
            self.buffer.reserve_exact(additional);
        }
        self.buffer.push(0);
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        let byte_index = (self.current_bits / 8) as usize;
        if byte_index == self.buffer.len() {
            self.grow();
        }
        if bit {
            self.buffer[byte_index] |= 1 << (self.current_bits % 8);
        }
        self.current_bits += 1;
    }

    fn write_byte(&mut self, byte: u8) {
        self.write_bits(byte as u64, 8);
    }

    fn count_bits(&mut self, _: u32) {
        panic!("BitWriter can't count bits, use a BitCounter instead");
    }

    fn is_counter(&self) -> bool {
        false
    }
}

// BitCounter

/// Measures the size of values without writing them.
pub struct BitCounter {
    start_bits: u32,
    current_bits: u32,
    max_bits: u32,
}

impl BitCounter {
    pub fn new(start_bits: u32, max_bits: u32) -> Self {
        Self {
            start_bits,
            current_bits: start_bits,
            max_bits,
        }
    }

    pub fn overflowed(&self) -> bool {
        self.current_bits > self.max_bits
    }

    pub fn bits_needed(&self) -> u32 {
        self.current_bits - self.start_bits
    }
}

impl BitWrite for BitCounter {
    fn write_bit(&mut self, _: bool) {
        self.current_bits += 1;
    }

    fn write_byte(&mut self, _: u8) {
        self.current_bits += 8;
    }

    fn write_bits(&mut self, _: u64, bits: u8) {
        self.current_bits += bits as u32;
    }

    fn count_bits(&mut self, bits: u32) {
        self.current_bits += bits;
    }

    fn is_counter(&self) -> bool {
        true
    }
}
