//! NekoPack XCode cipher (archive version 2)
//!
//! Version 2 archives replace the fixed word cipher with a tiny per-key block
//! cipher. The 32-bit entry key is decomposed into base-40 digits; the first
//! four digits select transform instructions (XOR, packed add or packed
//! subtract over 8, 16 or 32-bit lanes against one of six registers) and the
//! next six select lane rotations applied to the registers after every block.
//! The registers themselves come from a Mersenne Twister table seeded by the
//! archive's initial key.
//!
//! ```
//! use gamearc_crypto::xcode::NekoXCode;
//!
//! let xcode = NekoXCode::new(0x2378_F1A0);
//! let mut data = vec![0u8; 24];
//! xcode.decrypt(0x0101_0203, &mut data, 0, 24).expect("range is in bounds");
//! ```

use tracing::trace;

use crate::error::{CryptoResult, checked_range};

/// Block size of the XCode cipher
pub const BLOCK_SIZE: usize = 8;

/// Number of auxiliary 64-bit registers
pub const REGISTER_COUNT: usize = 6;

const TRANSFORM_COUNT: usize = 4;
const DIGIT_COUNT: usize = TRANSFORM_COUNT + REGISTER_COUNT;
const RADIX: u32 = 40;
const TABLE_LEN: usize = 0x269;

const DIGIT_MIX: [u32; RADIX as usize] = build_digit_mix();

const fn build_digit_mix() -> [u32; RADIX as usize] {
    let mut table = [0u32; RADIX as usize];
    let mut i = 0;
    while i < table.len() {
        table[i] = (i as u32 + 1)
            .wrapping_mul(0x9E37_79B9)
            .rotate_left(i as u32 % 32);
        i += 1;
    }
    table
}

/// Arithmetic applied by a transform instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneOp {
    /// Bitwise XOR
    Xor,
    /// Lane-wise wrapping addition
    Add,
    /// Lane-wise wrapping subtraction
    Sub,
}

/// Lane width of a transform instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Eight 8-bit lanes
    Byte,
    /// Four 16-bit lanes
    Word,
    /// Two 32-bit lanes
    Dword,
}

impl Lane {
    const fn high_bits(self) -> u64 {
        match self {
            Self::Byte => 0x8080_8080_8080_8080,
            Self::Word => 0x8000_8000_8000_8000,
            Self::Dword => 0x8000_0000_8000_0000,
        }
    }

    /// Lane-wise wrapping add
    #[must_use]
    pub const fn add(self, lhs: u64, rhs: u64) -> u64 {
        let high = self.high_bits();
        ((lhs & !high).wrapping_add(rhs & !high)) ^ ((lhs ^ rhs) & high)
    }

    /// Lane-wise wrapping subtract
    #[must_use]
    pub const fn sub(self, lhs: u64, rhs: u64) -> u64 {
        let high = self.high_bits();
        ((lhs | high).wrapping_sub(rhs & !high)) ^ ((lhs ^ !rhs) & high)
    }
}

/// One transform instruction of the per-key program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    /// Operation
    pub op: LaneOp,
    /// Lane width
    pub lane: Lane,
    /// Register operand
    pub register: usize,
}

impl Transform {
    fn from_digit(index: usize, digit: u8) -> Self {
        let op = match digit % 3 {
            0 => LaneOp::Xor,
            1 => LaneOp::Add,
            _ => LaneOp::Sub,
        };
        let lane = match (digit / 3) % 3 {
            0 => Lane::Byte,
            1 => Lane::Word,
            _ => Lane::Dword,
        };
        Self {
            op,
            lane,
            register: (digit as usize + index) % REGISTER_COUNT,
        }
    }

    /// Apply the decrypting direction of this instruction
    #[must_use]
    pub const fn apply(&self, value: u64, operand: u64) -> u64 {
        match self.op {
            LaneOp::Xor => value ^ operand,
            LaneOp::Add => self.lane.add(value, operand),
            LaneOp::Sub => self.lane.sub(value, operand),
        }
    }
}

/// Per-key instruction sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XCodeProgram {
    /// Transform instructions, executed in order for every block
    pub transforms: [Transform; TRANSFORM_COUNT],
    /// Left-rotation applied to each register after every block
    pub rotations: [u32; REGISTER_COUNT],
}

impl XCodeProgram {
    /// Build the program selected by `key`
    #[must_use]
    pub fn from_key(key: u32) -> Self {
        let digits = key_digits(key);
        let transforms = std::array::from_fn(|i| Transform::from_digit(i, digits[i]));
        let rotations =
            std::array::from_fn(|i| 16 * (1 + u32::from(digits[TRANSFORM_COUNT + i]) % 3));
        Self {
            transforms,
            rotations,
        }
    }

    fn shuffle(&self, registers: &mut [u64; REGISTER_COUNT]) {
        for (register, &rotation) in registers.iter_mut().zip(&self.rotations) {
            *register = register.rotate_left(rotation);
        }
    }
}

/// Decompose `key` into base-40 digits, remixing the quotient after each digit
fn key_digits(key: u32) -> [u8; DIGIT_COUNT] {
    let mut digits = [0u8; DIGIT_COUNT];
    let mut rest = key;
    for digit in &mut digits {
        let value = rest % RADIX;
        *digit = value as u8;
        rest = (rest / RADIX) ^ DIGIT_MIX[value as usize];
    }
    digits
}

/// NekoPack version 2 cipher
#[derive(Debug, Clone)]
pub struct NekoXCode {
    table: Vec<u32>,
}

impl NekoXCode {
    /// Build the register table from the archive's initial key
    #[must_use]
    pub fn new(init_key: u32) -> Self {
        let mut rng = Mt19937::new(init_key);
        let table = (0..TABLE_LEN).map(|_| rng.next_u32()).collect();
        Self { table }
    }

    /// Registers for one decrypt call
    #[must_use]
    pub fn registers(&self, key: u32) -> [u64; REGISTER_COUNT] {
        let base = key as usize % TABLE_LEN;
        std::array::from_fn(|i| {
            let hi = self.table[(base + 2 * i) % TABLE_LEN];
            let lo = self.table[(base + 2 * i + 1) % TABLE_LEN];
            ((u64::from(hi) << 32) | u64::from(lo)) ^ u64::from(key)
        })
    }

    /// Decrypt `buffer[offset..offset + length]` in place with entry key `key`
    ///
    /// `length` is rounded down to a multiple of [`BLOCK_SIZE`].
    pub fn decrypt(
        &self,
        key: u32,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> CryptoResult<()> {
        let range = checked_range(buffer.len(), offset, length)?;
        let program = XCodeProgram::from_key(key);
        let mut registers = self.registers(key);
        trace!(key, ?program, "xcode program");

        for block in buffer[range].chunks_exact_mut(BLOCK_SIZE) {
            let mut word = [0u8; BLOCK_SIZE];
            word.copy_from_slice(block);
            let mut value = u64::from_le_bytes(word);
            for transform in &program.transforms {
                value = transform.apply(value, registers[transform.register]);
            }
            block.copy_from_slice(&value.to_le_bytes());
            program.shuffle(&mut registers);
        }
        Ok(())
    }
}

/// MT19937 generator used to fill the register table
#[derive(Debug, Clone)]
pub(crate) struct Mt19937 {
    state: [u32; 624],
    index: usize,
}

impl Mt19937 {
    const N: usize = 624;
    const M: usize = 397;

    pub(crate) fn new(seed: u32) -> Self {
        let mut state = [0u32; Self::N];
        state[0] = seed;
        for i in 1..Self::N {
            let prev = state[i - 1];
            state[i] = 1_812_433_253u32
                .wrapping_mul(prev ^ (prev >> 30))
                .wrapping_add(i as u32);
        }
        Self {
            state,
            index: Self::N,
        }
    }

    fn twist(&mut self) {
        for i in 0..Self::N {
            let y = (self.state[i] & 0x8000_0000) | (self.state[(i + 1) % Self::N] & 0x7FFF_FFFF);
            let mut next = self.state[(i + Self::M) % Self::N] ^ (y >> 1);
            if y & 1 != 0 {
                next ^= 0x9908_B0DF;
            }
            self.state[i] = next;
        }
        self.index = 0;
    }

    pub(crate) fn next_u32(&mut self) -> u32 {
        if self.index >= Self::N {
            self.twist();
        }
        let mut y = self.state[self.index];
        self.index += 1;
        y ^= y >> 11;
        y ^= (y << 7) & 0x9D2C_5680;
        y ^= (y << 15) & 0xEFC6_0000;
        y ^ (y >> 18)
    }
}
