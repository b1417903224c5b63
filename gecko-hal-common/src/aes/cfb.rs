//! Cipher feedback, in its full-block (CFB-128) and byte (CFB-8) variants.

use super::{block, check_buffers, AesContext, Direction, Error, BLOCK_SIZE};
use crate::crypto::{Crypto, Ctrl, DataReg, Instr, Registers};

/// Feedback register and read position of a CFB-128 or OFB stream.
///
/// `offset` counts the bytes of the current feedback block already used.
/// It is always below [`BLOCK_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackState {
    pub(super) iv: [u8; BLOCK_SIZE],
    pub(super) offset: usize,
}

impl FeedbackState {
    /// Starts a new stream at the beginning of `iv`.
    pub const fn new(iv: [u8; BLOCK_SIZE]) -> Self {
        Self { iv, offset: 0 }
    }

    /// Resumes a stream that has already used `offset` bytes of `iv`.
    pub fn with_offset(iv: [u8; BLOCK_SIZE], offset: usize) -> Result<Self, Error> {
        if offset >= BLOCK_SIZE {
            return Err(Error::InvalidArgument);
        }
        Ok(Self { iv, offset })
    }

    /// The current feedback block.
    pub fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }

    /// Bytes of [`iv`](Self::iv) already used, in `0..16`.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// XORs one byte against the feedback register and feeds the ciphertext back.
fn feed(direction: Direction, feedback: &mut u8, input: u8) -> u8 {
    let output = input ^ *feedback;
    *feedback = match direction {
        Direction::Encrypt => output,
        Direction::Decrypt => input,
    };
    output
}

impl AesContext {
    /// CFB-128 over any number of bytes.
    ///
    /// Whole blocks are chained inside the accelerator without a round trip
    /// of the feedback register; bytes before the next block boundary and
    /// after the last whole block go through `state` one at a time. The
    /// context must hold an encryption key in both directions.
    pub fn crypt_cfb128<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        direction: Direction,
        state: &mut FeedbackState,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), Error> {
        check_buffers(input, output)?;
        let key = self.key()?;

        let mut iv = state.iv;
        let mut n = state.offset;
        let mut processed = 0;

        while n != 0 && processed < input.len() {
            output[processed] = feed(direction, &mut iv[n], input[processed]);
            n = (n + 1) % BLOCK_SIZE;
            processed += 1;
        }

        if processed < input.len() {
            let mut hw = crypto.acquire()?;
            hw.with_regs(|regs| {
                regs.write_ctrl(Ctrl::default());
                regs.write_key_buf(key);
                regs.write_data(DataReg::Data0, &iv);
            });

            let whole = (input.len() - processed) / BLOCK_SIZE * BLOCK_SIZE;
            let blocks = input[processed..processed + whole]
                .chunks_exact(BLOCK_SIZE)
                .zip(output[processed..processed + whole].chunks_exact_mut(BLOCK_SIZE));
            for (src, dst) in blocks {
                let src = block(src)?;
                hw.execute(Instr::AesEnc)?;
                match direction {
                    Direction::Encrypt => {
                        let out = hw.with_regs(|regs| {
                            regs.write_data(DataReg::Data0Xor, src);
                            regs.read_data(DataReg::Data0)
                        });
                        dst.copy_from_slice(&out);
                    }
                    Direction::Decrypt => {
                        hw.with_regs(|regs| regs.write_data(DataReg::Data1, src));
                        hw.execute(Instr::Data1ToData0Xor)?;
                        dst.copy_from_slice(&hw.with_regs(|regs| regs.read_data(DataReg::Data0)));
                        hw.execute(Instr::Data1ToData0)?;
                    }
                }
            }
            processed += whole;
            iv = hw.with_regs(|regs| regs.read_data(DataReg::Data0));

            while processed < input.len() {
                if n == 0 {
                    hw.execute(Instr::AesEnc)?;
                    iv = hw.with_regs(|regs| regs.read_data(DataReg::Data0));
                }
                output[processed] = feed(direction, &mut iv[n], input[processed]);
                n = (n + 1) % BLOCK_SIZE;
                processed += 1;
            }
        }

        state.iv = iv;
        state.offset = n;
        Ok(())
    }

    /// CFB-8: one block encryption per byte, the IV shifting left by one
    /// ciphertext byte each time.
    pub fn crypt_cfb8<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        direction: Direction,
        iv: &mut [u8; BLOCK_SIZE],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), Error> {
        check_buffers(input, output)?;
        self.key()?;

        let mut register = *iv;
        for (src, dst) in input.iter().zip(output.iter_mut()) {
            let mut keystream = self.encrypt_block(crypto, &register)?;
            *dst = feed(direction, &mut keystream[0], *src);
            register.copy_within(1.., 0);
            register[BLOCK_SIZE - 1] = keystream[0];
        }
        *iv = register;
        Ok(())
    }
}
