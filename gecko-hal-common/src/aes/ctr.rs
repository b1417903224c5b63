//! Counter mode.

use super::{block, check_buffers, AesContext, Error, BLOCK_SIZE};
use crate::crypto::{Crypto, Ctrl, DataReg, IncWidth, Instr, Registers};

/// Produces the next keystream block in DATA0 and steps the counter in DATA1.
const NEXT_KEYSTREAM: [Instr; 3] = [Instr::Data1ToData0, Instr::AesEnc, Instr::Data1Inc];

/// Counter block, unused keystream and read position of a CTR stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterState {
    nonce_counter: [u8; BLOCK_SIZE],
    stream_block: [u8; BLOCK_SIZE],
    offset: usize,
}

impl CounterState {
    /// Starts a stream whose first keystream block encrypts `nonce_counter`.
    pub const fn new(nonce_counter: [u8; BLOCK_SIZE]) -> Self {
        Self {
            nonce_counter,
            stream_block: [0; BLOCK_SIZE],
            offset: 0,
        }
    }

    /// Resumes a stream that has used `offset` bytes of `stream_block`.
    pub fn with_offset(
        nonce_counter: [u8; BLOCK_SIZE],
        stream_block: [u8; BLOCK_SIZE],
        offset: usize,
    ) -> Result<Self, Error> {
        if offset >= BLOCK_SIZE {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            nonce_counter,
            stream_block,
            offset,
        })
    }

    /// The counter block that produces the next keystream block.
    pub fn nonce_counter(&self) -> &[u8; BLOCK_SIZE] {
        &self.nonce_counter
    }

    /// The keystream block the next `16 - offset` bytes are taken from.
    pub fn stream_block(&self) -> &[u8; BLOCK_SIZE] {
        &self.stream_block
    }

    /// Bytes of [`stream_block`](Self::stream_block) already used, in `0..16`.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl AesContext {
    /// CTR over any number of bytes. Encryption and decryption are the same
    /// operation.
    ///
    /// The whole 128-bit counter block is incremented big-endian by the
    /// accelerator and wraps from all ones to zero.
    pub fn crypt_ctr<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        state: &mut CounterState,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), Error> {
        check_buffers(input, output)?;
        let key = self.key()?;

        let mut counter = state.nonce_counter;
        let mut stream = state.stream_block;
        let mut n = state.offset;
        let mut processed = 0;

        while n != 0 && processed < input.len() {
            output[processed] = input[processed] ^ stream[n];
            n = (n + 1) % BLOCK_SIZE;
            processed += 1;
        }

        if processed < input.len() {
            let mut hw = crypto.acquire()?;
            hw.with_regs(|regs| {
                regs.write_ctrl(Ctrl {
                    inc_width: IncWidth::Width4,
                });
                regs.write_key_buf(key);
                regs.write_data(DataReg::Data1, &counter);
            });

            let whole = (input.len() - processed) / BLOCK_SIZE * BLOCK_SIZE;
            let blocks = input[processed..processed + whole]
                .chunks_exact(BLOCK_SIZE)
                .zip(output[processed..processed + whole].chunks_exact_mut(BLOCK_SIZE));
            for (src, dst) in blocks {
                let src = block(src)?;
                hw.execute_sequence(&NEXT_KEYSTREAM)?;
                let out = hw.with_regs(|regs| {
                    regs.write_data(DataReg::Data0Xor, src);
                    regs.read_data(DataReg::Data0)
                });
                dst.copy_from_slice(&out);
            }
            processed += whole;

            while processed < input.len() {
                if n == 0 {
                    hw.execute_sequence(&NEXT_KEYSTREAM)?;
                    stream = hw.with_regs(|regs| regs.read_data(DataReg::Data0));
                }
                output[processed] = input[processed] ^ stream[n];
                n = (n + 1) % BLOCK_SIZE;
                processed += 1;
            }

            counter = hw.with_regs(|regs| regs.read_data(DataReg::Data1));
        }

        state.nonce_counter = counter;
        state.stream_block = stream;
        state.offset = n;
        Ok(())
    }
}
