//! Cipher block chaining.

use super::{block, check_buffers, AesContext, Direction, Error, BLOCK_SIZE};
use crate::crypto::{Crypto, Ctrl, DataReg, Instr, Registers};

/// Decryption: DATA2 carries the previous ciphertext block, DATA1 parks the
/// current one while DATA0 is decrypted.
const DECRYPT_BLOCK: [Instr; 4] = [
    Instr::Data0ToData1,
    Instr::AesDec,
    Instr::Data2ToData0Xor,
    Instr::Data1ToData2,
];

impl AesContext {
    /// CBC over a whole number of blocks.
    ///
    /// `iv` is updated to the last ciphertext block, so consecutive calls
    /// continue one chain.
    pub fn crypt_cbc<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        direction: Direction,
        iv: &mut [u8; BLOCK_SIZE],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), Error> {
        check_buffers(input, output)?;
        if input.len() % BLOCK_SIZE != 0 {
            return Err(Error::InvalidInputLength);
        }
        let key = self.key()?;
        if input.is_empty() {
            return Ok(());
        }

        let blocks = input
            .chunks_exact(BLOCK_SIZE)
            .zip(output.chunks_exact_mut(BLOCK_SIZE));

        let start = *iv;
        let mut hw = crypto.acquire()?;
        match direction {
            Direction::Encrypt => {
                hw.with_regs(|regs| {
                    regs.write_ctrl(Ctrl::default());
                    regs.write_key_buf(key);
                    regs.write_data(DataReg::Data0, &start);
                });

                let mut last = start;
                for (plain, cipher) in blocks {
                    let plain = block(plain)?;
                    hw.with_regs(|regs| regs.write_data(DataReg::Data0Xor, plain));
                    hw.execute(Instr::AesEnc)?;
                    last = hw.with_regs(|regs| regs.read_data(DataReg::Data0));
                    cipher.copy_from_slice(&last);
                }
                *iv = last;
            }
            Direction::Decrypt => {
                hw.with_regs(|regs| {
                    regs.write_ctrl(Ctrl::default());
                    regs.write_key_buf(key);
                    regs.write_data(DataReg::Data2, &start);
                });

                for (cipher, plain) in blocks {
                    let cipher = block(cipher)?;
                    hw.with_regs(|regs| regs.write_data(DataReg::Data0, cipher));
                    hw.execute_sequence(&DECRYPT_BLOCK)?;
                    plain.copy_from_slice(&hw.with_regs(|regs| regs.read_data(DataReg::Data0)));
                }
                *iv = hw.with_regs(|regs| regs.read_data(DataReg::Data2));
            }
        }
        Ok(())
    }
}
