//! XTS-AES (IEEE 1619, NIST SP 800-38E).

use super::{check_buffers, AesContext, Direction, Error, BLOCK_SIZE};
use crate::crypto::{Crypto, Registers};
use crate::fmt::Bytes;

/// Largest data unit XTS may process: 2^20 blocks.
pub const MAX_DATA_UNIT_LEN: usize = (1 << 20) * BLOCK_SIZE;

/// Multiplies a tweak by `x` in GF(2^128), with the tweak stored
/// little-endian as IEEE 1619 lays it out.
pub fn gf128mul_x_ble(tweak: &mut [u8; BLOCK_SIZE]) {
    let t = u128::from_le_bytes(*tweak);
    let reduce = 0u128.wrapping_sub(t >> 127) & 0x87;
    *tweak = ((t << 1) ^ reduce).to_le_bytes();
}

/// The data unit identifier of a disk sector: its number, little-endian.
pub fn data_unit_from_sector(sector: u64) -> [u8; BLOCK_SIZE] {
    u128::from(sector).to_le_bytes()
}

fn xor_block(block: &mut [u8; BLOCK_SIZE], mask: &[u8; BLOCK_SIZE]) {
    for (b, m) in block.iter_mut().zip(mask) {
        *b ^= m;
    }
}

/// Key pair of an XTS-AES-128 or XTS-AES-256 cipher.
#[derive(Debug, Default, Clone)]
pub struct XtsContext {
    crypt: AesContext,
    tweak: AesContext,
}

impl XtsContext {
    /// Creates a context with no keys set.
    pub const fn new() -> Self {
        Self {
            crypt: AesContext::new(),
            tweak: AesContext::new(),
        }
    }

    /// Splits a 256 or 512 bit key into the data key and the tweak key.
    fn split_key(&mut self, key: &[u8], key_bits: u32) -> Result<(usize, u32), Error> {
        self.crypt.clear();
        self.tweak.clear();
        if key_bits != 256 && key_bits != 512 {
            return Err(Error::InvalidKeyLength);
        }
        if key.len() * 8 != key_bits as usize {
            return Err(Error::InvalidArgument);
        }
        Ok((key.len() / 2, key_bits / 2))
    }

    /// Sets a 256 or 512 bit key for encryption: the first half keys the
    /// data, the second half the tweak.
    pub fn setkey_enc(&mut self, key: &[u8], key_bits: u32) -> Result<(), Error> {
        let (half, bits) = self.split_key(key, key_bits)?;
        let (key1, key2) = key.split_at(half);
        self.crypt.setkey_enc(key1, bits)?;
        self.tweak.setkey_enc(key2, bits)
    }

    /// Sets a 256 or 512 bit key for decryption. Only the data half is
    /// turned into a decryption key; tweaks are always encrypted.
    pub fn setkey_dec<R: Registers>(
        &mut self,
        crypto: &Crypto<R>,
        key: &[u8],
        key_bits: u32,
    ) -> Result<(), Error> {
        let (half, bits) = self.split_key(key, key_bits)?;
        let (key1, key2) = key.split_at(half);
        self.crypt.setkey_dec(crypto, key1, bits)?;
        self.tweak.setkey_enc(key2, bits)
    }

    fn crypt_block<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        direction: Direction,
        tweak: &[u8; BLOCK_SIZE],
        block: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), Error> {
        xor_block(block, tweak);
        let mut out = [0; BLOCK_SIZE];
        self.crypt.crypt_ecb(crypto, direction, block, &mut out)?;
        xor_block(&mut out, tweak);
        *block = out;
        Ok(())
    }

    /// Encrypts or decrypts one data unit of 16 bytes up to
    /// [`MAX_DATA_UNIT_LEN`]. A trailing partial block is handled with
    /// ciphertext stealing, so the output is exactly as long as the input.
    pub fn crypt_xts<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        direction: Direction,
        data_unit: &[u8; BLOCK_SIZE],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), Error> {
        check_buffers(input, output)?;
        if input.len() < BLOCK_SIZE || input.len() > MAX_DATA_UNIT_LEN {
            return Err(Error::InvalidInputLength);
        }
        self.crypt.key()?;
        self.tweak.key()?;
        trace!("XTS data unit {}", Bytes(data_unit));

        let leftover = input.len() % BLOCK_SIZE;
        let aligned = input.len() - leftover;
        let blocks = aligned / BLOCK_SIZE;

        let mut tweak = self.tweak.encrypt_block(crypto, data_unit)?;
        let mut prev_tweak = tweak;

        let (body_in, tail_in) = input.split_at(aligned);
        let (body_out, tail_out) = output.split_at_mut(aligned);
        let pairs = body_in
            .chunks_exact(BLOCK_SIZE)
            .zip(body_out.chunks_exact_mut(BLOCK_SIZE));
        for (i, (src, dst)) in pairs.enumerate() {
            if leftover != 0 && direction == Direction::Decrypt && i + 1 == blocks {
                // The last whole block was encrypted with the tweak after
                // the one that covers the stolen tail.
                prev_tweak = tweak;
                gf128mul_x_ble(&mut tweak);
            }
            let mut tmp = [0; BLOCK_SIZE];
            tmp.copy_from_slice(src);
            self.crypt_block(crypto, direction, &tweak, &mut tmp)?;
            dst.copy_from_slice(&tmp);
            gf128mul_x_ble(&mut tweak);
        }

        if leftover != 0 {
            let t = match direction {
                Direction::Encrypt => tweak,
                Direction::Decrypt => prev_tweak,
            };
            let prev_out = &mut body_out[aligned - BLOCK_SIZE..];

            let mut tmp = [0; BLOCK_SIZE];
            tmp[..leftover].copy_from_slice(tail_in);
            tmp[leftover..].copy_from_slice(&prev_out[leftover..]);
            tail_out.copy_from_slice(&prev_out[..leftover]);

            self.crypt_block(crypto, direction, &t, &mut tmp)?;
            prev_out.copy_from_slice(&tmp);
        }
        Ok(())
    }
}
