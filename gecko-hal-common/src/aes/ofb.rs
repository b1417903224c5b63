//! Output feedback.

use super::{check_buffers, AesContext, Error, FeedbackState, BLOCK_SIZE};
use crate::crypto::{Crypto, Registers};

impl AesContext {
    /// OFB over any number of bytes. Encryption and decryption are the same
    /// operation; the feedback register only ever holds keystream.
    pub fn crypt_ofb<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        state: &mut FeedbackState,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), Error> {
        check_buffers(input, output)?;
        self.key()?;

        let mut keystream = state.iv;
        let mut n = state.offset;
        for (src, dst) in input.iter().zip(output.iter_mut()) {
            if n == 0 {
                keystream = self.encrypt_block(crypto, &keystream)?;
            }
            *dst = src ^ keystream[n];
            n = (n + 1) % BLOCK_SIZE;
        }

        state.iv = keystream;
        state.offset = n;
        Ok(())
    }
}
