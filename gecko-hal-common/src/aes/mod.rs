//! AES block cipher modes on top of the CRYPTO accelerator.
//!
//! The accelerator computes single AES-128/256 blocks and moves data between
//! its registers; every chaining mode is driven from here, one instruction at
//! a time, while the core is held through a [`CryptoGuard`].
//!
//! Keys live in an [`AesContext`]. Per-stream state (IVs, counters, and the
//! offset into a partly consumed keystream block) is owned by the caller and
//! passed to each call, so a long message can be processed piecewise. On
//! error, stream state is left as it was before the call.
//!
//! AES-192 is not available on this hardware and is rejected with
//! [`Error::UnsupportedKeySize`].
//!
//! ```ignore
//! let crypto = Crypto::new(regs, Config::default());
//!
//! let mut ctx = AesContext::new();
//! ctx.setkey_enc(&key, 128)?;
//!
//! let mut state = CounterState::new(nonce);
//! ctx.crypt_ctr(&crypto, &mut state, &plaintext, &mut ciphertext)?;
//! ```
//!
//! [`CryptoGuard`]: crate::crypto::CryptoGuard

use core::fmt;
use core::sync::atomic::{compiler_fence, Ordering};

use crate::crypto::{self, Crypto, Ctrl, DataReg, Instr, Registers};

pub use crate::crypto::BLOCK_SIZE;

mod cbc;
mod cfb;
mod ctr;
mod ofb;
mod xts;

pub use self::cfb::FeedbackState;
pub use self::ctr::CounterState;
pub use self::xts::{data_unit_from_sector, gf128mul_x_ble, XtsContext, MAX_DATA_UNIT_LEN};

/// Whether a call encrypts or decrypts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn instr(self) -> Instr {
        match self {
            Direction::Encrypt => Instr::AesEnc,
            Direction::Decrypt => Instr::AesDec,
        }
    }
}

/// Accepts the integer direction flags of the C API: `1` encrypts, `0` decrypts.
impl TryFrom<i32> for Direction {
    type Error = Error;

    fn try_from(mode: i32) -> Result<Self, Self::Error> {
        match mode {
            1 => Ok(Direction::Encrypt),
            0 => Ok(Direction::Decrypt),
            _ => Err(Error::InvalidMode),
        }
    }
}

/// AES key sizes supported by the accelerator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeySize {
    Aes128,
    Aes256,
}

impl KeySize {
    /// Key length in bits.
    pub const fn bits(self) -> u32 {
        match self {
            KeySize::Aes128 => 128,
            KeySize::Aes256 => 256,
        }
    }

    /// Key length in bytes.
    pub const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }
}

impl TryFrom<u32> for KeySize {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            128 => Ok(KeySize::Aes128),
            256 => Ok(KeySize::Aes256),
            192 => Err(Error::UnsupportedKeySize),
            _ => Err(Error::InvalidKeyLength),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Input and output differ in length, a key buffer does not match its
    /// declared size, or a stream offset is out of range.
    InvalidArgument,
    /// The key size is not valid for the mode, or no key has been set.
    InvalidKeyLength,
    /// AES-192: a valid AES key size that the accelerator cannot run.
    UnsupportedKeySize,
    /// The input length violates the block alignment or size rules of the mode.
    InvalidInputLength,
    /// The direction flag is neither encrypt nor decrypt.
    InvalidMode,
    /// The accelerator did not finish an instruction in time.
    HardwareTimeout,
    /// The AES core stayed held by other code, e.g. the thread an interrupt
    /// handler preempted.
    HardwareBusy,
}

impl Error {
    /// The mbed TLS error code for this error.
    pub const fn code(self) -> i32 {
        match self {
            Error::InvalidKeyLength => -0x0020,
            Error::InvalidArgument | Error::InvalidMode => -0x0021,
            Error::InvalidInputLength => -0x0022,
            Error::HardwareTimeout | Error::HardwareBusy => -0x0070,
            Error::UnsupportedKeySize => -0x0072,
        }
    }
}

impl From<crypto::Error> for Error {
    fn from(error: crypto::Error) -> Self {
        match error {
            crypto::Error::Timeout => Error::HardwareTimeout,
            crypto::Error::Busy => Error::HardwareBusy,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidArgument => "invalid argument",
            Error::InvalidKeyLength => "invalid key length",
            Error::UnsupportedKeySize => "key size not supported by the accelerator",
            Error::InvalidInputLength => "invalid input length",
            Error::InvalidMode => "invalid cipher direction",
            Error::HardwareTimeout => "AES accelerator timed out",
            Error::HardwareBusy => "AES accelerator is in use",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// Key material for one AES key, in the form the accelerator consumes.
///
/// A context keyed with [`setkey_dec`](Self::setkey_dec) holds the
/// decryption key derived by the hardware, not the raw key, and can only be
/// used to decrypt. The key is wiped when the context is re-keyed or dropped.
#[derive(Clone)]
pub struct AesContext {
    key: [u8; 32],
    key_size: Option<KeySize>,
}

impl AesContext {
    /// Creates a context with no key set.
    pub const fn new() -> Self {
        Self {
            key: [0; 32],
            key_size: None,
        }
    }

    /// Size of the loaded key in bits, or 0 if no key is set.
    pub fn key_bits(&self) -> u32 {
        self.key_size.map_or(0, KeySize::bits)
    }

    fn key(&self) -> Result<&[u8], Error> {
        match self.key_size {
            Some(size) => Ok(&self.key[..size.bytes()]),
            None => Err(Error::InvalidKeyLength),
        }
    }

    fn clear(&mut self) {
        for byte in self.key.iter_mut() {
            // NOTE(unsafe) Plain store to a valid `u8`; volatile so the wipe
            // survives optimization.
            unsafe { core::ptr::write_volatile(byte, 0) };
        }
        compiler_fence(Ordering::SeqCst);
        self.key_size = None;
    }

    fn prepare_key(&mut self, key: &[u8], key_bits: u32) -> Result<KeySize, Error> {
        self.clear();
        let size = KeySize::try_from(key_bits)?;
        if key.len() != size.bytes() {
            return Err(Error::InvalidArgument);
        }
        Ok(size)
    }

    /// Sets the key for encryption, and for every mode that only runs the
    /// cipher forwards (CFB, OFB, CTR, and the XTS tweak).
    pub fn setkey_enc(&mut self, key: &[u8], key_bits: u32) -> Result<(), Error> {
        let size = self.prepare_key(key, key_bits)?;
        self.key[..size.bytes()].copy_from_slice(key);
        self.key_size = Some(size);
        Ok(())
    }

    /// Sets the key for decryption.
    ///
    /// The accelerator decrypts with the final round key(s) of the key
    /// expansion rather than the cipher key. These are obtained by running one
    /// encryption and reading the expanded key back from the KEY register.
    pub fn setkey_dec<R: Registers>(
        &mut self,
        crypto: &Crypto<R>,
        key: &[u8],
        key_bits: u32,
    ) -> Result<(), Error> {
        let size = self.prepare_key(key, key_bits)?;

        let mut hw = crypto.acquire()?;
        hw.with_regs(|regs| {
            regs.write_ctrl(Ctrl::default());
            regs.write_key_buf(key);
        });
        hw.execute(Instr::AesEnc)?;
        hw.with_regs(|regs| regs.read_key(&mut self.key[..size.bytes()]));
        drop(hw);

        self.key_size = Some(size);
        debug!("derived AES-{} decryption key", size.bits());
        Ok(())
    }

    /// Encrypts or decrypts a single block.
    pub fn crypt_ecb<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        direction: Direction,
        input: &[u8; BLOCK_SIZE],
        output: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), Error> {
        let key = self.key()?;

        let mut hw = crypto.acquire()?;
        hw.with_regs(|regs| {
            regs.write_ctrl(Ctrl::default());
            regs.write_key_buf(key);
            regs.write_data(DataReg::Data0, input);
        });
        hw.execute(direction.instr())?;
        *output = hw.with_regs(|regs| regs.read_data(DataReg::Data0));
        Ok(())
    }

    /// Encrypts one block with [`crypt_ecb`](Self::crypt_ecb).
    pub fn encrypt_block<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        input: &[u8; BLOCK_SIZE],
    ) -> Result<[u8; BLOCK_SIZE], Error> {
        let mut output = [0; BLOCK_SIZE];
        self.crypt_ecb(crypto, Direction::Encrypt, input, &mut output)?;
        Ok(output)
    }

    /// Decrypts one block with [`crypt_ecb`](Self::crypt_ecb). The context
    /// must have been keyed with [`setkey_dec`](Self::setkey_dec).
    pub fn decrypt_block<R: Registers>(
        &self,
        crypto: &Crypto<R>,
        input: &[u8; BLOCK_SIZE],
    ) -> Result<[u8; BLOCK_SIZE], Error> {
        let mut output = [0; BLOCK_SIZE];
        self.crypt_ecb(crypto, Direction::Decrypt, input, &mut output)?;
        Ok(output)
    }
}

impl Default for AesContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AesContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesContext")
            .field("key_bits", &self.key_bits())
            .finish_non_exhaustive()
    }
}

impl Drop for AesContext {
    fn drop(&mut self) {
        self.clear();
    }
}

fn check_buffers(input: &[u8], output: &[u8]) -> Result<(), Error> {
    if input.len() != output.len() {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

fn block(chunk: &[u8]) -> Result<&[u8; BLOCK_SIZE], Error> {
    chunk.try_into().map_err(|_| Error::InvalidInputLength)
}
