//! HAL interface to the CRYPTO peripheral of Series-1 Gecko devices.
//!
//! The CRYPTO block contains a single AES core that is shared by everything
//! running on the chip, in thread and interrupt context alike. [`Crypto`] owns
//! the register block and arbitrates access to it: code that wants to program
//! the core first obtains a [`CryptoGuard`], and the core is released again
//! when that guard is dropped, on every exit path.
//!
//! The raw register accesses are abstracted by the [`Registers`] trait, which
//! a device crate implements on top of its PAC. The [`sim`] module provides a
//! software model of the block for host testing.

use core::cell::{Cell, UnsafeCell};
use core::fmt;

use critical_section::Mutex;
use void::Void;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

/// Size in bytes of an AES block and of each DATA register.
pub const BLOCK_SIZE: usize = 16;

/// The 128-bit data registers of the CRYPTO block used by the AES modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataReg {
    Data0,
    /// Write-only alias of DATA0. Written values are XORed into DATA0.
    Data0Xor,
    Data1,
    Data2,
}

/// Instructions understood by the CRYPTO sequencer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instr {
    /// Encrypt DATA0 in place with the key in KEYBUF.
    ///
    /// Afterwards the KEY register holds the matching decryption key.
    AesEnc,
    /// Decrypt DATA0 in place with the decryption key in KEYBUF.
    AesDec,
    Data0ToData1,
    Data1ToData0,
    Data1ToData0Xor,
    Data2ToData0Xor,
    Data1ToData2,
    /// Increment DATA1 by one, big-endian, over the width selected in CTRL.
    Data1Inc,
}

/// Width of the DATA1INC counter, counted in 32-bit words from the end of DATA1.
///
/// Only the reset width and the full 128-bit width are programmed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IncWidth {
    #[default]
    Width1 = 1,
    Width4 = 4,
}

impl IncWidth {
    /// Number of trailing DATA1 bytes taking part in the increment.
    pub const fn bytes(self) -> usize {
        self as usize * 4
    }
}

/// Value of the CTRL register.
///
/// The default is the reset value of the register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ctrl {
    pub inc_width: IncWidth,
}

/// Raw access to one CRYPTO register block.
///
/// There must be at most one implementor instance per physical CRYPTO block;
/// [`Crypto`] serializes all users of the core through it.
pub trait Registers {
    fn write_ctrl(&mut self, ctrl: Ctrl);

    /// Writes KEYBUF. The width of `key` selects AES-128 (16 bytes) or
    /// AES-256 (32 bytes).
    fn write_key_buf(&mut self, key: &[u8]);

    /// Reads the KEY register into `key`, which is 16 or 32 bytes long.
    fn read_key(&self, key: &mut [u8]);

    fn write_data(&mut self, reg: DataReg, block: &[u8; BLOCK_SIZE]);

    fn read_data(&self, reg: DataReg) -> [u8; BLOCK_SIZE];

    fn write_cmd(&mut self, instr: Instr);

    /// Whether the last issued instruction is still executing.
    fn instr_running(&self) -> bool;
}

/// Driver configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// How many times the busy flag is polled before an instruction is
    /// considered stuck and [`Error::Timeout`] is returned. The same bound
    /// applies to waiting for the core in [`Crypto::acquire`], which then
    /// fails with [`Error::Busy`].
    pub poll_limit: u32,
}

impl Config {
    /// The default configuration, usable in `const` contexts.
    pub const fn new() -> Self {
        Self {
            poll_limit: 100_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The busy flag was still set after [`Config::poll_limit`] polls.
    Timeout,
    /// The core stayed acquired by another user for [`Config::poll_limit`]
    /// attempts.
    Busy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => f.write_str("CRYPTO instruction timed out"),
            Error::Busy => f.write_str("CRYPTO core is held by another user"),
        }
    }
}

impl core::error::Error for Error {}

/// Owner of a CRYPTO register block and arbiter of the AES core.
///
/// `Crypto` is `Sync`, so a single instance can live in a `static` and be
/// used from both thread mode and interrupt handlers.
pub struct Crypto<R> {
    regs: UnsafeCell<R>,
    locked: Mutex<Cell<bool>>,
    config: Config,
}

// The registers are only reachable through a `CryptoGuard`, and the lock
// guarantees that at most one guard exists at any time.
unsafe impl<R: Send> Sync for Crypto<R> {}

impl<R> Crypto<R> {
    /// Takes ownership of the register block.
    pub const fn new(regs: R, config: Config) -> Self {
        Self {
            regs: UnsafeCell::new(regs),
            locked: Mutex::new(Cell::new(false)),
            config,
        }
    }

    /// Consumes `self` and returns back the raw register block.
    pub fn free(self) -> R {
        self.regs.into_inner()
    }

    /// The configuration passed to [`Crypto::new`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a [`CryptoGuard`] is currently alive.
    pub fn is_acquired(&self) -> bool {
        critical_section::with(|cs| self.locked.borrow(cs).get())
    }
}

impl<R: Registers> Crypto<R> {
    /// Tries to take exclusive ownership of the AES core without waiting.
    pub fn try_acquire(&self) -> nb::Result<CryptoGuard<'_, R>, Void> {
        let acquired = critical_section::with(|cs| {
            let locked = self.locked.borrow(cs);
            if locked.get() {
                false
            } else {
                locked.set(true);
                true
            }
        });

        if acquired {
            trace!("CRYPTO acquired");
            Ok(CryptoGuard { crypto: self })
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Takes exclusive ownership of the AES core, retrying up to
    /// [`Config::poll_limit`] times while someone else holds it.
    ///
    /// An interrupt handler that preempted the holder can never see the core
    /// released, so there the call fails with [`Error::Busy`] once the limit
    /// is reached.
    pub fn acquire(&self) -> Result<CryptoGuard<'_, R>, Error> {
        let limit = self.config.poll_limit;
        let mut polls = 0;
        loop {
            match self.try_acquire() {
                Ok(guard) => return Ok(guard),
                Err(nb::Error::Other(never)) => void::unreachable(never),
                Err(nb::Error::WouldBlock) if polls < limit => {
                    polls += 1;
                    core::hint::spin_loop();
                }
                Err(nb::Error::WouldBlock) => {
                    warn!("CRYPTO core still held after {} attempts", limit);
                    return Err(Error::Busy);
                }
            }
        }
    }
}

/// Exclusive ownership of the AES core. The core is released on drop.
pub struct CryptoGuard<'a, R> {
    crypto: &'a Crypto<R>,
}

impl<R: Registers> CryptoGuard<'_, R> {
    fn regs(&mut self) -> &mut R {
        // NOTE(unsafe) The guard is the only way to reach the registers and
        // only one guard exists at a time.
        unsafe { &mut *self.crypto.regs.get() }
    }

    /// Runs `f` on the registers with interrupts masked.
    ///
    /// Register programming sequences (key, data, readback) must not be torn
    /// by an interrupt handler touching the same peripheral.
    pub fn with_regs<T>(&mut self, f: impl FnOnce(&mut R) -> T) -> T {
        let regs = self.regs();
        critical_section::with(|_| f(regs))
    }

    /// Issues `instr` and waits for the sequencer to finish it.
    pub fn execute(&mut self, instr: Instr) -> Result<(), Error> {
        let limit = self.crypto.config.poll_limit;
        let regs = self.regs();
        regs.write_cmd(instr);

        let mut polls = 0;
        while regs.instr_running() {
            if polls == limit {
                warn!(
                    "CRYPTO instruction {:?} still running after {} polls",
                    instr,
                    limit
                );
                return Err(Error::Timeout);
            }
            polls += 1;
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Executes `sequence` in program order, stopping at the first failure.
    pub fn execute_sequence(&mut self, sequence: &[Instr]) -> Result<(), Error> {
        for &instr in sequence {
            self.execute(instr)?;
        }
        Ok(())
    }
}

impl<R> Drop for CryptoGuard<'_, R> {
    fn drop(&mut self) {
        critical_section::with(|cs| self.crypto.locked.borrow(cs).set(false));
        trace!("CRYPTO released");
    }
}

#[cfg(test)]
mod tests {
    use super::sim::SimCrypto;
    use super::*;

    #[test]
    fn second_acquire_would_block() {
        let crypto = Crypto::new(SimCrypto::new(), Config::default());

        let guard = crypto.acquire().unwrap();
        assert!(crypto.is_acquired());
        assert!(matches!(crypto.try_acquire(), Err(nb::Error::WouldBlock)));

        drop(guard);
        assert!(!crypto.is_acquired());
        assert!(crypto.try_acquire().is_ok());
    }

    #[test]
    fn acquire_gives_up_while_the_core_is_held() {
        let crypto = Crypto::new(SimCrypto::new(), Config { poll_limit: 10 });

        let guard = crypto.acquire().unwrap();
        assert!(matches!(crypto.acquire(), Err(Error::Busy)));
        assert!(crypto.is_acquired());

        drop(guard);
        assert!(crypto.acquire().is_ok());
    }

    #[test]
    fn execute_waits_for_slow_instructions() {
        let mut sim = SimCrypto::new();
        sim.stall(50);
        let crypto = Crypto::new(sim, Config { poll_limit: 100 });

        let mut hw = crypto.acquire().unwrap();
        assert_eq!(hw.execute(Instr::Data0ToData1), Ok(()));
    }

    #[test]
    fn execute_gives_up_after_poll_limit() {
        let mut sim = SimCrypto::new();
        sim.stall(101);
        let crypto = Crypto::new(sim, Config { poll_limit: 100 });

        let mut hw = crypto.acquire().unwrap();
        assert_eq!(hw.execute(Instr::Data0ToData1), Err(Error::Timeout));
        drop(hw);
        assert!(!crypto.is_acquired());
    }

    #[test]
    fn sequence_runs_in_order() {
        let crypto = Crypto::new(SimCrypto::new(), Config::default());
        let mut hw = crypto.acquire().unwrap();

        hw.with_regs(|regs| {
            regs.write_data(DataReg::Data0, &[1; BLOCK_SIZE]);
            regs.write_data(DataReg::Data2, &[2; BLOCK_SIZE]);
        });
        hw.execute_sequence(&[
            Instr::Data0ToData1,
            Instr::Data2ToData0Xor,
            Instr::Data1ToData2,
        ])
        .unwrap();

        hw.with_regs(|regs| {
            assert_eq!(regs.read_data(DataReg::Data0), [3; BLOCK_SIZE]);
            assert_eq!(regs.read_data(DataReg::Data1), [1; BLOCK_SIZE]);
            assert_eq!(regs.read_data(DataReg::Data2), [1; BLOCK_SIZE]);
        });
    }
}
