//! Driver for the AES accelerator (CRYPTO) of Silicon Labs Series-1 Gecko
//! devices, and the AES block cipher modes built on it.
//!
//! - [`crypto`] owns the register block and hands out exclusive access to
//!   the single AES core.
//! - [`aes`] implements ECB, CBC, CFB-128, CFB-8, OFB, CTR and XTS on top of
//!   it.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod aes;
pub mod crypto;

#[cfg(target_arch = "arm")]
use cortex_m as _;

pub use crate::aes::{AesContext, Direction, XtsContext};
pub use crate::crypto::{Config, Crypto};
