//! Software model of the CRYPTO register block.
//!
//! [`SimCrypto`] reproduces the parts of the peripheral that the drivers in
//! this crate observe:
//!
//! - KEYBUF is copied into KEY at the start of every AES instruction.
//! - After AESENC, KEY holds the decryption key, i.e. the tail of the key
//!   expansion. AESDEC expects that decryption key in KEYBUF and leaves the
//!   cipher key in KEY.
//! - DATA1INC increments DATA1 big-endian over the width selected in CTRL,
//!   wrapping silently.
//!
//! Instructions complete immediately unless [`SimCrypto::stall`] or
//! [`SimCrypto::hang`] says otherwise.

use core::cell::Cell;

use ::aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use ::aes::{Aes128, Aes256};

use super::{Ctrl, DataReg, Instr, Registers, BLOCK_SIZE};

#[derive(Debug, Clone)]
pub struct SimCrypto {
    ctrl: Ctrl,
    key_buf: [u8; 32],
    key: [u8; 32],
    key_len: usize,
    data: [[u8; BLOCK_SIZE]; 3],
    stall: u32,
    hung: bool,
    busy: Cell<u32>,
    aes_instructions: usize,
}

impl SimCrypto {
    /// A block in its reset state, with instructions completing immediately.
    pub fn new() -> Self {
        Self {
            ctrl: Ctrl::default(),
            key_buf: [0; 32],
            key: [0; 32],
            key_len: 16,
            data: [[0; BLOCK_SIZE]; 3],
            stall: 0,
            hung: false,
            busy: Cell::new(0),
            aes_instructions: 0,
        }
    }

    /// Keeps the busy flag set for `polls` polls after each instruction.
    pub fn stall(&mut self, polls: u32) {
        self.stall = polls;
    }

    /// Never clears the busy flag again.
    pub fn hang(&mut self) {
        self.hung = true;
    }

    /// Number of AESENC/AESDEC instructions executed so far.
    pub fn aes_instructions(&self) -> usize {
        self.aes_instructions
    }

    fn aes_enc(&mut self) {
        self.key = self.key_buf;
        let block = GenericArray::from_mut_slice(&mut self.data[0]);
        match self.key_len {
            16 => Aes128::new(GenericArray::from_slice(&self.key[..16])).encrypt_block(block),
            _ => Aes256::new(GenericArray::from_slice(&self.key)).encrypt_block(block),
        }
        key_schedule::forward(&mut self.key[..self.key_len]);
    }

    fn aes_dec(&mut self) {
        self.key = self.key_buf;
        key_schedule::backward(&mut self.key[..self.key_len]);
        let block = GenericArray::from_mut_slice(&mut self.data[0]);
        match self.key_len {
            16 => Aes128::new(GenericArray::from_slice(&self.key[..16])).decrypt_block(block),
            _ => Aes256::new(GenericArray::from_slice(&self.key)).decrypt_block(block),
        }
    }

    fn data1_inc(&mut self) {
        let width = self.ctrl.inc_width.bytes();
        for byte in self.data[1][BLOCK_SIZE - width..].iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }
}

impl Default for SimCrypto {
    fn default() -> Self {
        Self::new()
    }
}

fn xor_into(out: &mut [u8; BLOCK_SIZE], other: &[u8; BLOCK_SIZE]) {
    for (out, other) in out.iter_mut().zip(other) {
        *out ^= other;
    }
}

impl Registers for SimCrypto {
    fn write_ctrl(&mut self, ctrl: Ctrl) {
        self.ctrl = ctrl;
    }

    fn write_key_buf(&mut self, key: &[u8]) {
        assert!(
            key.len() == 16 || key.len() == 32,
            "KEYBUF is 128 or 256 bits wide"
        );
        self.key_buf = [0; 32];
        self.key_buf[..key.len()].copy_from_slice(key);
        self.key_len = key.len();
    }

    fn read_key(&self, key: &mut [u8]) {
        let len = key.len();
        key.copy_from_slice(&self.key[..len]);
    }

    fn write_data(&mut self, reg: DataReg, block: &[u8; BLOCK_SIZE]) {
        match reg {
            DataReg::Data0 => self.data[0] = *block,
            DataReg::Data0Xor => xor_into(&mut self.data[0], block),
            DataReg::Data1 => self.data[1] = *block,
            DataReg::Data2 => self.data[2] = *block,
        }
    }

    fn read_data(&self, reg: DataReg) -> [u8; BLOCK_SIZE] {
        match reg {
            DataReg::Data0 | DataReg::Data0Xor => self.data[0],
            DataReg::Data1 => self.data[1],
            DataReg::Data2 => self.data[2],
        }
    }

    fn write_cmd(&mut self, instr: Instr) {
        match instr {
            Instr::AesEnc => self.aes_enc(),
            Instr::AesDec => self.aes_dec(),
            Instr::Data0ToData1 => self.data[1] = self.data[0],
            Instr::Data1ToData0 => self.data[0] = self.data[1],
            Instr::Data1ToData0Xor => {
                let data1 = self.data[1];
                xor_into(&mut self.data[0], &data1);
            }
            Instr::Data2ToData0Xor => {
                let data2 = self.data[2];
                xor_into(&mut self.data[0], &data2);
            }
            Instr::Data1ToData2 => self.data[2] = self.data[1],
            Instr::Data1Inc => self.data1_inc(),
        }
        if matches!(instr, Instr::AesEnc | Instr::AesDec) {
            self.aes_instructions += 1;
        }
        self.busy.set(self.stall);
    }

    fn instr_running(&self) -> bool {
        if self.hung {
            return true;
        }
        match self.busy.get() {
            0 => false,
            n => {
                self.busy.set(n - 1);
                true
            }
        }
    }
}

/// FIPS-197 key expansion, run forwards and backwards over whole keys.
mod key_schedule {
    const SBOX: [u8; 256] = sbox();
    const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36];

    const fn sbox() -> [u8; 256] {
        let mut sbox = [0u8; 256];
        let mut p: u8 = 1;
        let mut q: u8 = 1;
        loop {
            // p walks the multiplicative group by multiplying with 3, q by dividing.
            p = p ^ (p << 1) ^ if p & 0x80 != 0 { 0x1b } else { 0 };
            q ^= q << 1;
            q ^= q << 2;
            q ^= q << 4;
            if q & 0x80 != 0 {
                q ^= 0x09;
            }
            let x = q ^ q.rotate_left(1) ^ q.rotate_left(2) ^ q.rotate_left(3) ^ q.rotate_left(4);
            sbox[p as usize] = x ^ 0x63;
            if p == 1 {
                break;
            }
        }
        sbox[0] = 0x63;
        sbox
    }

    type Word = [u8; 4];

    fn sub_word(word: Word) -> Word {
        word.map(|b| SBOX[b as usize])
    }

    fn xor(a: Word, b: Word) -> Word {
        [a[0] ^ b[0], a[1] ^ b[1], a[2] ^ b[2], a[3] ^ b[3]]
    }

    /// Word `i` of the expansion is `w[i - nk] ^ mix(w[i - 1], i)`.
    fn mix(prev: Word, i: usize, nk: usize) -> Word {
        if i % nk == 0 {
            let mut word = sub_word([prev[1], prev[2], prev[3], prev[0]]);
            word[0] ^= RCON[i / nk - 1];
            word
        } else if nk > 6 && i % nk == 4 {
            sub_word(prev)
        } else {
            prev
        }
    }

    fn load(words: &mut [Word], key: &[u8]) {
        for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
            word.copy_from_slice(chunk);
        }
    }

    fn store(key: &mut [u8], words: &[Word]) {
        for (chunk, word) in key.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(word);
        }
    }

    /// Replaces a cipher key with the last `nk` words of its expansion.
    pub fn forward(key: &mut [u8]) {
        let nk = key.len() / 4;
        let total = 4 * (nk + 7);
        let mut w = [[0u8; 4]; 60];
        load(&mut w[..nk], key);
        for i in nk..total {
            w[i] = xor(w[i - nk], mix(w[i - 1], i, nk));
        }
        store(key, &w[total - nk..total]);
    }

    /// Inverse of [`forward`].
    pub fn backward(key: &mut [u8]) {
        let nk = key.len() / 4;
        let total = 4 * (nk + 7);
        let mut w = [[0u8; 4]; 60];
        load(&mut w[total - nk..total], key);
        for i in (nk..total).rev() {
            w[i - nk] = xor(w[i], mix(w[i - 1], i, nk));
        }
        store(key, &w[..nk]);
    }

}
