//! Codec: how characters map onto bytes.
//!
//! The buffer never interprets its bytes directly. It asks a [`Codec`]
//! where characters start, how long they are, and how to convert text
//! between single-byte and multibyte form.
//!
//! [`Utf8Codec`] stores multibyte text as UTF-8. Single-byte text is treated
//! as Latin-1 when it is widened.

use std::fmt;

/// Character encoding capability used by a buffer.
pub trait Codec: fmt::Debug {
    /// Number of bytes the code point `c` occupies in multibyte form.
    fn char_bytes(&self, c: u32) -> usize;

    /// Whether `byte` starts a character in multibyte text.
    fn is_char_head(&self, byte: u8) -> bool;

    /// Length of the multibyte character whose first byte is `lead`.
    fn char_len(&self, lead: u8) -> usize;

    /// Decode the character at the start of `bytes`.
    ///
    /// Returns the code point and the number of bytes consumed.
    fn decode(&self, bytes: &[u8]) -> (u32, usize);

    /// Encode `c` in multibyte form into `dst`, returning the byte count.
    fn encode(&self, c: u32, dst: &mut [u8; 4]) -> usize;

    /// Check that `bytes` is well-formed multibyte text.
    ///
    /// Returns the offset of the first byte that does not begin a complete
    /// character. Counting and conversion assume text that passed this
    /// check.
    fn check_multibyte(&self, bytes: &[u8]) -> Result<(), usize> {
        let mut at = 0;
        while let Some(&lead) = bytes.get(at) {
            let len = self.char_len(lead);
            let complete = self.is_char_head(lead)
                && bytes
                    .get(at + 1..at + len)
                    .is_some_and(|tail| tail.iter().all(|&b| !self.is_char_head(b)));
            if !complete {
                return Err(at);
            }
            at += len;
        }
        Ok(())
    }

    /// Number of characters in `bytes`.
    fn count_chars(&self, bytes: &[u8], multibyte: bool) -> usize {
        if multibyte {
            bytes.iter().filter(|&&b| self.is_char_head(b)).count()
        } else {
            bytes.len()
        }
    }

    /// Size of `src` once converted for a destination.
    fn converted_len(&self, src: &[u8], src_multibyte: bool, dst_multibyte: bool) -> usize {
        match (src_multibyte, dst_multibyte) {
            (a, b) if a == b => src.len(),
            (true, false) => self.count_chars(src, true),
            _ => src.iter().map(|&b| self.char_bytes(u32::from(b))).sum(),
        }
    }

    /// Copy `src` into `dst`, converting between single-byte and multibyte.
    ///
    /// Multibyte `src` must pass [`Codec::check_multibyte`] and `dst` must
    /// hold at least [`Codec::converted_len`] bytes. Returns the number of
    /// bytes written.
    fn copy_text(
        &self,
        src: &[u8],
        dst: &mut [u8],
        src_multibyte: bool,
        dst_multibyte: bool,
    ) -> usize {
        if src_multibyte == dst_multibyte {
            dst[..src.len()].copy_from_slice(src);
            return src.len();
        }

        let mut written = 0;
        if src_multibyte {
            // Narrow: keep code points that fit a byte, fold the rest.
            let mut rest = src;
            while !rest.is_empty() {
                let (c, len) = self.decode(rest);
                dst[written] = narrow_char(c);
                written += 1;
                rest = &rest[len..];
            }
        } else {
            let mut work = [0u8; 4];
            for &b in src {
                let len = self.encode(u32::from(b), &mut work);
                dst[written..written + len].copy_from_slice(&work[..len]);
                written += len;
            }
        }
        written
    }
}

/// Map a code point to the byte it becomes in single-byte text.
#[allow(clippy::cast_possible_truncation)]
const fn narrow_char(c: u32) -> u8 {
    if c < 0x100 {
        c as u8
    } else {
        ((c & 0x7f) + 0x80) as u8
    }
}

/// UTF-8 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl Codec for Utf8Codec {
    fn char_bytes(&self, c: u32) -> usize {
        char::from_u32(c).map_or(3, char::len_utf8)
    }

    #[inline]
    fn is_char_head(&self, byte: u8) -> bool {
        byte & 0xC0 != 0x80
    }

    #[inline]
    fn char_len(&self, lead: u8) -> usize {
        match lead {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        }
    }

    fn check_multibyte(&self, bytes: &[u8]) -> Result<(), usize> {
        std::str::from_utf8(bytes).map(|_| ()).map_err(|e| e.valid_up_to())
    }

    fn decode(&self, bytes: &[u8]) -> (u32, usize) {
        let Some(&lead) = bytes.first() else {
            return (0, 0);
        };
        let len = self.char_len(lead).min(bytes.len());
        if len == 1 {
            return (u32::from(lead), 1);
        }
        let mask: u8 = match len {
            2 => 0x1F,
            3 => 0x0F,
            _ => 0x07,
        };
        let c = bytes[1..len]
            .iter()
            .fold(u32::from(lead & mask), |acc, &b| (acc << 6) | u32::from(b & 0x3F));
        (c, len)
    }

    fn encode(&self, c: u32, dst: &mut [u8; 4]) -> usize {
        let ch = char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER);
        ch.encode_utf8(dst).len()
    }
}
