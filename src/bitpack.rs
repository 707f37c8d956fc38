/*!
  Reading and writing bit fields of a `Word`.

  Fields are described by a `width` and the offset of their least significant bit, counting
  from bit 0. Field layouts are constants of the instruction format, so a layout that does not
  fit in a word is a bug in the caller and panics. A value that does not fit in its field is
  reported as `Error::Overflow` instead, since it can come from user input (e.g. assembly).
*/

use crate::bytecode::Word;
use crate::error::{Error, Result};

const WORD_BITS: u32 = Word::BITS;

/// Mask of `width` ones starting at bit `offset`.
fn field_mask(width: u32, offset: u32) -> Word {
  match width {
    0 => 0,
    w => (Word::MAX >> (WORD_BITS - w)) << offset,
  }
}

/// Returns the `width` bit field of `word` at `offset`, right-justified and zero-extended.
pub fn extract_unsigned(word: Word, width: u32, offset: u32) -> Word {
  assert!(
    width + offset <= WORD_BITS,
    "field of width {} at offset {} does not fit in a word", width, offset
  );
  match width {
    0 => 0,
    w => (word & field_mask(w, offset)) >> offset,
  }
}

/// Whether `value` can be represented in `width` unsigned bits.
pub fn fits_unsigned(value: Word, width: u32) -> bool {
  assert!(width <= WORD_BITS, "width {} is wider than a word", width);
  match width {
    WORD_BITS => true,
    w => value >> w == 0,
  }
}

/**
  Returns `word` with the `width` bit field at `offset` replaced by `value`. Bits outside the
  field are unchanged.

  Fails with `Error::Overflow` when `value` needs more than `width` bits. The value is never
  truncated.
*/
pub fn pack_unsigned(word: Word, width: u32, offset: u32, value: Word) -> Result<Word> {
  assert!(
    width + offset <= WORD_BITS,
    "field of width {} at offset {} does not fit in a word", width, offset
  );
  if !fits_unsigned(value, width) {
    return Err(Error::Overflow { value, width });
  }
  if width == 0 {
    return Ok(word);
  }
  let mask = field_mask(width, offset);
  Ok((word & !mask) | (value << offset))
}
