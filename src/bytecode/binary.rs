/*!
  This module is responsible for the encoding and decoding of binary instructions and of whole
  program images.

  A program image is the sequence of instruction words stored big-endian, four bytes per word.
*/
use std::convert::TryFrom;

use super::{Instruction, Operation, Register, Word};
use crate::bitpack::{extract_unsigned, pack_unsigned};
use crate::error::{Error, Result};
use crate::symboltable::SymbolTable;

const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// A bit field of an instruction word.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Field {
  pub width: u32,
  pub offset: u32,
}

impl Field {
  pub fn get(&self, word: Word) -> Word {
    extract_unsigned(word, self.width, self.offset)
  }

  pub fn set(&self, word: Word, value: Word) -> Result<Word> {
    pack_unsigned(word, self.width, self.offset, value)
  }
}

// If you change these you must also change the table in `bytecode/mod.rs`.
pub const OPCODE            : Field = Field { width: 4,  offset: 28 };
pub const REGISTER_A        : Field = Field { width: 3,  offset: 6  };
pub const REGISTER_B        : Field = Field { width: 3,  offset: 3  };
pub const REGISTER_C        : Field = Field { width: 3,  offset: 0  };
pub const REGISTER_IMMEDIATE: Field = Field { width: 3,  offset: 25 };
pub const IMMEDIATE         : Field = Field { width: 25, offset: 0  };

/// Reads the opcode of `word`, failing for the two unused encodings.
pub fn decode_operation(word: Word) -> Result<Operation> {
  let code = OPCODE.get(word);
  Operation::try_from(code as u8).map_err(|_| Error::InvalidOpcode(code))
}

pub fn decode_instruction(word: Word) -> Result<Instruction> {
  let instruction =
    match decode_operation(word)? {

      Operation::LoadImmediate => {
        // [OpCode:4][R:3][Value:25]
        Instruction::LoadImmediate {
          register: REGISTER_IMMEDIATE.get(word) as Register,
          value: IMMEDIATE.get(word),
        }
      }

      opcode => {
        // [OpCode:4][Unused:19][A:3][B:3][C:3]
        Instruction::ThreeRegister {
          opcode,
          a: REGISTER_A.get(word) as Register,
          b: REGISTER_B.get(word) as Register,
          c: REGISTER_C.get(word) as Register,
        }
      }

    };

  Ok(instruction)
}

/**
  Encodes the instruction into a word. Register indices above 7 and immediates wider than 25
  bits are reported as `Error::Overflow`, never truncated.
*/
pub fn encode_instruction(instruction: &Instruction) -> Result<Word> {
  match *instruction {

    Instruction::LoadImmediate { register, value } => {
      let word = OPCODE.set(0, Operation::LoadImmediate.code() as Word)?;
      let word = REGISTER_IMMEDIATE.set(word, register as Word)?;
      IMMEDIATE.set(word, value)
    }

    Instruction::ThreeRegister { opcode, a, b, c } => {
      let word = OPCODE.set(0, opcode.code() as Word)?;
      let word = REGISTER_C.set(word, c as Word)?;
      let word = REGISTER_B.set(word, b as Word)?;
      REGISTER_A.set(word, a as Word)
    }

  }
}

/// Splits a program image into big-endian words.
pub fn read_program(bytes: &[u8]) -> Result<Vec<Word>> {
  if bytes.len() % WORD_BYTES != 0 {
    return Err(Error::MalformedProgram { length: bytes.len() });
  }

  Ok(
    bytes
      .chunks_exact(WORD_BYTES)
      .map(|chunk| Word::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect()
  )
}

pub fn write_program(words: &[Word]) -> Vec<u8> {
  words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

/**
  Produces a listing with one line per word: address, raw word, and the decoded instruction.
  Addresses that carry a label in `symbols` get a `name:` line of their own. Words that are not
  instructions (data, or the unused opcodes) are listed as `.word`.
*/
pub fn disassemble(words: &[Word], symbols: Option<&SymbolTable>) -> String {
  let mut listing = String::new();

  for (address, &word) in words.iter().enumerate() {
    if let Some(name) = symbols.and_then(|table| table.get_symbol(address as Word)) {
      listing.push_str(&format!("{}:\n", name));
    }
    let text = match decode_instruction(word) {
      Ok(instruction) => instruction.to_string(),
      Err(_) => format!(".word {:#010x}", word),
    };
    listing.push_str(&format!("{:>6}  {:08X}  {}\n", address, word, text));
  }

  listing
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_encodings(){
    // Encodings used by the executor tests: A=0, B=1, C=2.
    assert_eq!(encode_instruction(&Instruction::conditional_move(0, 1, 2)).unwrap(), 0x0000_000A);
    assert_eq!(encode_instruction(&Instruction::segmented_load(0, 1, 2)).unwrap(), 0x1000_000A);
    assert_eq!(encode_instruction(&Instruction::nand(0, 1, 2)).unwrap(), 0x6000_000A);
    assert_eq!(encode_instruction(&Instruction::halt()).unwrap(), 0x7000_0000);
    assert_eq!(encode_instruction(&Instruction::load_immediate(0, 0x8F8F)).unwrap(), 0xD000_8F8F);
    assert_eq!(encode_instruction(&Instruction::load_immediate(7, 1)).unwrap(), 0xDE00_0001);
  }

  #[test]
  fn decode(){
    assert_eq!(decode_instruction(0x3000_000A).unwrap(), Instruction::add(0, 1, 2));
    assert_eq!(
      decode_instruction(0xD000_8F8F).unwrap(),
      Instruction::load_immediate(0, 0x8F8F)
    );
    // Unused bits are ignored.
    assert_eq!(decode_instruction(0x7123_4000).unwrap(), Instruction::halt());
  }

  #[test]
  fn unused_opcodes(){
    assert!(matches!(decode_instruction(0xE000_0000), Err(Error::InvalidOpcode(14))));
    assert!(matches!(decode_instruction(0xF000_0000), Err(Error::InvalidOpcode(15))));
  }

  #[test]
  fn encode_overflow(){
    assert!(matches!(
      encode_instruction(&Instruction::load_immediate(0, 1 << 25)),
      Err(Error::Overflow { width: 25, .. })
    ));
    assert!(matches!(
      encode_instruction(&Instruction::add(8, 0, 0)),
      Err(Error::Overflow { value: 8, width: 3 })
    ));
  }

  #[test]
  fn program_images(){
    let bytes = [0xD0, 0x00, 0x8F, 0x8F, 0x70, 0x00, 0x00, 0x00];
    let words = read_program(&bytes).unwrap();
    assert_eq!(words, vec![0xD000_8F8F, 0x7000_0000]);
    assert_eq!(write_program(&words), bytes.to_vec());

    assert!(read_program(&[]).unwrap().is_empty());
    assert!(matches!(read_program(&bytes[..7]), Err(Error::MalformedProgram { length: 7 })));
  }

  #[test]
  fn listing(){
    let listing = disassemble(&[0xD000_0048, 0xA000_0000, 0xF000_0000], None);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("LoadImmediate(r0, 72)"));
    assert!(lines[1].ends_with("Output(r0)"));
    assert!(lines[2].ends_with(".word 0xf0000000"));
  }
}
