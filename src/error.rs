//! Faults raised by the machine, its memory, and the bytecode tools.

use thiserror::Error;

use crate::bytecode::Word;
use crate::memory::SegmentId;

pub type Result<T> = std::result::Result<T, Error>;

/**
  Every way a run can stop other than `Halt`. None of these are recoverable at the instruction
  level: the machine state is left as it was before the faulting instruction and the error is
  handed back to whoever is driving the machine.
*/
#[derive(Debug, Error)]
pub enum Error {
  // region Encoding faults

  #[error("value {value:#x} does not fit in a {width} bit field")]
  Overflow { value: Word, width: u32 },

  // endregion

  // region Contract faults

  #[error("segment {0} is not mapped")]
  UnmappedSegment(SegmentId),

  #[error("offset {offset} is outside segment {id} of length {length}")]
  SegmentOutOfBounds { id: SegmentId, offset: Word, length: usize },

  #[error("the program segment cannot be released")]
  ReleaseProgramSegment,

  #[error("cannot allocate a segment of {size} words")]
  SegmentTooLarge { size: Word },

  #[error("no segment identifiers remain")]
  SegmentIdsExhausted,

  #[error("invalid opcode {0}")]
  InvalidOpcode(Word),

  #[error("program counter {pc} is past the end of the program (length {length})")]
  ProgramCounterOutOfBounds { pc: Word, length: usize },

  // endregion

  // region Arithmetic and I/O faults

  #[error("division by zero")]
  DivisionByZero,

  #[error("output value {0} is not a byte")]
  OutputOutOfRange(Word),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  // endregion

  // region Program images and assembly

  #[error("program image of {length} bytes is not a whole number of words")]
  MalformedProgram { length: usize },

  #[error("line {line}: {message}")]
  Assembly { line: u32, message: String },

  // endregion
}
