/*!

  The machine uses a 32 bit word. Every instruction is exactly one word, and the opcode always
  sits in the top four bits. There are two instruction formats:

    Three register:  [OpCode:4][Unused:19][A:3][B:3][C:3]
    Load immediate:  [OpCode:4][R:3][Value:25]

  Only `LoadImmediate` uses the second format. Register fields index the eight general purpose
  registers `r0`..`r7`.

  As with any bytecode, the `Instruction` enum is the unencoded form of an instruction: it is
  what the assembler produces, what the disassembler prints, and what the encoder packs into a
  `Word`. The machine itself never builds an `Instruction`; it reads fields out of the raw word
  with `bitpack` as it dispatches.

*/

mod assembly;
mod binary;

pub use assembly::{assemble, parse_assembly, Assembled, Operand, ParsedAssemblySyntax};
pub use binary::{
  decode_instruction, decode_operation, disassemble, encode_instruction, read_program,
  write_program, Field, IMMEDIATE, OPCODE, REGISTER_A, REGISTER_B, REGISTER_C, REGISTER_IMMEDIATE,
};

use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

pub type Word = u32;
/// Index of one of the eight general purpose registers.
pub type Register = u8;

pub const REGISTER_COUNT: usize = 8;

/**
  Opcodes of the virtual machine.

  The discriminant of each variant is its opcode, so the order below is the encoding and must
  not change.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,          Hash
)]
#[repr(u8)]
pub enum Operation {
  ConditionalMove, // if r[C] != 0 { r[A] = r[B] }
  SegmentedLoad,   // r[A] = m[r[B]][r[C]]
  SegmentedStore,  // m[r[A]][r[B]] = r[C]
  Add,             // r[A] = r[B] + r[C]
  Multiply,        // r[A] = r[B] * r[C]
  Divide,          // r[A] = r[B] / r[C]
  Nand,            // r[A] = !(r[B] & r[C])
  Halt,
  Activate,        // r[B] = new segment of r[C] words
  Inactivate,      // free segment r[C]
  Output,          // write r[C]
  Input,           // r[C] = read byte, or !0 at end of input
  LoadProgram,     // m[0] = copy of m[r[B]]; pc = r[C]
  LoadImmediate,   // r[R] = value
}

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /**
    The register operands an operation actually reads or writes, in the order they are written
    in assembly. Unused fields are encoded as zero.
  */
  pub fn operands(&self) -> &'static [Field] {
    match self {
      Operation::Halt => &[],

      | Operation::Inactivate
      | Operation::Output
      | Operation::Input => &[REGISTER_C],

      | Operation::Activate
      | Operation::LoadProgram => &[REGISTER_B, REGISTER_C],

      Operation::LoadImmediate => &[REGISTER_IMMEDIATE, IMMEDIATE],

      _ => &[REGISTER_A, REGISTER_B, REGISTER_C],
    }
  }

  pub fn arity(&self) -> usize {
    self.operands().len()
  }
}

/// Holds the unencoded components of an instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [OpCode:4][Unused:19][A:3][B:3][C:3]
  ThreeRegister {
    opcode: Operation,
    a: Register,
    b: Register,
    c: Register
  },
  /// [OpCode:4][R:3][Value:25]
  LoadImmediate {
    register: Register,
    value: Word
  },
}

impl Instruction {

  // region Constructors

  pub fn three_register(opcode: Operation, a: Register, b: Register, c: Register) -> Instruction {
    debug_assert!(opcode != Operation::LoadImmediate);
    Instruction::ThreeRegister { opcode, a, b, c }
  }

  pub fn conditional_move(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::ConditionalMove, a, b, c)
  }

  pub fn segmented_load(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::SegmentedLoad, a, b, c)
  }

  pub fn segmented_store(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::SegmentedStore, a, b, c)
  }

  pub fn add(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::Add, a, b, c)
  }

  pub fn multiply(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::Multiply, a, b, c)
  }

  pub fn divide(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::Divide, a, b, c)
  }

  pub fn nand(a: Register, b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::Nand, a, b, c)
  }

  pub fn halt() -> Instruction {
    Instruction::three_register(Operation::Halt, 0, 0, 0)
  }

  pub fn activate(b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::Activate, 0, b, c)
  }

  pub fn inactivate(c: Register) -> Instruction {
    Instruction::three_register(Operation::Inactivate, 0, 0, c)
  }

  pub fn output(c: Register) -> Instruction {
    Instruction::three_register(Operation::Output, 0, 0, c)
  }

  pub fn input(c: Register) -> Instruction {
    Instruction::three_register(Operation::Input, 0, 0, c)
  }

  pub fn load_program(b: Register, c: Register) -> Instruction {
    Instruction::three_register(Operation::LoadProgram, 0, b, c)
  }

  pub fn load_immediate(register: Register, value: Word) -> Instruction {
    Instruction::LoadImmediate { register, value }
  }

  // endregion

  pub fn operation(&self) -> Operation {
    match self {
      Instruction::ThreeRegister { opcode, .. } => *opcode,
      Instruction::LoadImmediate { .. } => Operation::LoadImmediate,
    }
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::LoadImmediate { register, value } => {
        write!(f, "{}(r{}, {})", Operation::LoadImmediate, register, value)
      }

      Instruction::ThreeRegister { opcode, a, b, c } => {
        let operands = opcode
          .operands()
          .iter()
          .map(|field| {
            let register = match *field {
              REGISTER_A => a,
              REGISTER_B => b,
              _ => c,
            };
            format!("r{}", register)
          })
          .collect::<Vec<String>>();

        match operands.is_empty() {
          true  => write!(f, "{}", opcode),
          false => write!(f, "{}({})", opcode, operands.join(", ")),
        }
      }

    }
  }
}
