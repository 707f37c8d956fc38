//! Structures and functions for the machine itself: the register file, the program counter, and
//! the dispatch of each instruction word to its handler.

use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};

use prettytable::{format as TableFormat, Table};
use tracing::debug;

use crate::bytecode::*;
use crate::error::{Error, Result};
use crate::memory::{Segment, SegmentStore, PROGRAM_SEGMENT};

/// Whether the machine will execute another instruction. `Halted` is terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Status {
  Running,
  Halted
}

impl Display for Status {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Status::Running => write!(f, "Running"),
      Status::Halted  => write!(f, "Halted"),
    }
  }
}

/**
  The machine owns its memory outright. `I` supplies bytes to `Input` and `O` receives the
  bytes written by `Output`; a run uses stdin and stdout, tests use byte slices and vectors.
*/
pub struct UM<I, O> {

  // Flags
  status: Status,

  // Memory Store
  memory: SegmentStore,

  // Registers //
  pc        : Word,                    // Program Counter, an index into segment 0
  registers : [Word; REGISTER_COUNT],  // General purpose registers

  /// The most recently executed instruction, for display.
  last: Option<Word>,

  // Streams
  input  : I,
  output : O,
}

impl<I: Read, O: Write> UM<I, O> {

  // region Display methods

  fn make_register_table(registers: &[Word], highlight: Option<usize>) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for (i, value) in registers.iter().enumerate() {
      match Some(i) == highlight {

        true  => {
          table.add_row(
            row![r->format!("* --> r{} =", i), format!("{:#010x}  {}", value, value)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("r{} =", i), format!("{:#010x}  {}", value, value)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  // endregion

  // region Construction and accessors

  /// A machine with `program` in segment 0, all registers zero, and the program counter at 0.
  pub fn new(program: Segment, input: I, output: O) -> UM<I, O> {
    UM {
      status    : Status::Running,
      memory    : SegmentStore::new(program),
      pc        : 0,
      registers : [0; REGISTER_COUNT],
      last      : None,
      input,
      output,
    }
  }

  pub fn status(&self) -> Status {
    self.status
  }

  pub fn program_counter(&self) -> Word {
    self.pc
  }

  pub fn set_program_counter(&mut self, pc: Word) {
    self.pc = pc;
  }

  pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
    &self.registers
  }

  pub fn register(&self, register: Register) -> Word {
    self.registers[register as usize]
  }

  pub fn set_register(&mut self, register: Register, value: Word) {
    self.registers[register as usize] = value;
  }

  pub fn memory(&self) -> &SegmentStore {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut SegmentStore {
    &mut self.memory
  }

  pub fn output(&self) -> &O {
    &self.output
  }

  pub fn into_output(self) -> O {
    self.output
  }

  // endregion

  // region Fetch and execute loop

  /// Reads the instruction at the program counter and advances the program counter past it.
  pub fn fetch(&mut self) -> Result<Word> {
    let program = self.memory.program();
    let word = program
      .get(self.pc as usize)
      .copied()
      .ok_or(Error::ProgramCounterOutOfBounds { pc: self.pc, length: program.len() })?;
    self.pc = self.pc.wrapping_add(1);
    Ok(word)
  }

  /**
    Fetches and executes instructions until the machine halts, returning the number of
    instructions executed. Any fault stops the run and is returned instead. The output stream
    is flushed either way.
  */
  pub fn run(&mut self) -> Result<u64> {
    let outcome = self.run_until_halt();
    let flushed = self.output.flush();
    let executed = outcome?;
    flushed?;
    Ok(executed)
  }

  fn run_until_halt(&mut self) -> Result<u64> {
    let mut executed: u64 = 0;

    while self.status == Status::Running {
      let instruction = self.fetch()?;

      #[cfg(feature = "trace_computation")]
      self.trace(instruction);

      self.step(instruction)?;
      executed += 1;
    }

    Ok(executed)
  }

  /**
    Executes a single instruction word. The program counter is not touched except by
    `LoadProgram`; advancing it is the job of `fetch`.

    A faulting instruction leaves the registers as they were.
  */
  pub fn step(&mut self, instruction: Word) -> Result<Status> {
    if self.status == Status::Halted {
      return Ok(Status::Halted);
    }

    let operation = decode_operation(instruction)?;
    self.last = Some(instruction);

    match operation {
      Operation::ConditionalMove => self.conditional_move(instruction),
      Operation::SegmentedLoad   => self.segmented_load(instruction)?,
      Operation::SegmentedStore  => self.segmented_store(instruction)?,
      Operation::Add             => self.add(instruction),
      Operation::Multiply        => self.multiply(instruction),
      Operation::Divide          => self.divide(instruction)?,
      Operation::Nand            => self.nand(instruction),
      Operation::Halt            => self.halt(),
      Operation::Activate        => self.activate(instruction)?,
      Operation::Inactivate      => self.inactivate(instruction)?,
      Operation::Output          => self.write_output(instruction)?,
      Operation::Input           => self.read_input(instruction)?,
      Operation::LoadProgram     => self.load_program(instruction)?,
      Operation::LoadImmediate   => self.load_immediate(instruction),
    }

    Ok(self.status)
  }

  /// Prints the instruction about to execute and the state it executes in, to stderr.
  #[cfg(feature = "trace_computation")]
  fn trace(&self, instruction: Word) {
    let text = match decode_instruction(instruction) {
      Ok(decoded) => decoded.to_string(),
      Err(_)      => format!(".word {:#010x}", instruction),
    };
    eprintln!("Next: {}\n{}", text, self);
  }

  // endregion

  // region VM instruction methods

  /// Decodes the three register fields as indices into `registers`.
  fn abc(instruction: Word) -> (usize, usize, usize) {
    (
      REGISTER_A.get(instruction) as usize,
      REGISTER_B.get(instruction) as usize,
      REGISTER_C.get(instruction) as usize,
    )
  }

  fn conditional_move(&mut self, instruction: Word) {
    let (a, b, c) = Self::abc(instruction);
    if self.registers[c] != 0 {
      self.registers[a] = self.registers[b];
    }
  }

  fn segmented_load(&mut self, instruction: Word) -> Result<()> {
    let (a, b, c) = Self::abc(instruction);
    self.registers[a] = self.memory.load(self.registers[b], self.registers[c])?;
    Ok(())
  }

  fn segmented_store(&mut self, instruction: Word) -> Result<()> {
    let (a, b, c) = Self::abc(instruction);
    self.memory.store(self.registers[a], self.registers[b], self.registers[c])
  }

  fn add(&mut self, instruction: Word) {
    let (a, b, c) = Self::abc(instruction);
    self.registers[a] = self.registers[b].wrapping_add(self.registers[c]);
  }

  fn multiply(&mut self, instruction: Word) {
    let (a, b, c) = Self::abc(instruction);
    self.registers[a] = self.registers[b].wrapping_mul(self.registers[c]);
  }

  fn divide(&mut self, instruction: Word) -> Result<()> {
    let (a, b, c) = Self::abc(instruction);
    self.registers[a] = self.registers[b]
      .checked_div(self.registers[c])
      .ok_or(Error::DivisionByZero)?;
    Ok(())
  }

  fn nand(&mut self, instruction: Word) {
    let (a, b, c) = Self::abc(instruction);
    self.registers[a] = !(self.registers[b] & self.registers[c]);
  }

  fn halt(&mut self) {
    debug!(pc = self.pc, "halted");
    self.status = Status::Halted;
  }

  fn activate(&mut self, instruction: Word) -> Result<()> {
    let (_, b, c) = Self::abc(instruction);
    self.registers[b] = self.memory.allocate(self.registers[c])?;
    Ok(())
  }

  fn inactivate(&mut self, instruction: Word) -> Result<()> {
    let (_, _, c) = Self::abc(instruction);
    self.memory.release(self.registers[c])
  }

  fn write_output(&mut self, instruction: Word) -> Result<()> {
    let (_, _, c) = Self::abc(instruction);
    let value = self.registers[c];
    if value > u8::MAX as Word {
      return Err(Error::OutputOutOfRange(value));
    }
    self.output.write_all(&[value as u8])?;
    Ok(())
  }

  /// Reads one byte into `r[C]`, or all ones once the input is exhausted.
  fn read_input(&mut self, instruction: Word) -> Result<()> {
    let (_, _, c) = Self::abc(instruction);
    // Whatever the program printed so far may be a prompt for this input.
    self.output.flush()?;

    let mut byte = [0u8; 1];
    let value = loop {
      match self.input.read(&mut byte) {
        Ok(0)                                       => break Word::MAX,
        Ok(_)                                       => break byte[0] as Word,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e)                                      => return Err(e.into()),
      }
    };

    self.registers[c] = value;
    Ok(())
  }

  fn load_program(&mut self, instruction: Word) -> Result<()> {
    let (_, b, c) = Self::abc(instruction);
    let source = self.registers[b];
    if source != PROGRAM_SEGMENT {
      self.memory.replace_program(source)?;
    }
    self.pc = self.registers[c];
    Ok(())
  }

  fn load_immediate(&mut self, instruction: Word) {
    let register = REGISTER_IMMEDIATE.get(instruction) as usize;
    self.registers[register] = IMMEDIATE.get(instruction);
  }

  // endregion

}

/// The register an instruction writes, if any.
fn destination(instruction: Word) -> Option<usize> {
  let operation = decode_operation(instruction).ok()?;
  let field = match operation {
    | Operation::ConditionalMove
    | Operation::SegmentedLoad
    | Operation::Add
    | Operation::Multiply
    | Operation::Divide
    | Operation::Nand          => REGISTER_A,
    Operation::Activate        => REGISTER_B,
    Operation::Input           => REGISTER_C,
    Operation::LoadImmediate   => REGISTER_IMMEDIATE,
    _                          => return None,
  };
  Some(field.get(instruction) as usize)
}


lazy_static! {
  pub(crate) static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl<I: Read, O: Write> Display for UM<I, O> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let highlight = self.last.and_then(destination);
    let r_table   = Self::make_register_table(&self.registers, highlight);
    let m_table   = &self.memory;

    let mut combined_table = table!([r_table, m_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Segments"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let last = match self.last.map(decode_instruction) {
      Some(Ok(instruction)) => instruction.to_string(),
      _                     => String::from("-"),
    };

    write!(
      f,
      "Status: {}\tpc: {}\tLast: {}\n{}",
      self.status, self.pc, last, combined_table
    )
  }
}
