/*!
  The human readable textual form of bytecode is called assembly. This module leverages the
  `strum` derives of `Operation` to map operation names to opcodes, so the spelling of an
  operation in assembly is exactly the name of its variant.

  ```text
  # Prints "Hi" and stops.
  start:  LoadImmediate(r1, 'H')
          Output(r1)
          LoadImmediate(r1, 0x69)
          Output(r1)
          Halt
  ```

  Registers are `r0`..`r7`. Immediates are decimal, `0x` hex, a quoted character, or `@label`
  for the address of a label. A label names the next instruction, on the same line or below.
*/

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::tag,
  character::complete::{
    alpha1,
    alphanumeric1,
    anychar,
    char as one_char,
    digit1,
    hex_digit1,
    space0
  },
  combinator::{all_consuming, map, map_res, opt, recognize, rest},
  multi::{many0, separated_list0},
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult
};

use super::{encode_instruction, Instruction, Operation, Register, Word};
use super::{IMMEDIATE, REGISTER_A, REGISTER_B, REGISTER_C, REGISTER_COUNT};
use crate::error::{Error, Result};
use crate::symboltable::SymbolTable;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operand<'a> {
  Register(u32),
  Value(Word),
  Label(&'a str),
}

impl<'a> Display for Operand<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Operand::Register(n) => write!(f, "r{}", n),
      Operand::Value(v)    => write!(f, "{}", v),
      Operand::Label(name) => write!(f, "@{}", name),
    }
  }
}

/// One statement of an assembly listing, before operation names and labels are resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedAssemblySyntax<'a> {
  Label {
    line: u32,
    name: &'a str
  },
  Operation {
    line: u32,
    name: &'a str,
    operands: Vec<Operand<'a>>
  }
}
// Abbreviated name internally
use ParsedAssemblySyntax as Syntax;

impl<'a> Display for ParsedAssemblySyntax<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Syntax::Label { name, .. } => {
        write!(f, "{}:", name)
      }
      Syntax::Operation { name, operands, .. } if operands.is_empty() => {
        write!(f, "{}", name)
      }
      Syntax::Operation { name, operands, .. } => {
        write!(f, "{}({})",
          name,
          operands.iter()
                  .map(Operand::to_string)
                  .collect::<Vec<String>>()
                  .join(", ")
        )
      }
    }
  }
}

/// The result of assembling a listing: the program image and the labels it defined.
#[derive(Clone, Debug)]
pub struct Assembled {
  pub words: Vec<Word>,
  pub symbols: SymbolTable,
}

fn assembly_error(line: u32, message: String) -> Error {
  Error::Assembly { line, message }
}

// region Parsers

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    alt((alpha1, tag("_"))),
    many0(alt((alphanumeric1, tag("_"))))
  ))(input)
}

fn number(input: &str) -> IResult<&str, Word> {
  alt((
    map_res(
      preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
      |digits: &str| Word::from_str_radix(digits, 16)
    ),
    map_res(digit1, |digits: &str| digits.parse::<Word>()),
  ))(input)
}

fn character(input: &str) -> IResult<&str, Word> {
  map(
    delimited(one_char('\''), anychar, one_char('\'')),
    |c: char| c as Word
  )(input)
}

fn operand(input: &str) -> IResult<&str, Operand<'_>> {
  alt((
    map(
      preceded(one_char('r'), map_res(digit1, |digits: &str| digits.parse::<u32>())),
      Operand::Register
    ),
    map(preceded(one_char('@'), identifier), Operand::Label),
    map(character, Operand::Value),
    map(number, Operand::Value),
  ))(input)
}

fn operand_list(input: &str) -> IResult<&str, Vec<Operand<'_>>> {
  delimited(
    pair(one_char('('), space0),
    separated_list0(delimited(space0, one_char(','), space0), operand),
    pair(space0, one_char(')'))
  )(input)
}

fn label_definition(input: &str) -> IResult<&str, &str> {
  terminated(identifier, pair(space0, one_char(':')))(input)
}

fn operation(input: &str) -> IResult<&str, (&str, Vec<Operand<'_>>)> {
  map(
    pair(identifier, opt(preceded(space0, operand_list))),
    |(name, operands)| (name, operands.unwrap_or_default())
  )(input)
}

/// `[label:] [Operation[(operands)]] [# comment]`, any part optional.
fn line(input: &str) -> IResult<&str, (Option<&str>, Option<(&str, Vec<Operand<'_>>)>)> {
  all_consuming(
    map(
      tuple((
        space0,
        opt(label_definition),
        space0,
        opt(operation),
        space0,
        opt(pair(one_char('#'), rest))
      )),
      |(_, label, _, operation, _, _)| (label, operation)
    )
  )(input)
}

// endregion

/// Splits a listing into labels and operations. Names are not checked here; see `assemble`.
pub fn parse_assembly(text: &str) -> Result<Vec<Syntax<'_>>> {
  let mut syntax_vec = vec![];

  for (idx, text_line) in text.lines().enumerate() {
    let line_number = (idx + 1) as u32;

    let (_, (label, operation)) = line(text_line).map_err(|e| {
      let near = match e {
        | nom::Err::Error(e)
        | nom::Err::Failure(e) => e.input.trim(),
        nom::Err::Incomplete(_) => "",
      };
      assembly_error(line_number, format!("syntax error near `{}`", near))
    })?;

    if let Some(name) = label {
      syntax_vec.push(Syntax::Label { line: line_number, name });
    }
    if let Some((name, operands)) = operation {
      syntax_vec.push(Syntax::Operation { line: line_number, name, operands });
    }
  }

  Ok(syntax_vec)
}

fn register_operand(line: u32, operand: &Operand) -> Result<Register> {
  match *operand {
    Operand::Register(n) if (n as usize) < REGISTER_COUNT => Ok(n as Register),
    Operand::Register(n) => Err(assembly_error(line, format!("there is no register r{}", n))),
    other => Err(assembly_error(line, format!("expected a register, found {}", other))),
  }
}

fn value_operand(line: u32, operand: &Operand, symbols: &SymbolTable) -> Result<Word> {
  match *operand {
    Operand::Value(value) => Ok(value),
    Operand::Label(name) => {
      symbols
        .get_address(name)
        .ok_or_else(|| assembly_error(line, format!("undefined label `{}`", name)))
    }
    Operand::Register(n) => {
      Err(assembly_error(line, format!("expected a value, found register r{}", n)))
    }
  }
}

fn build_instruction(
  line: u32,
  name: &str,
  operands: &[Operand],
  symbols: &SymbolTable
) -> Result<Instruction> {
  let operation = Operation::from_str(name)
    .map_err(|_| assembly_error(line, format!("{} is not an operation", name)))?;

  if operands.len() != operation.arity() {
    return Err(assembly_error(
      line,
      format!(
        "{} requires {} operands but was given {}",
        operation, operation.arity(), operands.len()
      )
    ));
  }

  let (mut a, mut b, mut c): (Register, Register, Register) = (0, 0, 0);
  let mut register: Register = 0;
  let mut value: Word = 0;

  for (field, operand) in operation.operands().iter().zip(operands) {
    match *field {
      IMMEDIATE  => value = value_operand(line, operand, symbols)?,
      REGISTER_A => a = register_operand(line, operand)?,
      REGISTER_B => b = register_operand(line, operand)?,
      REGISTER_C => c = register_operand(line, operand)?,
      _          => register = register_operand(line, operand)?,
    }
  }

  Ok(
    match operation {
      Operation::LoadImmediate => Instruction::load_immediate(register, value),
      opcode                   => Instruction::three_register(opcode, a, b, c),
    }
  )
}

/**
  Assembles a listing into a program image. Labels are collected in a first pass so that an
  instruction may refer to a label defined further down.
*/
pub fn assemble(text: &str) -> Result<Assembled> {
  let syntax_vec = parse_assembly(text)?;

  let mut symbols = SymbolTable::new();
  let mut address: Word = 0;
  for syntax in syntax_vec.iter() {
    match syntax {

      Syntax::Label { line, name } => {
        if symbols.get_address(name).is_some() {
          return Err(assembly_error(*line, format!("label `{}` is already defined", name)));
        }
        if let Err((_, taken)) = symbols.insert(name, address) {
          let other = symbols.get_symbol(taken).map(|s| s.to_string()).unwrap_or_default();
          return Err(assembly_error(
            *line,
            format!("address {} already has the label `{}`", taken, other)
          ));
        }
      }

      Syntax::Operation { .. } => {
        address += 1;
      }

    }
  }

  let mut words = Vec::with_capacity(address as usize);
  for syntax in syntax_vec.iter() {
    if let Syntax::Operation { line, name, operands } = syntax {
      let instruction = build_instruction(*line, name, operands, &symbols)?;
      let word = encode_instruction(&instruction)
        .map_err(|e| assembly_error(*line, e.to_string()))?;
      words.push(word);
    }
  }

  Ok(Assembled { words, symbols })
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{decode_instruction, disassemble};

  fn error_line(result: Result<Assembled>) -> (u32, String) {
    match result {
      Err(Error::Assembly { line, message }) => (line, message),
      Err(e) => panic!("expected an assembly error, got {}", e),
      Ok(_) => panic!("expected an assembly error"),
    }
  }

  #[test]
  fn parse_statements(){
    let text = "
      start: LoadImmediate( r1 , 'H' )   # a comment
      Output(r1)
      # only a comment

      end:
        Halt
    ";
    let syntax = parse_assembly(text).unwrap();
    assert_eq!(syntax.len(), 5);
    assert_eq!(syntax[0], Syntax::Label { line: 2, name: "start" });
    assert_eq!(
      syntax[1],
      Syntax::Operation {
        line: 2,
        name: "LoadImmediate",
        operands: vec![Operand::Register(1), Operand::Value('H' as Word)]
      }
    );
    assert_eq!(syntax[2].to_string(), "Output(r1)");
    assert_eq!(syntax[3], Syntax::Label { line: 6, name: "end" });
    assert_eq!(syntax[4].to_string(), "Halt");
  }

  #[test]
  fn assemble_program(){
    let assembled = assemble("
      LoadImmediate(r1, 0x48)
      Output(r1)
      Add(r3, r1, r2)
      Activate(r1, r2)
      LoadProgram(r0, r7)
      Halt()
    ").unwrap();

    let decoded: Vec<Instruction> =
      assembled.words.iter().map(|&w| decode_instruction(w).unwrap()).collect();
    assert_eq!(decoded, vec![
      Instruction::load_immediate(1, 0x48),
      Instruction::output(1),
      Instruction::add(3, 1, 2),
      Instruction::activate(1, 2),
      Instruction::load_program(0, 7),
      Instruction::halt(),
    ]);
    assert!(assembled.symbols.is_empty());
  }

  #[test]
  fn forward_and_backward_labels(){
    let assembled = assemble("
      top:  LoadImmediate(r3, @done)
            LoadImmediate(r4, @top)
      done: Halt
    ").unwrap();

    assert_eq!(assembled.symbols.get_address("top"), Some(0));
    assert_eq!(assembled.symbols.get_address("done"), Some(2));
    assert_eq!(decode_instruction(assembled.words[0]).unwrap(), Instruction::load_immediate(3, 2));
    assert_eq!(decode_instruction(assembled.words[1]).unwrap(), Instruction::load_immediate(4, 0));

    let listing = disassemble(&assembled.words, Some(&assembled.symbols));
    assert!(listing.starts_with("top:\n"));
    assert!(listing.contains("done:\n"));
  }

  #[test]
  fn disassembly_reassembles(){
    let source = "Input(r2)\nNand(r1, r2, r2)\nSegmentedStore(r0, r1, r2)\nHalt\n";
    let words = assemble(source).unwrap().words;
    let text = words
      .iter()
      .map(|&w| decode_instruction(w).unwrap().to_string())
      .collect::<Vec<String>>()
      .join("\n");
    assert_eq!(assemble(&text).unwrap().words, words);
  }

  #[test]
  fn unknown_operation(){
    let (line, message) = error_line(assemble("Halt\nJump(r1)"));
    assert_eq!(line, 2);
    assert!(message.contains("Jump is not an operation"));
  }

  #[test]
  fn wrong_arity(){
    let (line, message) = error_line(assemble("Add(r1, r2)"));
    assert_eq!(line, 1);
    assert!(message.contains("requires 3 operands but was given 2"));
  }

  #[test]
  fn bad_operands(){
    assert!(error_line(assemble("Output(r8)")).1.contains("no register r8"));
    assert!(error_line(assemble("Output(7)")).1.contains("expected a register"));
    assert!(error_line(assemble("LoadImmediate(r1, r2)")).1.contains("expected a value"));
    assert!(error_line(assemble("LoadImmediate(r1, @nowhere)")).1.contains("undefined label"));
  }

  #[test]
  fn immediate_overflow(){
    let (line, message) = error_line(assemble("\n\nLoadImmediate(r1, 0x2000000)"));
    assert_eq!(line, 3);
    assert!(message.contains("25 bit field"));
    assert!(assemble("LoadImmediate(r1, 0x1FFFFFF)").is_ok());
  }

  #[test]
  fn duplicate_labels(){
    let (line, message) = error_line(assemble("a: Halt\na: Halt"));
    assert_eq!(line, 2);
    assert!(message.contains("already defined"));

    let (_, message) = error_line(assemble("a:\nb:\nHalt"));
    assert!(message.contains("already has the label `a`"));
  }

  #[test]
  fn syntax_errors(){
    let (line, message) = error_line(assemble("Halt\nAdd(r1, r2, r3"));
    assert_eq!(line, 2);
    assert!(message.starts_with("syntax error"));
    assert!(matches!(assemble("Output(r1) Output(r2)"), Err(Error::Assembly { line: 1, .. })));
  }
}
