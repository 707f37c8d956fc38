/*!
  A register machine with eight 32 bit registers and a dynamically managed set of word
  addressed memory segments. Segment 0 holds the program being executed; every other segment
  is mapped and unmapped by the program itself.

  The pieces, leaves first:

   - `bitpack`: reading and writing bit fields of a word.
   - `memory`: the segment table and its pool of reusable identifiers.
   - `bytecode`: the instruction set, its binary encoding, and its assembly text.
   - `um`: the machine, which owns its memory and executes one instruction word at a time.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod bitpack;
pub mod bytecode;
pub mod error;
pub mod memory;
pub mod symboltable;
pub mod um;

pub use error::{Error, Result};
pub use um::{Status, UM};
