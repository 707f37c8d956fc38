use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bytecode::Word;

/**
  A symbol table maps assembly labels to the address of the instruction they label in the
  program segment. A symbol table is really just a convenience wrapper around a BiMap, so an
  address carries at most one label.
*/
#[derive(Clone, Debug, Default)]
pub struct SymbolTable{
  table: BiMap<DefaultAtom, Word>
}

impl SymbolTable{

  pub fn new() -> SymbolTable {
    SymbolTable{
      table: BiMap::new()
    }
  }

  pub fn get_symbol(&self, address: Word) -> Option<DefaultAtom>{
    self.table.get_by_right(&address).cloned()
  }

  pub fn get_address(&self, name: &str) -> Option<Word>{
    self.table.get_by_left(&DefaultAtom::from(name)).cloned()
  }

  /// Fails, handing the pair back, when either the name or the address is already taken.
  pub fn insert(&mut self, name: &str, address: Word)
    -> Result<(), (DefaultAtom, Word)>{
    self.table.insert_no_overwrite(DefaultAtom::from(name), address)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}
