//! Segmented memory: a table of word arrays addressed by a reusable identifier.

use std::fmt::{Display, Formatter};

use prettytable::Table;
use tracing::debug;

use crate::bytecode::Word;
use crate::error::{Error, Result};
use crate::um::TABLE_DISPLAY_FORMAT;

pub type SegmentId = Word;
pub type Segment = Vec<Word>;

/// Identifier of the segment instructions are fetched from.
pub const PROGRAM_SEGMENT: SegmentId = 0;

/**
  Owns every mapped segment. Slot `i` of `segments` holds segment `i`, or `None` if `i` is
  unmapped. Identifiers released by `release` are pushed onto `unmapped` and handed out again,
  most recently released first, before a fresh identifier is minted.

  Segment 0 always exists and is never placed on the free stack.
*/
#[derive(Clone, Debug)]
pub struct SegmentStore {
  segments: Vec<Option<Segment>>,
  unmapped: Vec<SegmentId>,
  next_id:  Option<SegmentId>, // `None` once `SegmentId::MAX` has been handed out
}

impl SegmentStore {

  pub fn new(program: Segment) -> SegmentStore {
    SegmentStore {
      segments: vec![Some(program)],
      unmapped: vec![],
      next_id:  Some(1),
    }
  }

  // region Segment access

  pub fn get(&self, id: SegmentId) -> Result<&Segment> {
    match self.segments.get(id as usize) {
      Some(Some(segment)) => Ok(segment),
      _                   => Err(Error::UnmappedSegment(id)),
    }
  }

  pub fn get_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
    match self.segments.get_mut(id as usize) {
      Some(Some(segment)) => Ok(segment),
      _                   => Err(Error::UnmappedSegment(id)),
    }
  }

  pub fn is_mapped(&self, id: SegmentId) -> bool {
    self.get(id).is_ok()
  }

  /// The segment instructions are fetched from.
  pub fn program(&self) -> &Segment {
    match self.segments.first() {
      Some(Some(program)) => program,
      // Nothing can unmap segment 0.
      _ => unreachable!("the program segment is always mapped"),
    }
  }

  /// Reads word `offset` of segment `id`.
  pub fn load(&self, id: SegmentId, offset: Word) -> Result<Word> {
    let segment = self.get(id)?;
    segment
      .get(offset as usize)
      .copied()
      .ok_or(Error::SegmentOutOfBounds { id, offset, length: segment.len() })
  }

  /// Writes `value` to word `offset` of segment `id`.
  pub fn store(&mut self, id: SegmentId, offset: Word, value: Word) -> Result<()> {
    let segment = self.get_mut(id)?;
    let length  = segment.len();
    match segment.get_mut(offset as usize) {
      Some(word) => {
        *word = value;
        Ok(())
      }
      None => Err(Error::SegmentOutOfBounds { id, offset, length }),
    }
  }

  // endregion

  // region Mapping and unmapping

  /**
    Maps a new segment of `size` zero words and returns its identifier. Released identifiers
    are reused, most recently released first, before a fresh one is minted.

    The segment is built before an identifier is taken, so a segment too large to allocate
    leaves the free stack and the next fresh identifier as they were.
  */
  pub fn allocate(&mut self, size: Word) -> Result<SegmentId> {
    let segment = Self::zeroed_segment(size)?;

    let id = match self.unmapped.pop() {
      Some(id) => id,
      None     => self.fresh_id()?,
    };

    let idx = id as usize;
    if idx >= self.segments.len() {
      self.segments.resize(idx + 1, None);
    }
    debug_assert!(self.segments[idx].is_none(), "segment {} reused while mapped", id);
    self.segments[idx] = Some(segment);

    debug!(id, size, "mapped segment");
    Ok(id)
  }

  fn zeroed_segment(size: Word) -> Result<Segment> {
    let mut segment = Segment::new();
    segment
      .try_reserve_exact(size as usize)
      .map_err(|_| Error::SegmentTooLarge { size })?;
    segment.resize(size as usize, 0);
    Ok(segment)
  }

  /// Mints the next never-used identifier. `SegmentId::MAX` is the last one.
  fn fresh_id(&mut self) -> Result<SegmentId> {
    let id = self.next_id.ok_or(Error::SegmentIdsExhausted)?;
    self.next_id = id.checked_add(1);
    Ok(id)
  }

  /// Unmaps segment `id` and makes its identifier available to `allocate`.
  pub fn release(&mut self, id: SegmentId) -> Result<()> {
    if id == PROGRAM_SEGMENT {
      return Err(Error::ReleaseProgramSegment);
    }
    match self.segments.get_mut(id as usize) {
      Some(slot) if slot.is_some() => {
        *slot = None;
        self.unmapped.push(id);
        debug!(id, "unmapped segment");
        Ok(())
      }
      _ => Err(Error::UnmappedSegment(id)),
    }
  }

  /**
    Replaces the program segment with a copy of segment `source`. The copy is built before
    segment 0 is touched, so a failed lookup leaves the program intact. Loading segment 0 onto
    itself does nothing.
  */
  pub fn replace_program(&mut self, source: SegmentId) -> Result<()> {
    if source == PROGRAM_SEGMENT {
      return Ok(());
    }
    let program = self.get(source)?.clone();
    debug!(source, length = program.len(), "loaded program");
    self.segments[PROGRAM_SEGMENT as usize] = Some(program);
    Ok(())
  }

  // endregion

  /// The number of segments currently mapped, including the program.
  pub fn mapped_count(&self) -> usize {
    self.segments.iter().filter(|slot| slot.is_some()).count()
  }

  fn make_segment_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Segment", ubl->"Words"]);

    for (id, slot) in self.segments.iter().enumerate() {
      if let Some(segment) = slot {
        table.add_row(row![r->format!("m[{}]", id), segment.len()]);
      }
    }
    table
  }
}

impl Display for SegmentStore {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} mapped, {} free\n{}",
      self.mapped_count(),
      self.unmapped.len(),
      self.make_segment_table()
    )
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_store_holds_program(){
    let store = SegmentStore::new(vec![1, 2, 3]);
    assert_eq!(store.get(0).unwrap(), &vec![1, 2, 3]);
    assert_eq!(store.program().len(), 3);
    assert_eq!(store.mapped_count(), 1);

    let empty = SegmentStore::new(vec![]);
    assert!(empty.get(0).unwrap().is_empty());
  }

  #[test]
  fn new_segment_is_zeroed(){
    let mut store = SegmentStore::new(vec![]);
    let id = store.allocate(10).unwrap();
    let segment = store.get(id).unwrap();
    assert_eq!(segment.len(), 10);
    assert!(segment.iter().all(|&word| word == 0));

    let empty = store.allocate(0).unwrap();
    assert!(store.get(empty).unwrap().is_empty());
  }

  #[test]
  fn first_id_is_reused(){
    let mut store = SegmentStore::new(vec![]);
    assert_eq!(store.allocate(32).unwrap(), 1);
    store.release(1).unwrap();
    assert_eq!(store.allocate(5).unwrap(), 1);
    assert_eq!(store.get(1).unwrap().len(), 5);
  }

  #[test]
  fn ids_reused_most_recent_first(){
    let mut store = SegmentStore::new(vec![]);
    let ids: Vec<SegmentId> = (0..64).map(|_| store.allocate(32).unwrap()).collect();
    assert_eq!(ids, (1..=64).collect::<Vec<SegmentId>>());

    for &id in ids.iter() {
      store.release(id).unwrap();
    }
    let reused: Vec<SegmentId> = (0..64).map(|_| store.allocate(32).unwrap()).collect();
    assert_eq!(reused, (1..=64).rev().collect::<Vec<SegmentId>>());

    // The pool is empty again, so the next id is fresh.
    assert_eq!(store.allocate(1).unwrap(), 65);
  }

  #[test]
  fn reuse_never_collides_with_live_segments(){
    let mut store = SegmentStore::new(vec![]);
    let live  = store.allocate(4).unwrap();
    let freed = store.allocate(4).unwrap();
    store.store(live, 0, 0xFEED).unwrap();
    store.release(freed).unwrap();

    let again = store.allocate(4).unwrap();
    let fresh = store.allocate(4).unwrap();
    assert_eq!(again, freed);
    assert_ne!(again, live);
    assert_ne!(fresh, live);
    assert_ne!(fresh, again);
    assert_eq!(store.load(live, 0).unwrap(), 0xFEED);
  }

  #[test]
  fn words_persist(){
    let mut store = SegmentStore::new(vec![]);
    let id = store.allocate(10).unwrap();
    store.store(id, 0, 1).unwrap();
    store.get_mut(id).unwrap()[1] = 2;
    assert_eq!(store.load(id, 0).unwrap(), 1);
    assert_eq!(store.load(id, 1).unwrap(), 2);
  }

  #[test]
  fn released_segment_is_unmapped(){
    let mut store = SegmentStore::new(vec![]);
    let id = store.allocate(10).unwrap();
    store.release(id).unwrap();
    assert!(!store.is_mapped(id));
    assert!(matches!(store.get(id), Err(Error::UnmappedSegment(i)) if i == id));
    assert!(matches!(store.load(id, 0), Err(Error::UnmappedSegment(_))));
  }

  #[test]
  fn release_faults(){
    let mut store = SegmentStore::new(vec![7]);
    assert!(matches!(store.release(0), Err(Error::ReleaseProgramSegment)));
    assert!(matches!(store.release(3), Err(Error::UnmappedSegment(3))));

    let id = store.allocate(1).unwrap();
    store.release(id).unwrap();
    assert!(matches!(store.release(id), Err(Error::UnmappedSegment(_))));
    // A failed release does not push the id a second time.
    assert_eq!(store.allocate(1).unwrap(), id);
    assert_eq!(store.allocate(1).unwrap(), 2);
  }

  #[test]
  fn out_of_bounds_offsets(){
    let mut store = SegmentStore::new(vec![]);
    let id = store.allocate(2).unwrap();
    assert!(matches!(
      store.load(id, 2),
      Err(Error::SegmentOutOfBounds { offset: 2, length: 2, .. })
    ));
    assert!(store.store(id, 5, 1).is_err());
    assert!(store.load(0, 0).is_err());
  }

  #[test]
  fn replace_program_copies(){
    let mut store = SegmentStore::new(vec![9, 9]);
    let id = store.allocate(16).unwrap();
    for offset in 0..16 {
      store.store(id, offset, offset * 3).unwrap();
    }

    store.replace_program(id).unwrap();
    assert_eq!(store.program(), store.get(id).unwrap());

    // The copy is independent of its source.
    store.store(id, 0, 0xAAAA).unwrap();
    assert_eq!(store.load(0, 0).unwrap(), 0);
    store.store(0, 1, 0xBBBB).unwrap();
    assert_eq!(store.load(id, 1).unwrap(), 3);
  }

  #[test]
  fn replace_program_with_itself(){
    let mut store = SegmentStore::new(vec![1, 2, 3]);
    store.replace_program(0).unwrap();
    assert_eq!(store.program(), &vec![1, 2, 3]);

    assert!(matches!(store.replace_program(4), Err(Error::UnmappedSegment(4))));
    assert_eq!(store.program(), &vec![1, 2, 3]);
  }

  #[test]
  fn display_lists_mapped_segments(){
    let mut store = SegmentStore::new(vec![1, 2, 3]);
    store.allocate(8).unwrap();
    let text = store.to_string();
    assert!(text.starts_with("2 mapped, 0 free"));
    assert!(text.contains("m[1]"));
  }

  #[test]
  fn oversized_segment_leaves_pool_untouched(){
    let mut store = SegmentStore::new(vec![]);
    let id = store.allocate(4).unwrap();
    store.release(id).unwrap();

    assert!(matches!(
      store.allocate(Word::MAX),
      Err(Error::SegmentTooLarge { size: Word::MAX })
    ));
    assert_eq!(store.mapped_count(), 1);

    // The released id is still on top of the free stack, and no fresh id was consumed.
    assert_eq!(store.allocate(4).unwrap(), id);
    assert_eq!(store.allocate(4).unwrap(), 2);
  }

  #[test]
  fn last_identifier_is_minted(){
    let mut store = SegmentStore::new(vec![]);
    store.next_id = Some(SegmentId::MAX - 1);
    assert_eq!(store.fresh_id().unwrap(), SegmentId::MAX - 1);
    assert_eq!(store.fresh_id().unwrap(), SegmentId::MAX);
    assert!(matches!(store.fresh_id(), Err(Error::SegmentIdsExhausted)));

    // Exhaustion is reported before any segment is mapped.
    assert!(matches!(store.allocate(1), Err(Error::SegmentIdsExhausted)));
    assert_eq!(store.mapped_count(), 1);
  }
}
