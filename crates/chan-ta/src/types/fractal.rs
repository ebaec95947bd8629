//! Fractals and the bounded lists strokes and segments are stored in.

use std::ops::Deref;

use chan_core::{Candle, Timestamp};
use serde::{Deserialize, Serialize};

/// Turning point orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FractalKind {
    Top,
    Bottom,
}

impl FractalKind {
    pub fn opposite(self) -> FractalKind {
        match self {
            FractalKind::Top => FractalKind::Bottom,
            FractalKind::Bottom => FractalKind::Top,
        }
    }
}

/// A three-candle turning point on the merged candle sequence.
///
/// Strokes and segments reuse this shape: each stroke or segment is stored as
/// the fractal that ends it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fractal {
    /// High of the middle candle.
    pub high: f32,
    /// Low of the middle candle.
    pub low: f32,
    pub timestamp: Timestamp,
    pub kind: FractalKind,
    /// Position of the middle candle in the merged candle sequence.
    pub index: usize,
}

impl Fractal {
    pub fn new(candle: &Candle, kind: FractalKind, index: usize) -> Self {
        Self {
            high: candle.high,
            low: candle.low,
            timestamp: candle.timestamp,
            kind,
            index,
        }
    }

    /// The price this point turns at: the high of a top, the low of a bottom.
    pub fn extreme(&self) -> f32 {
        match self.kind {
            FractalKind::Top => self.high,
            FractalKind::Bottom => self.low,
        }
    }

    pub fn is_top(&self) -> bool {
        self.kind == FractalKind::Top
    }

    pub fn is_bottom(&self) -> bool {
        self.kind == FractalKind::Bottom
    }

    /// Whether this point is a strictly more extreme turn of the same kind.
    pub fn exceeds(&self, other: &Fractal) -> bool {
        match self.kind {
            FractalKind::Top => self.high > other.high,
            FractalKind::Bottom => self.low < other.low,
        }
    }
}

/// Append-mostly list whose history can only be revised one step back.
///
/// The newest element may be replaced (extension) and so may the one before
/// it (correction). Nothing older is ever rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureList<T> {
    items: Vec<T>,
}

impl<T> Default for StructureList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The revisable tail of a [`StructureList`], saved so later pushes and
/// revisions can be undone.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint<T> {
    len: usize,
    tail: Vec<T>,
}

impl<T> StructureList<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Replace the newest element. Returns false on an empty list.
    pub fn replace_last(&mut self, item: T) -> bool {
        match self.items.last_mut() {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Replace the element before the newest. Returns false if there is none.
    pub fn replace_second_last(&mut self, item: T) -> bool {
        let len = self.items.len();
        if len < 2 {
            return false;
        }
        self.items[len - 2] = item;
        true
    }

    /// Element `back` positions from the end; `from_end(1)` is the newest.
    pub fn from_end(&self, back: usize) -> Option<&T> {
        let len = self.items.len();
        if back == 0 || back > len {
            return None;
        }
        self.items.get(len - back)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Deref for StructureList<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T: Clone> StructureList<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }

    pub fn checkpoint(&self) -> Checkpoint<T> {
        let start = self.items.len().saturating_sub(2);
        Checkpoint {
            len: self.items.len(),
            tail: self.items[start..].to_vec(),
        }
    }

    /// Return to `checkpoint`. Only exact if the list has been pushed to and
    /// revised, never cleared, since it was taken.
    pub fn restore(&mut self, checkpoint: Checkpoint<T>) {
        self.items.truncate(checkpoint.len);
        let start = self.items.len().saturating_sub(checkpoint.tail.len());
        for (slot, item) in self.items[start..].iter_mut().zip(checkpoint.tail) {
            *slot = item;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_is_bounded_to_one_step() {
        let mut list = StructureList::new();
        assert!(!list.replace_last(1));
        list.push(1);
        assert!(!list.replace_second_last(9));
        list.push(2);
        list.push(3);

        assert!(list.replace_last(30));
        assert!(list.replace_second_last(20));
        assert_eq!(list.as_slice(), &[1, 20, 30]);
        assert_eq!(list.from_end(1), Some(&30));
        assert_eq!(list.from_end(3), Some(&1));
        assert_eq!(list.from_end(4), None);
    }

    #[test]
    fn test_restore_undoes_pushes_and_revisions() {
        let mut list = StructureList::new();
        list.push(1);
        list.push(2);
        list.push(3);
        let checkpoint = list.checkpoint();

        list.replace_last(30);
        list.push(4);
        list.replace_second_last(31);
        list.push(5);
        list.restore(checkpoint);
        assert_eq!(list.as_slice(), &[1, 2, 3]);

        let mut empty: StructureList<i32> = StructureList::default();
        let checkpoint = empty.checkpoint();
        empty.push(7);
        empty.restore(checkpoint);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_exceeds_by_kind() {
        let candle = Candle::new(0, 10.0, 12.0, 8.0, 11.0, 1.0);
        let top = Fractal::new(&candle, FractalKind::Top, 3);
        let higher = Fractal {
            high: 13.0,
            ..top
        };
        assert!(higher.exceeds(&top));
        assert!(!top.exceeds(&top));

        let bottom = Fractal::new(&candle, FractalKind::Bottom, 3);
        let lower = Fractal { low: 7.5, ..bottom };
        assert!(lower.exceeds(&bottom));
        assert_eq!(lower.extreme(), 7.5);
    }
}
