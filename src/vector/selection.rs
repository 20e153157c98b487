//! Selection vectors name the positions of a value vector that an operation
//! should touch. The unfiltered form is a dense `0..len` range and carries
//! no position array.

use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionVector {
    positions: Option<SmallVec<[u64; 16]>>,
    len: usize,
}

impl SelectionVector {
    pub fn unfiltered(len: usize) -> Self {
        Self {
            positions: None,
            len,
        }
    }

    pub fn from_positions<I: IntoIterator<Item = u64>>(positions: I) -> Self {
        let positions: SmallVec<[u64; 16]> = positions.into_iter().collect();
        let len = positions.len();
        Self {
            positions: Some(positions),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_unfiltered(&self) -> bool {
        self.positions.is_none()
    }

    /// Position of the `i`-th selected element.
    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        match &self.positions {
            Some(positions) => positions[i],
            None => i as u64,
        }
    }

    pub fn push(&mut self, pos: u64) {
        let positions = self
            .positions
            .get_or_insert_with(|| (0..self.len as u64).collect());
        positions.push(pos);
        self.len += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_selection_is_identity() {
        let sel = SelectionVector::unfiltered(4);
        assert!(sel.is_unfiltered());
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn pushing_materializes_positions() {
        let mut sel = SelectionVector::unfiltered(2);
        sel.push(7);
        assert!(!sel.is_unfiltered());
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec![0, 1, 7]);
    }
}
