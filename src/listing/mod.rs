//! Generic logic for code listings (TAC, assembly, etc).

mod position;

use std::slice::Iter;

pub use position::*;

/// An ordered sequence of lines, addressed by [`Position`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    lines: Vec<T>,
}

impl<T> Listing<T> {
    pub fn new() -> Self {
        Self { lines: vec![] }
    }

    pub fn push(&mut self, line: T) {
        self.lines.push(line);
    }

    pub fn iter_lines(&self) -> LinesIter<T> {
        LinesIter {
            inner: self.lines.iter(),
            position: Position(0),
        }
    }

    pub fn iter_instructions(&self) -> Iter<T> {
        self.lines.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.lines
    }
}
impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> From<Vec<T>> for Listing<T> {
    fn from(lines: Vec<T>) -> Self {
        Self { lines }
    }
}
impl<T> FromIterator<T> for Listing<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

pub struct LinesIter<'item, T> {
    inner: Iter<'item, T>,
    position: Position,
}

impl<'item, T> Iterator for LinesIter<'item, T> {
    type Item = (Position, &'item T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|v| {
            let current = self.position;
            self.position = current + 1;
            (current, v)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_numbered_from_zero() {
        let listing: Listing<_> = vec!["a", "b", "c"].into();
        let positions: Vec<_> = listing.iter_lines().map(|(p, l)| (p.0, *l)).collect();

        assert_eq!(vec![(0, "a"), (1, "b"), (2, "c")], positions);
    }
}
