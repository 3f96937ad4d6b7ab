use std::fmt;

/// Number of cells along each side of a sub-grid.
pub const SUB_GRID_TREE_DIMENSION: u32 = 32;

/// Number of bits needed to address a cell within a sub-grid along one axis.
pub const SUB_GRID_INDEX_BITS_PER_LEVEL: u32 = 5;

/// Mask isolating the in-sub-grid part of a cell address.
pub const SUB_GRID_LOCAL_KEY_MASK: u32 = SUB_GRID_TREE_DIMENSION - 1;

/// A set of at most 32 elements, one bit per element.
///
/// A `RowSet` holds one row (constant X, varying Y) of a [`SubGridBitMask`].
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct RowSet(u32);

impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.into_iter().collect::<Vec<u32>>().fmt(f)
    }
}

pub struct RowSetIterator(RowSet);

impl Iterator for RowSetIterator {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.pop_lowest()
    }
}

impl IntoIterator for RowSet {
    type Item = u32;
    type IntoIter = RowSetIterator;
    fn into_iter(self) -> Self::IntoIter {
        RowSetIterator(self)
    }
}

impl RowSet {
    /// Returns an empty `RowSet`.
    #[inline]
    pub fn empty() -> RowSet {
        RowSet(0u32)
    }

    /// Returns a `RowSet` with all 32 elements set.
    #[inline]
    pub fn full() -> RowSet {
        RowSet(u32::MAX)
    }

    /// Creates a `RowSet` from its raw bits. Bit `i` stands for element `i`.
    #[inline]
    pub fn from_bits(bits: u32) -> RowSet {
        RowSet(bits)
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns the set of elements within `[from, to]`, both included.
    ///
    /// Both bounds are assumed to be lower than 32 and `from <= to`.
    #[inline]
    pub fn range_inclusive(from: u32, to: u32) -> RowSet {
        debug_assert!(from <= to && to < SUB_GRID_TREE_DIMENSION);
        let upper = if to == 31 {
            u32::MAX
        } else {
            (1u32 << (to + 1)) - 1
        };
        let lower = (1u32 << from) - 1;
        RowSet(upper & !lower)
    }

    /// Returns true iff the `RowSet` contains the element `el`.
    #[inline]
    pub fn contains(self, el: u32) -> bool {
        !self.intersect(RowSet::singleton(el)).is_empty()
    }

    /// Returns the number of elements in the `RowSet`.
    #[inline]
    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    #[inline]
    #[must_use]
    pub fn intersect(self, other: RowSet) -> RowSet {
        RowSet(self.0 & other.0)
    }

    #[inline]
    #[must_use]
    pub fn union(self, other: RowSet) -> RowSet {
        RowSet(self.0 | other.0)
    }

    /// Creates a new `RowSet` containing only one element within `[0; 32[`.
    #[inline]
    pub fn singleton(el: u32) -> RowSet {
        RowSet(1u32 << el)
    }

    /// Inserts `el` and returns true if the set changed.
    #[inline]
    pub fn insert_mut(&mut self, el: u32) -> bool {
        let old = *self;
        *self = old.union(RowSet::singleton(el));
        old != *self
    }

    /// Removes `el` and returns true if the set changed.
    #[inline]
    pub fn remove_mut(&mut self, el: u32) -> bool {
        let old = *self;
        *self = RowSet(old.0 & !RowSet::singleton(el).0);
        old != *self
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0u32
    }

    /// Returns the lowest element in the `RowSet` and removes it.
    #[inline]
    pub fn pop_lowest(&mut self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            let lowest = self.0.trailing_zeros();
            self.0 ^= RowSet::singleton(lowest).0;
            Some(lowest)
        }
    }
}

/// A 32x32 bit mask. Each bit flags one cell of a sub-grid.
///
/// Cells are addressed as `(x, y)` with both coordinates in `[0, 32)`.
/// Iteration is x-major: every set `y` of row `x = 0`, then row `x = 1`, etc.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct SubGridBitMask {
    rows: [RowSet; SUB_GRID_TREE_DIMENSION as usize],
    len: u32,
}

impl fmt::Debug for SubGridBitMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl SubGridBitMask {
    /// Creates a mask with no bit set.
    pub fn empty() -> SubGridBitMask {
        SubGridBitMask::default()
    }

    /// Creates a mask with all 1024 bits set.
    pub fn full() -> SubGridBitMask {
        SubGridBitMask {
            rows: [RowSet::full(); SUB_GRID_TREE_DIMENSION as usize],
            len: SUB_GRID_TREE_DIMENSION * SUB_GRID_TREE_DIMENSION,
        }
    }

    /// Number of bits set.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.rows[x as usize].contains(y)
    }

    /// Sets the bit at `(x, y)`. Returns true if the mask changed.
    #[inline]
    pub fn insert(&mut self, x: u32, y: u32) -> bool {
        let changed = self.rows[x as usize].insert_mut(y);
        self.len += u32::from(changed);
        changed
    }

    /// Clears the bit at `(x, y)`. Returns true if the mask changed.
    #[inline]
    pub fn remove(&mut self, x: u32, y: u32) -> bool {
        let changed = self.rows[x as usize].remove_mut(y);
        self.len -= u32::from(changed);
        changed
    }

    /// Sets or clears the bit at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if value {
            self.insert(x, y);
        } else {
            self.remove(x, y);
        }
    }

    /// Returns the row of bits with constant `x`.
    #[inline]
    pub fn row(&self, x: u32) -> RowSet {
        self.rows[x as usize]
    }

    pub fn clear(&mut self) {
        self.rows = [RowSet::empty(); SUB_GRID_TREE_DIMENSION as usize];
        self.len = 0;
    }

    /// In-place intersection with `other`.
    pub fn intersect_update(&mut self, other: &SubGridBitMask) {
        self.len = 0;
        for (left, right) in self.rows.iter_mut().zip(other.rows.iter()) {
            *left = left.intersect(*right);
            self.len += left.len();
        }
    }

    /// In-place union with `other`.
    pub fn union_update(&mut self, other: &SubGridBitMask) {
        self.len = 0;
        for (left, right) in self.rows.iter_mut().zip(other.rows.iter()) {
            *left = left.union(*right);
            self.len += left.len();
        }
    }

    /// Iterates over the set bits, x-major.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.iter_in_range(0, SUB_GRID_TREE_DIMENSION - 1, 0, SUB_GRID_TREE_DIMENSION - 1)
    }

    /// Iterates over the set bits with `x` in `[min_x, max_x]` and `y` in `[min_y, max_y]`.
    pub fn iter_in_range(
        &self,
        min_x: u32,
        max_x: u32,
        min_y: u32,
        max_y: u32,
    ) -> impl Iterator<Item = (u32, u32)> + '_ {
        let column_filter = RowSet::range_inclusive(min_y, max_y);
        (min_x..=max_x).flat_map(move |x| {
            self.rows[x as usize]
                .intersect(column_filter)
                .into_iter()
                .map(move |y| (x, y))
        })
    }
}
