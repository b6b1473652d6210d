//! Paged dense storage.
//!
//! Rows live in fixed-size blocks so growing the storage never moves rows that
//! are already stored. Removal swaps the last row into the hole, keeping the
//! rows dense for batch iteration; callers learn about the move through a
//! relocation callback and patch whatever index they keep.

pub struct BlockStorage<T> {
    rows_per_block: usize,
    shift: u32,
    mask: usize,
    blocks: Vec<Vec<T>>,
    len: usize,
}

impl<T> BlockStorage<T> {
    pub fn with_rows_per_block(rows_per_block: usize) -> Self {
        assert!(rows_per_block.is_power_of_two() && rows_per_block > 0);
        Self {
            rows_per_block,
            shift: rows_per_block.trailing_zeros(),
            mask: rows_per_block - 1,
            blocks: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn rows_per_block(&self) -> usize {
        self.rows_per_block
    }

    #[inline]
    fn block_of(&self, index: usize) -> usize {
        index >> self.shift
    }

    #[inline]
    fn local_of(&self, index: usize) -> usize {
        index & self.mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Append a row and return its dense index.
    pub fn push(&mut self, value: T) -> usize {
        let index = self.len;
        let block = self.block_of(index);
        if block == self.blocks.len() {
            self.blocks.push(Vec::with_capacity(self.rows_per_block));
        }
        self.blocks[block].push(value);
        self.len += 1;
        index
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.blocks
            .get(self.block_of(index))?
            .get(self.local_of(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let block = self.block_of(index);
        let local = self.local_of(index);
        self.blocks.get_mut(block)?.get_mut(local)
    }

    /// Remove the row at `index`, moving the last row into its place.
    ///
    /// `relocated(from, to)` is called when a row changed its dense index.
    pub fn swap_remove(
        &mut self,
        index: usize,
        mut relocated: impl FnMut(usize, usize),
    ) -> Option<T> {
        if index >= self.len {
            return None;
        }
        let last = self.len - 1;
        let last_block = self.block_of(last);
        let tail = self.blocks[last_block].pop()?;
        self.len -= 1;
        if self.blocks[last_block].is_empty() {
            self.blocks.pop();
        }

        if index == last {
            return Some(tail);
        }

        let local = self.local_of(index);
        let block = self.block_of(index);
        let removed = std::mem::replace(&mut self.blocks[block][local], tail);
        relocated(last, index);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.blocks.iter().flat_map(|block| block.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.blocks.iter_mut().flat_map(|block| block.iter_mut())
    }
}
