//! Index-stable storage for the runtime's live tasks.
//!
//! Keys are handed out before insertion (see [`Slab::vacant_key`]) so a task
//! can carry its own key and release itself once its future completes.

pub(crate) struct Slab<T> {
    entries: Vec<Option<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Key the next call to [`Slab::insert`] will return.
    pub(crate) fn vacant_key(&self) -> usize {
        match self.free.last() {
            Some(&index) => index,
            None => self.entries.len(),
        }
    }

    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(item);
                index
            }
            None => {
                self.entries.push(Some(item));
                self.entries.len() - 1
            }
        };

        self.len += 1;

        index
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.entries.get_mut(index)?.take()?;

        self.free.push(index);
        self.len -= 1;

        Some(item)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Removes every stored item, leaving the slab empty.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.free.clear();
        self.len = 0;

        self.entries.drain(..).flatten().collect()
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}
