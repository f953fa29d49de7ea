use heapless::Deque;

/// Fixed-capacity FIFO that evicts its oldest entry instead of rejecting a
/// push when full.
#[derive(Debug)]
pub struct RingBuffer<T, const N: usize> {
    inner: Deque<T, N>,
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub const fn new() -> Self {
        Self {
            inner: Deque::new(),
        }
    }

    /// Appends `item`, returning the evicted oldest entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.inner.is_full() {
            self.inner.pop_front()
        } else {
            None
        };

        // Cannot fail: a slot was freed above when the deque was full.
        let _ = self.inner.push_back(item);
        evicted
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.inner.iter().nth(index)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert!(ring.is_full());

        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn indexes_from_oldest_entry() {
        let mut ring: RingBuffer<&str, 2> = RingBuffer::new();
        ring.push("a");
        ring.push("b");
        ring.push("c");

        assert_eq!(ring.get(0), Some(&"b"));
        assert_eq!(ring.get(1), Some(&"c"));
        assert_eq!(ring.get(2), None);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut ring: RingBuffer<u8, 4> = RingBuffer::new();
        ring.push(7);
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);
    }
}
