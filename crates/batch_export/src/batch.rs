/// A borrowed, ordered view of the items handed to one export call.
///
/// Items appear in the order they were accepted by the queue. The batch is
/// only valid for the duration of [`Exporter::export`](crate::Exporter::export);
/// afterwards the processor recycles every item.
#[derive(Debug)]
pub struct Batch<'a, T> {
    items: &'a [T],
}

impl<T> Clone for Batch<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Batch<'_, T> {}

impl<'a, T> Batch<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        Self { items }
    }

    /// Number of items in the batch
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'a, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.items
    }
}

impl<'a, T> IntoIterator for Batch<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &Batch<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_view() {
        let items = vec![1, 2, 3];
        let batch = Batch::new(&items);

        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());
        assert_eq!(batch.iter().sum::<i32>(), 6);
        assert_eq!(batch.as_slice(), &[1, 2, 3]);

        let collected: Vec<_> = (&batch).into_iter().copied().collect();
        assert_eq!(collected, items);
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch::<u8>::new(&[]);
        assert!(batch.is_empty());
        assert_eq!(batch.into_iter().count(), 0);
    }
}
