/// Ephemeral selection of grid items
///
/// Keeps items in the order the user picked them, so bulk actions run
/// in that order. Never persisted.
#[derive(Debug, Clone)]
pub struct Selection<T> {
    items: Vec<T>,
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: PartialEq + Clone> Selection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the item, or unselect it if it was already selected.
    /// Returns true when the item is selected afterwards.
    pub fn toggle(&mut self, item: T) -> bool {
        if let Some(pos) = self.items.iter().position(|i| *i == item) {
            self.items.remove(pos);
            false
        } else {
            self.items.push(item);
            true
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Selected items in selection order
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Drop every item no longer present in `available`
    pub fn retain_available(&mut self, available: &[T]) {
        self.items.retain(|item| available.contains(item));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
