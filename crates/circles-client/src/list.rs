use uuid::Uuid;

use circles_types::Keyed;

/// Ordered in-memory list in which no two entries share an id.
///
/// Every mutation goes through these methods; inserting an id that is
/// already present is a no-op, removing an absent id is a no-op.
#[derive(Debug, Clone)]
pub struct OptimisticList<T> {
    items: Vec<T>,
}

impl<T> Default for OptimisticList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> OptimisticList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded rows, keeping the first occurrence of each id.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut list = Self::new();
        list.replace_all(items);
        list
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.key() == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.items.iter().find(|item| item.key() == id)
    }

    /// Append unless an entry with the same id exists. Returns whether the
    /// item was added.
    pub fn push(&mut self, item: T) -> bool {
        if self.contains(item.key()) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Like `push`, at the front.
    pub fn prepend(&mut self, item: T) -> bool {
        if self.contains(item.key()) {
            return false;
        }
        self.items.insert(0, item);
        true
    }

    pub fn remove(&mut self, id: Uuid) -> Option<T> {
        self.position(id).map(|idx| self.items.remove(idx))
    }

    /// Mutate the entry with `id` in place. The closure must not change the id.
    pub fn update(&mut self, id: Uuid, f: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|item| item.key() == id) {
            Some(item) => {
                f(item);
                debug_assert_eq!(item.key(), id);
                true
            }
            None => false,
        }
    }

    pub fn replace_all(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.clear();
        for item in items {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: Uuid,
        body: &'static str,
    }

    impl Keyed for Entry {
        fn key(&self) -> Uuid {
            self.id
        }
    }

    fn entry(body: &'static str) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            body,
        }
    }

    #[test]
    fn push_deduplicates_by_id() {
        let mut list = OptimisticList::new();
        let first = entry("hello");
        assert!(list.push(first.clone()));
        assert!(!list.push(Entry {
            id: first.id,
            body: "echo"
        }));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(first.id).unwrap().body, "hello");
    }

    #[test]
    fn echo_before_optimistic_insert_still_yields_one_entry() {
        let mut list = OptimisticList::new();
        let msg = entry("hello");
        let echo = Entry {
            id: msg.id,
            body: "echo",
        };
        assert!(list.prepend(echo.clone()));
        assert!(!list.push(msg));
        assert_eq!(list.items(), &[echo]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut list = OptimisticList::from_items([entry("a"), entry("b")]);
        let id = list.items()[0].id;
        assert!(list.remove(id).is_some());
        assert!(list.remove(id).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn prepend_and_update_keep_order() {
        let a = entry("a");
        let b = entry("b");
        let mut list = OptimisticList::from_items([a.clone()]);
        list.prepend(b.clone());
        assert!(list.update(a.id, |e| e.body = "a2"));
        assert!(!list.update(Uuid::new_v4(), |e| e.body = "nope"));

        let bodies: Vec<_> = list.iter().map(|e| e.body).collect();
        assert_eq!(bodies, vec!["b", "a2"]);
    }

    #[test]
    fn from_items_drops_duplicate_ids() {
        let a = entry("a");
        let list = OptimisticList::from_items([
            a.clone(),
            Entry {
                id: a.id,
                body: "dup",
            },
        ]);
        assert_eq!(list.items(), &[a]);
    }
}
