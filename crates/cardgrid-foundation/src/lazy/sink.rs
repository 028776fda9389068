//! Reactive ordered collection of materialized cards.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::GridError;
use crate::item::{Card, ItemId};

/// Change delivered to sink subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkChange {
    Appended { start: usize, count: usize },
    Cleared { removed: usize },
}

/// Identifier returned by [`DataSink::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkSubscription(u64);

type Listener = Rc<dyn Fn(SinkChange)>;

struct SinkInner<I> {
    cards: Vec<Card<I>>,
    revision: u64,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
}

/// Shared handle to the ordered card collection the windowing engine reads.
///
/// Appends are whole batches: observers never see a partially appended
/// sub-batch. Every mutation bumps [`revision`](Self::revision).
pub struct DataSink<I> {
    inner: Rc<RefCell<SinkInner<I>>>,
}

impl<I> Clone for DataSink<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<I> Default for DataSink<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> DataSink<I> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SinkInner {
                cards: Vec::new(),
                revision: 0,
                listeners: Vec::new(),
                next_listener: 1,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().cards.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.inner.borrow().revision
    }

    /// Runs `f` with the card at `index`, if present.
    pub fn with_card<R>(&self, index: usize, f: impl FnOnce(&Card<I>) -> R) -> Option<R> {
        self.inner.borrow().cards.get(index).map(f)
    }

    /// Appends `cards` as one atomic change. Returns the index of the first
    /// appended card.
    pub fn append_batch(&self, cards: Vec<Card<I>>) -> Result<usize, GridError> {
        let (start, count, listeners) = {
            let mut inner = self
                .inner
                .try_borrow_mut()
                .map_err(|_| GridError::transient("sink append", "sink is borrowed"))?;
            let start = inner.cards.len();
            let count = cards.len();
            if count == 0 {
                return Ok(start);
            }
            inner.cards.extend(cards);
            inner.revision += 1;
            (start, count, Self::listeners(&inner))
        };
        let change = SinkChange::Appended { start, count };
        for listener in listeners {
            listener(change);
        }
        Ok(start)
    }

    pub fn clear(&self) -> Result<(), GridError> {
        let (removed, listeners) = {
            let mut inner = self
                .inner
                .try_borrow_mut()
                .map_err(|_| GridError::transient("sink clear", "sink is borrowed"))?;
            let removed = inner.cards.len();
            inner.cards.clear();
            inner.revision += 1;
            (removed, Self::listeners(&inner))
        };
        let change = SinkChange::Cleared { removed };
        for listener in listeners {
            listener(change);
        }
        Ok(())
    }

    /// Registers a listener invoked after every change, outside the sink's
    /// internal borrow.
    pub fn subscribe(&self, listener: impl Fn(SinkChange) + 'static) -> SinkSubscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push((id, Rc::new(listener)));
        SinkSubscription(id)
    }

    pub fn unsubscribe(&self, subscription: SinkSubscription) {
        self.inner
            .borrow_mut()
            .listeners
            .retain(|(id, _)| *id != subscription.0);
    }

    fn listeners(inner: &SinkInner<I>) -> Vec<Listener> {
        inner
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }
}

impl<I: crate::item::GridItem> DataSink<I> {
    pub fn item_id(&self, index: usize) -> Option<ItemId> {
        self.with_card(index, Card::id)
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.inner.borrow().cards.iter().map(Card::id).collect()
    }
}

impl<I> fmt::Debug for DataSink<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DataSink")
            .field("len", &inner.cards.len())
            .field("revision", &inner.revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::GridItem;
    use std::cell::Cell;

    #[derive(Clone, Debug, PartialEq)]
    struct Num(u64);

    impl GridItem for Num {
        fn id(&self) -> ItemId {
            ItemId(self.0)
        }
    }

    fn cards(range: std::ops::Range<u64>) -> Vec<Card<Num>> {
        range.map(|n| Card::new(Num(n), None)).collect()
    }

    #[test]
    fn append_is_atomic_and_bumps_revision() {
        let sink = DataSink::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let reader = sink.clone();
        sink.subscribe(move |change| log.borrow_mut().push((change, reader.len())));

        assert_eq!(sink.append_batch(cards(0..4)), Ok(0));
        assert_eq!(sink.append_batch(cards(4..6)), Ok(4));
        assert_eq!(sink.revision(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![
                (SinkChange::Appended { start: 0, count: 4 }, 4),
                (SinkChange::Appended { start: 4, count: 2 }, 6),
            ]
        );
    }

    #[test]
    fn empty_append_is_not_a_change() {
        let sink: DataSink<Num> = DataSink::new();
        assert_eq!(sink.append_batch(Vec::new()), Ok(0));
        assert_eq!(sink.revision(), 0);
    }

    #[test]
    fn clear_notifies_and_unsubscribe_stops_delivery() {
        let sink = DataSink::new();
        sink.append_batch(cards(0..3)).unwrap();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let sub = sink.subscribe(move |change| {
            assert_eq!(change, SinkChange::Cleared { removed: 3 });
            counter.set(counter.get() + 1);
        });
        sink.clear().unwrap();
        sink.unsubscribe(sub);
        sink.clear().unwrap();
        assert_eq!(hits.get(), 1);
        assert!(sink.is_empty());
        assert_eq!(sink.item_id(0), None);
    }
}
