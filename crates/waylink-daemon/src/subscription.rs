//! Callback tables with scoped subscriptions.
//!
//! [`HandlerTable::add`] returns a [`HandlerEntry`]; dropping the entry
//! removes the handler. Delivery walks a snapshot of the table and skips
//! handlers that were removed mid-delivery, so a handler may unsubscribe
//! itself or others while being called.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct Slot<F: ?Sized> {
    id: u64,
    live: Cell<bool>,
    handler: Box<F>,
}

struct Table<F: ?Sized> {
    next_id: u64,
    slots: Vec<Rc<Slot<F>>>,
}

/// Ordered collection of handlers of type `F`.
pub struct HandlerTable<F: ?Sized> {
    inner: Rc<RefCell<Table<F>>>,
}

impl<F: ?Sized> Default for HandlerTable<F> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Table {
                next_id: 0,
                slots: Vec::new(),
            })),
        }
    }
}

impl<F: ?Sized + 'static> HandlerTable<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler`; it stays subscribed while the entry is alive.
    pub fn add(&self, handler: Box<F>) -> HandlerEntry<F> {
        let mut table = self.inner.borrow_mut();
        let id = table.next_id;
        table.next_id += 1;
        let slot = Rc::new(Slot {
            id,
            live: Cell::new(true),
            handler,
        });
        table.slots.push(Rc::clone(&slot));
        HandlerEntry {
            table: Rc::downgrade(&self.inner),
            slot,
        }
    }

    /// Call `f` with every live handler, in subscription order.
    pub fn for_each(&self, mut f: impl FnMut(&F)) {
        let snapshot: Vec<Rc<Slot<F>>> = self.inner.borrow().slots.clone();
        for slot in snapshot {
            if slot.live.get() {
                f(&*slot.handler);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Live subscription in a [`HandlerTable`]. Dropping it unsubscribes.
#[must_use = "dropping the entry unsubscribes the handler"]
pub struct HandlerEntry<F: ?Sized> {
    table: Weak<RefCell<Table<F>>>,
    slot: Rc<Slot<F>>,
}

impl<F: ?Sized> HandlerEntry<F> {
    /// The subscribed handler.
    pub fn handler(&self) -> &F {
        &self.slot.handler
    }
}

impl<F: ?Sized> Drop for HandlerEntry<F> {
    fn drop(&mut self) {
        self.slot.live.set(false);
        if let Some(table) = self.table.upgrade() {
            let id = self.slot.id;
            table.borrow_mut().slots.retain(|slot| slot.id != id);
        }
    }
}
