//! Slot registry that keeps late completions off recycled display slots.
//!
//! Every bind stamps the slot with a fresh epoch and, for Items that are not
//! settled yet, leaves a watcher `(slot, epoch)` on the Item. When the Item
//! finishes, each watcher is checked against the slot's current binding:
//! only exact `(item, epoch)` matches receive the update, everything else
//! is a stale notification and is dropped.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use super::item::ItemId;

/// A reusable display position, e.g. a recycled grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    item: ItemId,
    epoch: u64,
}

/// Outcome of routing one Item update.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Slots still bound to the Item under the epoch they asked with.
    pub slots: Vec<SlotId>,
    /// Watchers whose slot moved on.
    pub discarded: usize,
}

#[derive(Debug, Default)]
pub struct BindingGuard {
    bindings: HashMap<SlotId, Binding>,
    watchers: HashMap<ItemId, Vec<(SlotId, u64)>>,
    next_epoch: u64,
}

impl BindingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `slot -> item`, returning the Item it was bound to before.
    /// With `watch` set, the slot will be offered the Item's next update.
    pub fn bind(&mut self, slot: SlotId, item: ItemId, watch: bool) -> Option<ItemId> {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let previous = self.bindings.insert(slot, Binding { item, epoch });

        if watch {
            let watchers = self.watchers.entry(item).or_default();
            match watchers.iter_mut().find(|(s, _)| *s == slot) {
                Some(existing) => existing.1 = epoch,
                None => watchers.push((slot, epoch)),
            }
        }

        trace!(%slot, %item, epoch, "Bound slot");
        previous.map(|b| b.item)
    }

    /// Clear the slot's binding. Watchers stay behind and are discarded when
    /// the Item eventually reports.
    pub fn unbind(&mut self, slot: SlotId) -> Option<ItemId> {
        let previous = self.bindings.remove(&slot)?;
        trace!(%slot, item = %previous.item, "Unbound slot");
        Some(previous.item)
    }

    pub fn bound_item(&self, slot: SlotId) -> Option<ItemId> {
        self.bindings.get(&slot).map(|b| b.item)
    }

    /// Whether any slot currently shows `item`.
    pub fn is_bound(&self, item: ItemId) -> bool {
        self.bindings.values().any(|b| b.item == item)
    }

    /// Re-arm a watcher on every slot currently bound to `item` and return
    /// those slots.
    pub fn watch_bound_slots(&mut self, item: ItemId) -> Vec<SlotId> {
        let mut slots: Vec<(SlotId, u64)> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.item == item)
            .map(|(slot, b)| (*slot, b.epoch))
            .collect();
        slots.sort();
        self.watchers.insert(item, slots.clone());
        slots.into_iter().map(|(slot, _)| slot).collect()
    }

    /// Consume the Item's watchers and split them into live slots and stale
    /// notifications.
    pub fn on_item_updated(&mut self, item: ItemId) -> Delivery {
        let mut delivery = Delivery::default();
        for (slot, epoch) in self.watchers.remove(&item).unwrap_or_default() {
            match self.bindings.get(&slot) {
                Some(binding) if binding.item == item && binding.epoch == epoch => {
                    delivery.slots.push(slot);
                }
                _ => {
                    trace!(%slot, %item, "Discarding stale notification");
                    delivery.discarded += 1;
                }
            }
        }
        delivery
    }

    /// Forget all bindings and watchers, returning what was bound.
    pub fn clear(&mut self) -> Vec<(SlotId, ItemId)> {
        self.watchers.clear();
        let mut bound: Vec<_> = self
            .bindings
            .drain()
            .map(|(slot, binding)| (slot, binding.item))
            .collect();
        bound.sort();
        bound
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }
}
