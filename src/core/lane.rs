//! Per-priority FIFO lanes.
//!
//! Each lane keeps insertion order with an ordered map keyed by a lane-local
//! sequence number, plus an id index so removal by identifier does not scan.
//! Every operation is `O(log n)`.

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

use crate::util::serde::{OperationId, Priority};

/// Item that can wait in a [`PriorityLane`].
pub trait LaneEntry {
    /// Identifier used for removal and duplicate detection.
    fn id(&self) -> OperationId;
    /// When the item last entered its lane; drives aging and FIFO tie-breaks.
    fn entered_at(&self) -> Instant;
}

/// FIFO sequence of items sharing one priority level.
#[derive(Debug)]
pub struct PriorityLane<T> {
    priority: Priority,
    entries: BTreeMap<u64, T>,
    index: HashMap<OperationId, u64>,
    next_seq: u64,
}

impl<T: LaneEntry> PriorityLane<T> {
    /// Create an empty lane.
    #[must_use]
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Priority served by this lane.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Append an item. An item already present under the same id loses its
    /// old position, so an id never appears twice.
    pub fn push_tail(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(previous) = self.index.insert(item.id(), seq) {
            self.entries.remove(&previous);
        }
        self.entries.insert(seq, item);
    }

    /// Oldest item, if any.
    #[must_use]
    pub fn peek_head(&self) -> Option<&T> {
        self.entries.first_key_value().map(|(_, item)| item)
    }

    /// Remove and return the oldest item.
    pub fn pop_head(&mut self) -> Option<T> {
        let (_, item) = self.entries.pop_first()?;
        self.index.remove(&item.id());
        Some(item)
    }

    /// Remove an item by identifier.
    pub fn remove(&mut self, id: &OperationId) -> Option<T> {
        let seq = self.index.remove(id)?;
        self.entries.remove(&seq)
    }

    /// Whether an item with this id is waiting here.
    #[must_use]
    pub fn contains(&self, id: &OperationId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of waiting items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the lane is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Items in FIFO order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Remove every item, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.index.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

/// One lane per priority level.
#[derive(Debug)]
pub struct LaneSet<T> {
    lanes: [PriorityLane<T>; Priority::COUNT],
}

impl<T: LaneEntry> Default for LaneSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LaneEntry> LaneSet<T> {
    /// Create five empty lanes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lanes: Priority::ALL.map(PriorityLane::new),
        }
    }

    /// Lane for a priority.
    #[must_use]
    pub fn lane(&self, priority: Priority) -> &PriorityLane<T> {
        &self.lanes[priority.level()]
    }

    /// Mutable lane for a priority.
    pub fn lane_mut(&mut self, priority: Priority) -> &mut PriorityLane<T> {
        &mut self.lanes[priority.level()]
    }

    /// Lanes from `Critical` to `Idle`.
    pub fn iter(&self) -> impl Iterator<Item = &PriorityLane<T>> {
        self.lanes.iter()
    }

    /// Remove an item from whichever lane holds it.
    pub fn remove(&mut self, id: &OperationId) -> Option<T> {
        self.lanes.iter_mut().find_map(|lane| lane.remove(id))
    }

    /// Waiting items per priority, `Critical` first.
    #[must_use]
    pub fn lengths(&self) -> [usize; Priority::COUNT] {
        let mut out = [0; Priority::COUNT];
        for (slot, lane) in out.iter_mut().zip(&self.lanes) {
            *slot = lane.len();
        }
        out
    }

    /// Waiting items across all lanes.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.lanes.iter().map(PriorityLane::len).sum()
    }

    /// Whether every lane is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(PriorityLane::is_empty)
    }

    /// Remove every item from every lane.
    pub fn drain(&mut self) -> Vec<T> {
        self.lanes.iter_mut().flat_map(PriorityLane::drain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    struct Item {
        id: OperationId,
        at: Instant,
    }

    impl LaneEntry for Item {
        fn id(&self) -> OperationId {
            self.id
        }
        fn entered_at(&self) -> Instant {
            self.at
        }
    }

    fn item() -> Item {
        Item {
            id: OperationId::new(),
            at: Instant::now(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut lane = PriorityLane::new(Priority::High);
        let (a, b, c) = (item(), item(), item());
        let ids = [a.id, b.id, c.id];
        lane.push_tail(a);
        lane.push_tail(b);
        lane.push_tail(c);

        assert_eq!(lane.peek_head().map(|i| i.id), Some(ids[0]));
        let popped: Vec<_> = std::iter::from_fn(|| lane.pop_head()).map(|i| i.id).collect();
        assert_eq!(popped, ids);
        assert!(lane.is_empty());
    }

    #[test]
    fn test_remove_by_id() {
        let mut lane = PriorityLane::new(Priority::Normal);
        let (a, b) = (item(), item());
        let (a_id, b_id) = (a.id, b.id);
        lane.push_tail(a);
        lane.push_tail(b);

        assert!(lane.remove(&a_id).is_some());
        assert!(lane.remove(&a_id).is_none());
        assert!(!lane.contains(&a_id));
        assert_eq!(lane.len(), 1);
        assert_eq!(lane.pop_head().map(|i| i.id), Some(b_id));
    }

    #[test]
    fn test_repush_moves_to_tail() {
        let mut lane = PriorityLane::new(Priority::Low);
        let first = item();
        let first_id = first.id;
        let second = item();
        let second_id = second.id;
        lane.push_tail(first);
        lane.push_tail(second);

        let again = lane.remove(&first_id).expect("present");
        lane.push_tail(again);
        assert_eq!(lane.pop_head().map(|i| i.id), Some(second_id));
        assert_eq!(lane.pop_head().map(|i| i.id), Some(first_id));
    }

    #[test]
    fn test_duplicate_id_keeps_single_entry() {
        let mut lane = PriorityLane::new(Priority::Idle);
        let id = OperationId::new();
        let at = Instant::now();
        lane.push_tail(Item { id, at });
        lane.push_tail(Item {
            id,
            at: at + Duration::from_secs(1),
        });
        assert_eq!(lane.len(), 1);
    }

    #[test]
    fn test_lane_set_lengths() {
        let mut lanes = LaneSet::new();
        lanes.lane_mut(Priority::Critical).push_tail(item());
        lanes.lane_mut(Priority::Idle).push_tail(item());
        let low = item();
        let low_id = low.id;
        lanes.lane_mut(Priority::Low).push_tail(low);

        assert_eq!(lanes.lengths(), [1, 0, 0, 1, 1]);
        assert_eq!(lanes.total_len(), 3);
        assert!(lanes.remove(&low_id).is_some());
        assert_eq!(lanes.total_len(), 2);
        assert_eq!(lanes.drain().len(), 2);
        assert!(lanes.is_empty());
    }
}
