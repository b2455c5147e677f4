//! In-memory view of the durable sync queue

use std::collections::HashSet;

use crate::models::SyncQueueItem;

/// Pending mutations in enqueue order
#[derive(Debug, Clone, Default)]
pub struct SyncQueue {
    items: Vec<SyncQueueItem>,
}

impl SyncQueue {
    pub fn new(items: Vec<SyncQueueItem>) -> Self {
        Self { items }
    }

    /// Append at the tail.
    pub fn push(&mut self, item: SyncQueueItem) {
        self.items.push(item);
    }

    pub fn remove(&mut self, id: &str) -> Option<SyncQueueItem> {
        let position = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(position))
    }

    pub fn get(&self, id: &str) -> Option<&SyncQueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Replace an item in place, keeping its position.
    pub fn replace(&mut self, item: SyncQueueItem) -> bool {
        match self.items.iter_mut().find(|queued| queued.id == item.id) {
            Some(queued) => {
                *queued = item;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in enqueue order.
    pub fn items(&self) -> &[SyncQueueItem] {
        &self.items
    }

    /// Items in drain order: priority band, then enqueue order.
    pub fn ordered(&self) -> Vec<&SyncQueueItem> {
        let mut ordered: Vec<(usize, &SyncQueueItem)> = self.items.iter().enumerate().collect();
        ordered.sort_by_key(|(position, item)| (item.priority.rank(), *position));
        ordered.into_iter().map(|(_, item)| item).collect()
    }

    /// Next item to attempt at `now_ms`.
    ///
    /// An item is eligible when it is due, not in `exclude`, and no older
    /// item for the same entity is still queued. Among eligible items the
    /// highest priority wins, then the oldest.
    pub fn next_ready(&self, now_ms: i64, exclude: &HashSet<String>) -> Option<&SyncQueueItem> {
        let mut seen_entities = HashSet::new();
        let mut best: Option<(u8, &SyncQueueItem)> = None;

        for item in &self.items {
            if !seen_entities.insert(item.entity_key()) {
                continue;
            }
            if exclude.contains(&item.id) || !item.is_due(now_ms) {
                continue;
            }
            let rank = item.priority.rank();
            // Positions only grow, so an equal rank never displaces the older item
            if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                best = Some((rank, item));
            }
        }

        best.map(|(_, item)| item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationType, SyncPriority};
    use serde_json::json;

    fn item(id: &str, priority: SyncPriority) -> SyncQueueItem {
        SyncQueueItem::new(OperationType::Update, "tasks", json!({"id": id}), 0)
            .with_priority(priority)
    }

    #[test]
    fn next_ready_prefers_priority_then_age() {
        let queue = SyncQueue::new(vec![
            item("a", SyncPriority::Low),
            item("b", SyncPriority::High),
            item("c", SyncPriority::Medium),
        ]);

        let order: Vec<String> = queue
            .ordered()
            .into_iter()
            .map(SyncQueueItem::entity_id)
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(
            queue.next_ready(0, &HashSet::new()).unwrap().entity_id(),
            "b"
        );
    }

    #[test]
    fn older_item_for_same_entity_blocks_newer_one() {
        let older = item("t1", SyncPriority::Low);
        let newer = item("t1", SyncPriority::High);
        let queue = SyncQueue::new(vec![older.clone(), newer]);

        assert_eq!(queue.next_ready(0, &HashSet::new()).unwrap().id, older.id);

        // Excluding the older item must not unblock the newer one.
        let exclude = HashSet::from([older.id]);
        assert!(queue.next_ready(0, &exclude).is_none());
    }

    #[test]
    fn items_not_yet_due_are_skipped() {
        let mut waiting = item("a", SyncPriority::High);
        waiting.next_attempt_at = Some(500);
        let ready = item("b", SyncPriority::Low);
        let queue = SyncQueue::new(vec![waiting.clone(), ready.clone()]);

        assert_eq!(queue.next_ready(100, &HashSet::new()).unwrap().id, ready.id);
        assert_eq!(queue.next_ready(500, &HashSet::new()).unwrap().id, waiting.id);
    }

    #[test]
    fn replace_keeps_position() {
        let first = item("a", SyncPriority::Medium);
        let second = item("b", SyncPriority::Medium);
        let mut queue = SyncQueue::new(vec![first.clone(), second]);

        let mut updated = first.clone();
        updated.retry_count = 2;
        assert!(queue.replace(updated));
        assert_eq!(queue.items()[0].retry_count, 2);
        assert!(queue.remove(&first.id).is_some());
        assert!(queue.remove(&first.id).is_none());
        assert_eq!(queue.len(), 1);
    }
}
