//! Queue ordering and urgent promotion.
//!
//! Service order is `(priority ASC, queued_at ASC, id ASC)`. Promotion only
//! ever lowers an urgent entry's priority; ties with the entry it overtakes
//! are broken by arrival.

use std::cmp::Ordering;

use crate::models::QueueEntry;

/// A priority change the scheduler wants applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub entry_id: String,
    pub from: i64,
    pub to: i64,
}

/// Orders entries and plans urgent promotions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityScheduler;

impl PriorityScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Service-order comparison.
    pub fn compare(&self, a: &QueueEntry, b: &QueueEntry) -> Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.queued_at.cmp(&b.queued_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Sort into service order.
    pub fn order(&self, mut entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
        entries.sort_by(|a, b| self.compare(a, b));
        entries
    }

    /// 1-based position of `entry_id` within already ordered entries.
    pub fn compute_position(&self, entry_id: &str, ordered: &[QueueEntry]) -> Option<usize> {
        ordered.iter().position(|e| e.id == entry_id).map(|i| i + 1)
    }

    /// Priority that puts `entry` ahead of every other waiting entry.
    ///
    /// `None` when nobody else is waiting or it is already ahead.
    pub fn urgent_priority(&self, entry: &QueueEntry, waiting: &[QueueEntry]) -> Option<i64> {
        let lowest = waiting
            .iter()
            .filter(|e| e.id != entry.id && e.is_waiting())
            .map(|e| e.priority)
            .min()?;
        let target = (lowest - 1).max(0);
        (target < entry.priority).then_some(target)
    }

    /// Urgent waiting entries that have fallen behind a non-urgent one.
    ///
    /// Urgent entries are never compared with each other, so a second pass
    /// over the result plans nothing.
    pub fn plan_promotions(&self, waiting: &[QueueEntry]) -> Vec<Promotion> {
        let Some(lowest_regular) = waiting
            .iter()
            .filter(|e| e.is_waiting() && !e.urgent)
            .map(|e| e.priority)
            .min()
        else {
            return Vec::new();
        };

        let target = (lowest_regular - 1).max(0);
        waiting
            .iter()
            .filter(|e| e.is_waiting() && e.urgent && e.priority > target)
            .map(|e| Promotion {
                entry_id: e.id.clone(),
                from: e.priority,
                to: target,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueueStatus, QueueType, TenantScope};
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, priority: i64, minute: u32) -> QueueEntry {
        let scope = TenantScope::new("clinicA").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap();
        let mut e = QueueEntry::new(&scope, format!("patient-{}", id), QueueType::WalkIn, priority, at);
        e.id = id.to_string();
        e
    }

    fn ids(entries: &[QueueEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_order_by_priority_then_arrival() {
        let scheduler = PriorityScheduler::new();
        let ordered = scheduler.order(vec![
            entry("late", 5, 10),
            entry("early", 5, 0),
            entry("urgent", 1, 20),
        ]);
        assert_eq!(ids(&ordered), vec!["urgent", "early", "late"]);
    }

    #[test]
    fn test_order_ties_broken_by_id() {
        let scheduler = PriorityScheduler::new();
        let ordered = scheduler.order(vec![entry("b", 5, 0), entry("a", 5, 0)]);
        assert_eq!(ids(&ordered), vec!["a", "b"]);
    }

    #[test]
    fn test_compute_position() {
        let scheduler = PriorityScheduler::new();
        let ordered = scheduler.order(vec![entry("x", 5, 0), entry("y", 5, 1)]);
        assert_eq!(scheduler.compute_position("x", &ordered), Some(1));
        assert_eq!(scheduler.compute_position("y", &ordered), Some(2));
        assert_eq!(scheduler.compute_position("z", &ordered), None);
    }

    #[test]
    fn test_urgent_priority() {
        let scheduler = PriorityScheduler::new();
        let waiting = vec![entry("a", 5, 0), entry("b", 3, 1), entry("c", 5, 2)];

        assert_eq!(scheduler.urgent_priority(&waiting[2], &waiting), Some(2));
        // Alone in the queue
        assert_eq!(scheduler.urgent_priority(&waiting[0], &waiting[..1]), None);
    }

    #[test]
    fn test_urgent_priority_floors_at_zero() {
        let scheduler = PriorityScheduler::new();
        let waiting = vec![entry("a", 0, 0), entry("b", 5, 1)];
        assert_eq!(scheduler.urgent_priority(&waiting[1], &waiting), Some(0));
        // Already at the floor
        assert_eq!(scheduler.urgent_priority(&waiting[0], &waiting), None);
    }

    #[test]
    fn test_plan_promotions_only_for_lagging_urgent_entries() {
        let scheduler = PriorityScheduler::new();
        let mut lagging = entry("lagging", 5, 0);
        lagging.urgent = true;
        let mut ahead = entry("ahead", 1, 1);
        ahead.urgent = true;
        let mut done = entry("done", 5, 2);
        done.urgent = true;
        done.status = QueueStatus::InProgress;
        let waiting = vec![lagging, ahead, done, entry("regular", 3, 3)];

        let plan = scheduler.plan_promotions(&waiting);
        assert_eq!(
            plan,
            vec![Promotion {
                entry_id: "lagging".into(),
                from: 5,
                to: 2,
            }]
        );
    }

    #[test]
    fn test_plan_promotions_without_regular_entries() {
        let scheduler = PriorityScheduler::new();
        let mut only = entry("only", 5, 0);
        only.urgent = true;
        assert!(scheduler.plan_promotions(&[only]).is_empty());
    }
}
