use std::collections::{HashMap, HashSet};

use crate::errors::{ErrorKind, Result};
use crate::network::TopicPartition;
use crate::protocol::Offset;

/// Per-partition consumption state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopicPartitionState {
    /// The next offset to fetch; `None` until the start position resolves.
    pub position: Option<Offset>,
    /// The next offset the group has durably committed.
    pub committed: Option<Offset>,
    pub high_watermark: Offset,
    pub paused: bool,
}

/// What the consumer asked for and what the group gave it.
#[derive(Debug, Default)]
pub struct Subscriptions {
    topics: Vec<String>,
    /// The union of every member's topics; maintained by the leader.
    group_subscription: HashSet<String>,
    assignment: HashMap<TopicPartition, TopicPartitionState>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Subscriptions::default()
    }

    pub fn subscribe<I, S>(&mut self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self.group_subscription = self.topics.iter().cloned().collect();
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Widen the leader's view with topics other members subscribed to.
    pub fn group_subscribe<'a, I>(&mut self, topics: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.group_subscription.extend(topics.into_iter().cloned());
    }

    pub fn group_subscription(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.group_subscription.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Adopt the assignment from a completed rebalance; positions of
    /// retained partitions survive, everything else starts unresolved.
    pub fn assign_from_subscribed(&mut self, partitions: Vec<TopicPartition>) -> Result<()> {
        for tp in &partitions {
            if !self.topics.contains(&tp.topic_name) {
                bail!(ErrorKind::ValidationError(format!(
                    "assigned partition {} is outside the subscription",
                    tp
                )));
            }
        }

        let mut assignment = HashMap::with_capacity(partitions.len());
        for tp in partitions {
            let state = self.assignment.remove(&tp).unwrap_or_default();
            assignment.insert(tp, state);
        }
        self.assignment = assignment;
        Ok(())
    }

    pub fn clear_assignment(&mut self) {
        self.assignment.clear();
    }

    pub fn assigned_partitions(&self) -> Vec<TopicPartition> {
        let mut partitions: Vec<TopicPartition> = self.assignment.keys().cloned().collect();
        partitions.sort();
        partitions
    }

    pub fn is_assigned(&self, tp: &TopicPartition) -> bool {
        self.assignment.contains_key(tp)
    }

    pub fn position(&self, tp: &TopicPartition) -> Option<Offset> {
        self.assignment.get(tp).and_then(|state| state.position)
    }

    pub fn update_position(&mut self, tp: &TopicPartition, position: Offset) {
        if let Some(state) = self.assignment.get_mut(tp) {
            state.position = Some(position);
        }
    }

    /// Forget the position, forcing a reset through the configured mode.
    pub fn clear_position(&mut self, tp: &TopicPartition) {
        if let Some(state) = self.assignment.get_mut(tp) {
            state.position = None;
        }
    }

    pub fn update_high_watermark(&mut self, tp: &TopicPartition, high_watermark: Offset) {
        if let Some(state) = self.assignment.get_mut(tp) {
            state.high_watermark = high_watermark;
        }
    }

    pub fn committed(&self, tp: &TopicPartition) -> Option<Offset> {
        self.assignment.get(tp).and_then(|state| state.committed)
    }

    pub fn set_committed(&mut self, tp: &TopicPartition, offset: Offset) {
        if let Some(state) = self.assignment.get_mut(tp) {
            state.committed = Some(offset);
        }
    }

    /// Partitions whose start position still needs resolving.
    pub fn missing_positions(&self) -> Vec<TopicPartition> {
        let mut partitions: Vec<TopicPartition> = self
            .assignment
            .iter()
            .filter(|(_, state)| state.position.is_none())
            .map(|(tp, _)| tp.clone())
            .collect();
        partitions.sort();
        partitions
    }

    /// Partitions ready to fetch, with their positions.
    pub fn fetchable(&self) -> Vec<(TopicPartition, Offset)> {
        let mut partitions: Vec<(TopicPartition, Offset)> = self
            .assignment
            .iter()
            .filter(|(_, state)| !state.paused)
            .filter_map(|(tp, state)| state.position.map(|position| (tp.clone(), position)))
            .collect();
        partitions.sort();
        partitions
    }

    /// The offsets an autocommit would persist: the position (next wanted
    /// offset) of every partition that advanced past the committed mark.
    pub fn consumed_to_commit(&self) -> HashMap<TopicPartition, Offset> {
        self.assignment
            .iter()
            .filter_map(|(tp, state)| {
                let position = state.position?;
                match state.committed {
                    Some(committed) if committed >= position => None,
                    _ => Some((tp.clone(), position)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_lifecycle() {
        let mut subscriptions = Subscriptions::new();
        subscriptions.subscribe(["t"]);

        let tp0 = TopicPartition::new("t", 0);
        let tp1 = TopicPartition::new("t", 1);
        subscriptions
            .assign_from_subscribed(vec![tp0.clone(), tp1.clone()])
            .unwrap();

        assert!(subscriptions.is_assigned(&tp0));
        assert_eq!(subscriptions.missing_positions().len(), 2);

        subscriptions.update_position(&tp0, 5);
        assert_eq!(subscriptions.position(&tp0), Some(5));
        assert_eq!(subscriptions.missing_positions(), vec![tp1.clone()]);
        assert_eq!(subscriptions.fetchable(), vec![(tp0.clone(), 5)]);

        // rebalance keeps the retained partition's position
        subscriptions
            .assign_from_subscribed(vec![tp0.clone()])
            .unwrap();
        assert_eq!(subscriptions.position(&tp0), Some(5));
        assert!(!subscriptions.is_assigned(&tp1));
    }

    #[test]
    fn test_assignment_outside_subscription_rejected() {
        let mut subscriptions = Subscriptions::new();
        subscriptions.subscribe(["t"]);

        let err = subscriptions
            .assign_from_subscribed(vec![TopicPartition::new("other", 0)])
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ValidationError(_)));
    }

    #[test]
    fn test_consumed_to_commit_skips_non_advancing() {
        let mut subscriptions = Subscriptions::new();
        subscriptions.subscribe(["t"]);
        let tp = TopicPartition::new("t", 0);
        subscriptions.assign_from_subscribed(vec![tp.clone()]).unwrap();

        subscriptions.update_position(&tp, 10);
        assert_eq!(subscriptions.consumed_to_commit()[&tp], 10);

        subscriptions.set_committed(&tp, 10);
        assert!(subscriptions.consumed_to_commit().is_empty());

        // a committed offset never moves backwards
        subscriptions.update_position(&tp, 8);
        assert!(subscriptions.consumed_to_commit().is_empty());
    }
}
