//! Deferred cargo actions, polled against simulation time.

use std::collections::BTreeSet;

use super::{BodyMode, ItemId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScheduledAction {
    /// Create the rigid body of a freshly placed item.
    SpawnBody(ItemId),
    /// Hand a settling item over to the engine.
    EndSettling(ItemId),
    /// Give a teleported body its previous mode back.
    RestoreMode(ItemId, BodyMode),
}

impl ScheduledAction {
    pub fn item(&self) -> ItemId {
        match self {
            ScheduledAction::SpawnBody(id)
            | ScheduledAction::EndSettling(id)
            | ScheduledAction::RestoreMode(id, _) => *id,
        }
    }
}

/// Queue of actions that must not run before a given simulation time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduledActions {
    entries: Vec<(f64, ScheduledAction)>,
}

impl ScheduledActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: f64, action: ScheduledAction) {
        self.entries.push((at, action));
    }

    /// Removes and returns the actions due at `now`, earliest first. At most one action per item
    /// is handed out per call; further due actions of the same item stay queued.
    pub fn drain_due(&mut self, now: f64) -> Vec<ScheduledAction> {
        // Stable sort keeps insertion order between equal deadlines.
        self.entries.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut seen = BTreeSet::new();
        let mut due = vec![];
        self.entries.retain(|(at, action)| {
            if *at > now || !seen.insert(action.item()) {
                return true;
            }
            due.push(*action);
            false
        });
        due
    }

    /// Drops every pending action of `item`.
    pub fn cancel(&mut self, item: ItemId) {
        self.entries.retain(|(_, action)| action.item() != item);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pending(&self, item: ItemId) -> impl Iterator<Item = &ScheduledAction> + '_ {
        self.entries
            .iter()
            .filter(move |(_, action)| action.item() == item)
            .map(|(_, action)| action)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_nothing_due_before_deadline() {
        let mut actions = ScheduledActions::new();
        actions.schedule(0.1, ScheduledAction::SpawnBody(ItemId(1)));
        assert!(actions.drain_due(0.05).is_empty());
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions.drain_due(0.1),
            vec![ScheduledAction::SpawnBody(ItemId(1))]
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_due_actions_come_earliest_first() {
        let mut actions = ScheduledActions::new();
        actions.schedule(0.3, ScheduledAction::EndSettling(ItemId(2)));
        actions.schedule(0.1, ScheduledAction::SpawnBody(ItemId(3)));
        actions.schedule(0.2, ScheduledAction::RestoreMode(ItemId(1), BodyMode::Dynamic));
        assert_eq!(
            actions.drain_due(1.0),
            vec![
                ScheduledAction::SpawnBody(ItemId(3)),
                ScheduledAction::RestoreMode(ItemId(1), BodyMode::Dynamic),
                ScheduledAction::EndSettling(ItemId(2)),
            ]
        );
    }

    #[test]
    fn test_one_action_per_item_per_drain() {
        let mut actions = ScheduledActions::new();
        actions.schedule(0.1, ScheduledAction::SpawnBody(ItemId(1)));
        actions.schedule(0.2, ScheduledAction::EndSettling(ItemId(1)));
        actions.schedule(0.2, ScheduledAction::SpawnBody(ItemId(2)));

        assert_eq!(
            actions.drain_due(0.5),
            vec![
                ScheduledAction::SpawnBody(ItemId(1)),
                ScheduledAction::SpawnBody(ItemId(2)),
            ]
        );
        assert_eq!(
            actions.drain_due(0.5),
            vec![ScheduledAction::EndSettling(ItemId(1))]
        );
    }

    #[test]
    fn test_cancel_drops_only_that_item() {
        let mut actions = ScheduledActions::new();
        actions.schedule(0.1, ScheduledAction::SpawnBody(ItemId(1)));
        actions.schedule(0.2, ScheduledAction::EndSettling(ItemId(1)));
        actions.schedule(0.2, ScheduledAction::SpawnBody(ItemId(2)));
        actions.cancel(ItemId(1));
        assert_eq!(actions.pending(ItemId(1)).count(), 0);
        assert_eq!(actions.pending(ItemId(2)).count(), 1);
    }
}
