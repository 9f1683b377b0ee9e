//! Three-way diff between desired listener specs and actual registrations.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use flowbridge_types::listener::{ListenerSpec, RegisteredListener};

use crate::listener::{filters_equal, normalize_filter};

/// One mutation the engine should apply to the host's listener registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ListenerMutation {
    Create {
        uri: String,
        event: String,
        filter: serde_json::Value,
    },
    Update {
        id: i64,
        uri: String,
        event: String,
        filter: serde_json::Value,
    },
    Delete {
        id: i64,
        uri: String,
        event: String,
    },
}

impl ListenerMutation {
    pub fn uri(&self) -> &str {
        match self {
            Self::Create { uri, .. } | Self::Update { uri, .. } | Self::Delete { uri, .. } => uri,
        }
    }

    pub fn event(&self) -> &str {
        match self {
            Self::Create { event, .. } | Self::Update { event, .. } | Self::Delete { event, .. } => {
                event
            }
        }
    }
}

/// Ordered list of mutations: creates and updates first, then deletes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub mutations: Vec<ListenerMutation>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn creates(&self) -> usize {
        self.count(|m| matches!(m, ListenerMutation::Create { .. }))
    }

    pub fn updates(&self) -> usize {
        self.count(|m| matches!(m, ListenerMutation::Update { .. }))
    }

    pub fn deletes(&self) -> usize {
        self.count(|m| matches!(m, ListenerMutation::Delete { .. }))
    }

    fn count(&self, pred: impl Fn(&ListenerMutation) -> bool) -> usize {
        self.mutations.iter().filter(|m| pred(m)).count()
    }
}

/// Diff `desired` against `actual`.
///
/// Only registrations tagged with `owner_app_id` are matched, updated or
/// deleted; other applications' listeners are invisible here. Self-owned
/// registrations whose (uri, event) is no longer desired are deleted unless
/// their uri is in `protected_uris` (workflows whose definition could not be
/// read this cycle). Surplus self-owned duplicates of a desired pair are
/// always deleted.
pub fn plan(
    desired: &[ListenerSpec],
    actual: &[RegisteredListener],
    owner_app_id: &str,
    protected_uris: &HashSet<String>,
) -> ReconcilePlan {
    let mut wanted: BTreeMap<(&str, &str), &serde_json::Value> = BTreeMap::new();
    for spec in desired {
        for event in &spec.events {
            wanted
                .entry((spec.uri.as_str(), event.as_str()))
                .or_insert(&spec.filters);
        }
    }

    let mut existing: HashMap<(&str, &str), &RegisteredListener> = HashMap::new();
    let mut duplicates: Vec<&RegisteredListener> = Vec::new();
    for listener in actual.iter().filter(|l| l.is_owned_by(owner_app_id)) {
        let key = (listener.uri.as_str(), listener.event.as_str());
        if existing.contains_key(&key) {
            duplicates.push(listener);
        } else {
            existing.insert(key, listener);
        }
    }

    let mut mutations = Vec::new();
    for (&(uri, event), filter) in &wanted {
        match existing.get(&(uri, event)) {
            Some(current) if filters_equal(&current.event_filter, filter) => {}
            Some(current) => mutations.push(ListenerMutation::Update {
                id: current.id,
                uri: uri.to_string(),
                event: event.to_string(),
                filter: normalize_filter(filter),
            }),
            None => mutations.push(ListenerMutation::Create {
                uri: uri.to_string(),
                event: event.to_string(),
                filter: normalize_filter(filter),
            }),
        }
    }

    let mut orphans: Vec<&RegisteredListener> = existing
        .iter()
        .filter(|(key, listener)| {
            !wanted.contains_key(*key) && !protected_uris.contains(&listener.uri)
        })
        .map(|(_, listener)| *listener)
        .collect();
    orphans.extend(duplicates);
    orphans.sort_by_key(|l| l.id);

    mutations.extend(orphans.into_iter().map(|l| ListenerMutation::Delete {
        id: l.id,
        uri: l.uri.clone(),
        event: l.event.clone(),
    }));

    ReconcilePlan { mutations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OWNER: &str = "flowbridge";

    fn spec(uri: &str, events: &[&str], filters: serde_json::Value) -> ListenerSpec {
        ListenerSpec {
            uri: uri.to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            filters,
        }
    }

    fn registered(id: i64, owner: &str, uri: &str, event: &str, filter: serde_json::Value) -> RegisteredListener {
        RegisteredListener {
            id,
            app_id: Some(owner.to_string()),
            uri: uri.to_string(),
            event: event.to_string(),
            event_filter: filter,
        }
    }

    fn none() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_creates_one_per_event() {
        let desired = vec![spec("A", &["E1", "E2"], json!([]))];
        let plan = plan(&desired, &[], OWNER, &none());
        assert_eq!(plan.creates(), 2);
        assert_eq!(plan.mutations[0].event(), "E1");
        assert_eq!(plan.mutations[1].event(), "E2");
    }

    #[test]
    fn test_matching_listener_needs_nothing() {
        let desired = vec![spec("A", &["E1"], json!([]))];
        let actual = vec![registered(1, OWNER, "A", "E1", serde_json::Value::Null)];
        assert!(plan(&desired, &actual, OWNER, &none()).is_empty());
    }

    #[test]
    fn test_filter_mismatch_updates() {
        let desired = vec![spec("A", &["E1"], json!({"status": "new"}))];
        let actual = vec![registered(4, OWNER, "A", "E1", json!({"status": "old"}))];
        let plan = plan(&desired, &actual, OWNER, &none());
        assert_eq!(
            plan.mutations,
            vec![ListenerMutation::Update {
                id: 4,
                uri: "A".to_string(),
                event: "E1".to_string(),
                filter: json!({"status": "new"}),
            }]
        );
    }

    #[test]
    fn test_orphan_deleted_and_desired_untouched() {
        let desired = vec![spec("A", &["E1"], json!([]))];
        let actual = vec![
            registered(1, OWNER, "A", "E1", json!([])),
            registered(2, OWNER, "B", "E2", json!([])),
        ];
        let plan = plan(&desired, &actual, OWNER, &none());
        assert_eq!(
            plan.mutations,
            vec![ListenerMutation::Delete {
                id: 2,
                uri: "B".to_string(),
                event: "E2".to_string(),
            }]
        );
    }

    #[test]
    fn test_foreign_listeners_are_ignored() {
        let desired = vec![spec("A", &["E1"], json!([]))];
        let actual = vec![
            registered(1, "other_app", "A", "E1", json!([])),
            registered(2, "other_app", "B", "E2", json!([])),
        ];
        let plan = plan(&desired, &actual, OWNER, &none());
        assert_eq!(plan.creates(), 1);
        assert_eq!(plan.deletes(), 0);
    }

    #[test]
    fn test_duplicates_are_pruned() {
        let desired = vec![spec("A", &["E1"], json!([]))];
        let actual = vec![
            registered(1, OWNER, "A", "E1", json!([])),
            registered(9, OWNER, "A", "E1", json!([])),
        ];
        let plan = plan(&desired, &actual, OWNER, &none());
        assert_eq!(plan.deletes(), 1);
        assert!(matches!(plan.mutations[0], ListenerMutation::Delete { id: 9, .. }));
    }

    #[test]
    fn test_protected_uris_are_not_deleted() {
        let actual = vec![registered(3, OWNER, "B", "E2", json!([]))];
        let protected: HashSet<String> = ["B".to_string()].into_iter().collect();
        assert!(plan(&[], &actual, OWNER, &protected).is_empty());
        assert_eq!(plan(&[], &actual, OWNER, &none()).deletes(), 1);
    }

    #[test]
    fn test_deletes_come_after_creates() {
        let desired = vec![spec("A", &["E1"], json!([]))];
        let actual = vec![registered(2, OWNER, "B", "E2", json!([]))];
        let plan = plan(&desired, &actual, OWNER, &none());
        assert!(matches!(plan.mutations[0], ListenerMutation::Create { .. }));
        assert!(matches!(plan.mutations[1], ListenerMutation::Delete { .. }));
    }

    #[test]
    fn test_mutation_serializes_with_action_tag() {
        let mutation = ListenerMutation::Delete {
            id: 5,
            uri: "B".to_string(),
            event: "E".to_string(),
        };
        let value = serde_json::to_value(&mutation).unwrap();
        assert_eq!(value["action"], "delete");
        assert_eq!(value["id"], 5);
    }
}
