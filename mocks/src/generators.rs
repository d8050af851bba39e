//! Proptest strategies for property-based tests.

use proptest::prelude::*;
use serde_json::{Map, Value};

use strata_core::{ContextDocument, Priority, TaskStatus};

/// Any canonical task status
pub fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Review),
        Just(TaskStatus::Done),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Cancelled),
    ]
}

/// Any priority
pub fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

/// Titles within the accepted boundary (1..=200 chars, non-blank)
pub fn arb_title() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,200}".prop_filter("must not be blank", |s| !s.trim().is_empty())
}

/// Shallow JSON scalar
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::from(n)),
        "[a-z]{0,12}".prop_map(Value::String),
    ]
}

/// Context documents up to two levels deep, with maps, lists and scalars
pub fn arb_context_document() -> impl Strategy<Value = ContextDocument> {
    let leaf = prop_oneof![
        arb_scalar(),
        proptest::collection::vec(arb_scalar(), 0..4).prop_map(Value::Array),
    ];
    let nested = proptest::collection::btree_map("[a-z]{1,8}", leaf.clone(), 0..4).prop_map(|m| {
        Value::Object(m.into_iter().collect::<Map<String, Value>>())
    });
    proptest::collection::btree_map("[a-z]{1,8}", prop_oneof![leaf, nested], 0..5).prop_map(|m| {
        ContextDocument::from_value(Value::Object(m.into_iter().collect::<Map<String, Value>>()))
            .expect("objects are always valid documents")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn titles_stay_within_bounds(title in arb_title()) {
            prop_assert!(strata_core::InputValidator::validate_title(&title).is_ok());
        }

        #[test]
        fn merge_with_empty_is_identity(doc in arb_context_document()) {
            let mut merged = doc.clone();
            merged.deep_merge(&ContextDocument::new());
            prop_assert_eq!(merged, doc);
        }

        #[test]
        fn merge_keeps_all_incoming_top_level_keys(
            base in arb_context_document(),
            incoming in arb_context_document(),
        ) {
            let mut merged = base.clone();
            merged.deep_merge(&incoming);
            for key in incoming.as_map().keys() {
                prop_assert!(merged.get(key).is_some());
            }
        }

        #[test]
        fn content_hash_is_stable(doc in arb_context_document()) {
            prop_assert_eq!(doc.content_hash(), doc.clone().content_hash());
        }

        #[test]
        fn priority_weights_are_monotonic(a in arb_priority(), b in arb_priority()) {
            prop_assert_eq!(a <= b, a.weight() <= b.weight());
        }

        #[test]
        fn done_is_the_only_completing_status(status in arb_status()) {
            prop_assert_eq!(status.is_done(), status == TaskStatus::Done);
        }
    }
}
