//! Property-based test generators using proptest.

use easync_codec::TagToken;
use easync_engine::Batch;
use easync_store::MutationRecord;
use proptest::prelude::*;

use crate::fixtures::{ChangeFixture, MessageFixture};

/// Table holding the parents of a generated batch.
pub const PARENT_TABLE: &str = "parents";

/// Table holding the children of a generated batch.
pub const CHILD_TABLE: &str = "children";

/// Strategy for any valid tag.
pub fn tag_strategy() -> impl Strategy<Value = TagToken> {
    (0u8..=24, 0x05u8..=0x3f).prop_map(|(page, code)| TagToken::new(page, code))
}

/// Strategy for sync keys as servers issue them.
pub fn sync_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("\\{[0-9A-F]{8}\\}[1-9][0-9]{0,3}").expect("Invalid regex")
}

/// Strategy for status codes, covering the defined range and beyond.
pub fn status_code_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![1u16..=20, 100u16..=180, any::<u16>()]
}

/// Strategy for added messages with distinct server ids.
pub fn messages_strategy(max: usize) -> impl Strategy<Value = Vec<MessageFixture>> {
    prop::collection::vec((any::<bool>(), any::<bool>(), 0u8..3), 0..=max).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (read, flagged, attachments))| {
                let mut message = MessageFixture::new(&format!("1:{}", i + 1));
                if read {
                    message = message.read();
                }
                if flagged {
                    message = message.flagged();
                }
                for a in 0..attachments {
                    message = message.attachment(&format!("file{}.txt", a), 100 + u64::from(a));
                }
                message
            })
            .collect()
    })
}

/// Strategy for server-side changes of `1:1` up to `1:n`.
pub fn changes_strategy(n: usize) -> impl Strategy<Value = Vec<ChangeFixture>> {
    prop::collection::vec((1..=n.max(1), any::<Option<bool>>(), any::<Option<bool>>()), 0..=n)
        .prop_map(|specs| {
            specs
                .into_iter()
                .map(|(i, read, flagged)| {
                    let mut change = ChangeFixture::new(&format!("1:{}", i));
                    change.read = read;
                    change.flagged = flagged;
                    change
                })
                .collect()
        })
}

/// One parent with its dependent children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupLayout {
    /// Children referring to the parent.
    pub children: usize,
    /// A separator follows the group.
    pub separated: bool,
}

/// Strategy for batch layouts of parent/children groups.
pub fn batch_groups_strategy() -> impl Strategy<Value = Vec<GroupLayout>> {
    prop::collection::vec(
        (0usize..=3, any::<bool>()).prop_map(|(children, separated)| GroupLayout {
            children,
            separated,
        }),
        1..24,
    )
}

/// A mutation of a generated batch, by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Planned {
    /// Sequence number stored in the `seq` column.
    pub seq: i64,
    /// Offset of the parent, for children.
    pub parent: Option<usize>,
}

/// Builds a batch from `groups`. Every record stores its offset in `seq`;
/// children store their parent's row id in `parent`.
pub fn build_grouped_batch(groups: &[GroupLayout]) -> (Batch, Vec<Planned>) {
    let mut batch = Batch::new();
    let mut plan = Vec::new();
    for group in groups {
        let seq = plan.len() as i64;
        let parent = batch.push(MutationRecord::insert(PARENT_TABLE).with("seq", seq));
        plan.push(Planned { seq, parent: None });
        for _ in 0..group.children {
            let seq = plan.len() as i64;
            batch.push_deferred(
                MutationRecord::insert(CHILD_TABLE).with("seq", seq),
                "parent",
                parent,
            );
            plan.push(Planned {
                seq,
                parent: Some(parent),
            });
        }
        if group.separated {
            batch.separator();
        }
    }
    (batch, plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn grouped_batch_plan_matches(groups in batch_groups_strategy()) {
            let (batch, plan) = build_grouped_batch(&groups);
            let expected: usize = groups.iter().map(|g| 1 + g.children).sum();
            prop_assert_eq!(batch.len(), expected);
            prop_assert_eq!(plan.len(), expected);
            for (offset, planned) in plan.iter().enumerate() {
                prop_assert_eq!(planned.seq, offset as i64);
                if let Some(parent) = planned.parent {
                    prop_assert!(parent < offset);
                }
            }
        }

        #[test]
        fn generated_messages_have_distinct_ids(messages in messages_strategy(8)) {
            let mut ids: Vec<_> = messages.iter().map(|m| m.server_id.clone()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), messages.len());
        }
    }
}
