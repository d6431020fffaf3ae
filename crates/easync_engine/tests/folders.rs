//! Folder hierarchy passes against the in-memory store.

use std::sync::Arc;

use easync_codec::tags::folder;
use easync_engine::collection::{server_folder_type as kind, tables, SYNC_ISSUES};
use easync_engine::{
    CollectionSyncState, FolderHierarchy, Lookback, MailboxType, Session, SyncConfig, SyncEngine,
    SyncInterval,
};
use easync_store::{BatchStore, MemoryStore, MutationRecord, Row, RowId, Selector, SizeLimit};
use easync_testkit::prelude::*;

struct Harness {
    store: Arc<MemoryStore>,
    transport: Arc<ScriptedTransport>,
    engine: SyncEngine,
    account: RowId,
}

impl Harness {
    fn new(transport: ScriptedTransport) -> Self {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let account = seed_account(&store);
        let transport = Arc::new(transport);
        let engine = SyncEngine::new(
            SyncConfig::default(),
            transport.clone(),
            store.clone(),
            Session::new(),
            TEST_SCOPE,
        );
        Self {
            store,
            transport,
            engine,
            account,
        }
    }

    fn variant(&self) -> FolderHierarchy {
        FolderHierarchy::new(self.account, SyncInterval::Push)
    }

    fn folders(&self) -> Vec<Row> {
        self.store.rows(TEST_SCOPE, tables::MAILBOXES)
    }

    fn folder(&self, server_id: &str) -> Row {
        self.folders()
            .into_iter()
            .find(|row| row.text("server_id") == Some(server_id))
            .unwrap_or_else(|| panic!("folder {}", server_id))
    }

    fn has_children(&self, server_id: &str) -> bool {
        self.folder(server_id)
            .get("has_children")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

fn parent_key(row: &Row) -> Option<i64> {
    row.integer("parent_key")
}

#[test]
fn initial_sync_builds_the_tree() {
    let body = FolderSyncResponse::new("F1")
        .add(FolderFixture::new("1", "Inbox", kind::INBOX))
        .add(FolderFixture::new("2", "Drafts", kind::DRAFTS))
        .add(FolderFixture::new("3", "Tasks", kind::TASKS))
        .add(FolderFixture::new("4", "Calendar", kind::CALENDAR))
        .add(FolderFixture::new("5", "Projects", kind::USER_GENERIC).under("1"))
        .add(FolderFixture::new("6", "Birthdays", kind::USER_GENERIC).under("4"))
        .add(FolderFixture::new("7", "Receipts", kind::USER_MAILBOX).under("1"))
        .add(FolderFixture::new("8", "Archive", kind::USER_GENERIC).under("5"))
        .build();
    let h = Harness::new(ScriptedTransport::new().respond(body));
    assert_eq!(h.account, TEST_ACCOUNT);
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.initial_sync);
    assert_eq!(state.sync_key.as_str(), "F1");
    let request = h.transport.request_lines(0);
    assert_eq!(h.transport.requests()[0].command, "FolderSync");
    assert!(request.contains(&format!("{}=0", folder::SYNC_KEY)));

    let mut ids: Vec<String> = h
        .folders()
        .iter()
        .filter_map(|row| row.text("server_id").map(str::to_string))
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "4", "5", "7", "8"]);

    let inbox = h.folder("1");
    assert_eq!(inbox.integer("type"), Some(MailboxType::Inbox.as_db_value()));
    assert_eq!(
        inbox.integer("sync_interval"),
        Some(SyncInterval::Push.as_db_value())
    );
    assert_eq!(
        h.folder("2").integer("sync_interval"),
        Some(SyncInterval::Never.as_db_value())
    );
    assert_eq!(
        h.folder("5").integer("type"),
        Some(MailboxType::Mail.as_db_value())
    );
    assert_eq!(
        h.folder("8").integer("type"),
        Some(MailboxType::Mail.as_db_value())
    );
    assert_eq!(h.folder("4").get("visible").and_then(|v| v.as_bool()), Some(false));

    assert_eq!(parent_key(&h.folder("5")), Some(inbox.id as i64));
    assert_eq!(parent_key(&h.folder("7")), Some(inbox.id as i64));
    assert_eq!(parent_key(&h.folder("8")), Some(h.folder("5").id as i64));
    assert!(parent_key(&inbox).is_none());
    assert!(h.has_children("1"));
    assert!(h.has_children("5"));
    assert!(!h.has_children("2"));
    assert!(!h.has_children("4"));

    let account = &h.store.rows(TEST_SCOPE, tables::ACCOUNTS)[0];
    assert_eq!(account.text("sync_key"), Some("F1"));
}

#[test]
fn large_initial_sync_commits_in_chunks() {
    let mut response =
        FolderSyncResponse::new("F1").add(FolderFixture::new("r", "Root", kind::USER_MAILBOX));
    for i in 0..45 {
        let id = format!("c{}", i);
        response = response.add(FolderFixture::new(&id, &id, kind::USER_MAILBOX).under("r"));
    }
    let h = Harness::new(ScriptedTransport::new().respond(response.build()));
    h.store.set_limit(SizeLimit::Operations(25));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert_eq!(state.sync_key.as_str(), "F1");
    let sizes = h.store.commit_sizes();
    assert_eq!(sizes.iter().filter(|s| **s == 20).count(), 2);
    assert!(h.store.rejected_batches() >= 1);

    let root = h.folder("r");
    let children: Vec<Row> = h
        .folders()
        .into_iter()
        .filter(|row| row.text("parent_server_id") == Some("r"))
        .collect();
    assert_eq!(children.len(), 45);
    for child in &children {
        assert_eq!(parent_key(child), Some(root.id as i64));
    }
    assert!(h.has_children("r"));
}

#[test]
fn reset_keeps_options_for_the_next_initial_sync() {
    let reset = FolderSyncResponse::status(9).build();
    let fresh = FolderSyncResponse::new("F9")
        .add(FolderFixture::new("1", "Inbox", kind::INBOX))
        .add(FolderFixture::new("7", "Receipts", kind::USER_MAILBOX))
        .build();
    let h = Harness::new(ScriptedTransport::new().respond(reset).respond(fresh));
    let receipts = seed_mailbox(&h.store, "7", "Receipts", MailboxType::Mail);
    h.store
        .apply_batch(
            TEST_SCOPE,
            vec![MutationRecord::update(tables::MAILBOXES, Selector::Id(receipts.id))
                .with("sync_interval", SyncInterval::Minutes(15).as_db_value())
                .with("sync_lookback", Lookback::OneWeek.as_db_value())],
        )
        .unwrap();
    let mut variant = h.variant();
    let mut state =
        CollectionSyncState::new(SyncInterval::Push, Lookback::Unknown).with_sync_key("F1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.reset);
    assert!(state.sync_key.is_initial());
    assert!(h.folders().is_empty());
    assert_eq!(variant.saved_options(), 1);

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert_eq!(state.sync_key.as_str(), "F9");
    assert_eq!(variant.saved_options(), 0);
    let restored = h.folder("7");
    assert_eq!(
        restored.integer("sync_interval"),
        Some(SyncInterval::Minutes(15).as_db_value())
    );
    assert_eq!(
        restored.integer("sync_lookback"),
        Some(Lookback::OneWeek.as_db_value())
    );
    assert_eq!(
        h.folder("1").integer("sync_lookback"),
        Some(Lookback::Unknown.as_db_value())
    );
}

#[test]
fn sync_issues_folder_is_dropped() {
    let body = FolderSyncResponse::new("F1")
        .add(FolderFixture::new("1", "Inbox", kind::INBOX))
        .add(FolderFixture::new("9", SYNC_ISSUES, kind::USER_MAILBOX))
        .add(FolderFixture::new("10", "Conflicts", kind::USER_MAILBOX).under("9"))
        .build();
    let h = Harness::new(ScriptedTransport::new().respond(body));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let folders = h.folders();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].text("server_id"), Some("1"));
}

#[test]
fn moves_and_deletes_relink_parents() {
    let initial = FolderSyncResponse::new("F1")
        .add(FolderFixture::new("1", "Inbox", kind::INBOX))
        .add(FolderFixture::new("2", "Work", kind::USER_MAILBOX))
        .add(FolderFixture::new("3", "Travel", kind::USER_MAILBOX).under("1"))
        .build();
    let moved = FolderSyncResponse::new("F2")
        .update("3", None, Some("2"))
        .update("2", Some("Job"), None)
        .build();
    let deleted = FolderSyncResponse::new("F3").delete("3").build();
    let h = Harness::new(
        ScriptedTransport::new()
            .respond(initial)
            .respond(moved)
            .respond(deleted),
    );
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    assert!(h.has_children("1"));
    assert!(!h.has_children("2"));

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    let work = h.folder("2");
    assert_eq!(work.text("display_name"), Some("Job"));
    assert_eq!(parent_key(&h.folder("3")), Some(work.id as i64));
    assert_eq!(h.folder("3").text("parent_server_id"), Some("2"));
    assert!(h.has_children("2"));
    assert!(!h.has_children("1"));

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    assert_eq!(state.sync_key.as_str(), "F3");
    assert_eq!(h.folders().len(), 2);
    assert!(!h.has_children("2"));
}

#[test]
fn new_folder_under_existing_parent_is_linked() {
    let initial = FolderSyncResponse::new("F1")
        .add(FolderFixture::new("1", "Inbox", kind::INBOX))
        .build();
    let added = FolderSyncResponse::new("F2")
        .add(FolderFixture::new("5", "Later", kind::USER_GENERIC).under("1"))
        .build();
    let h = Harness::new(ScriptedTransport::new().respond(initial).respond(added));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    assert!(!h.has_children("1"));
    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let later = h.folder("5");
    assert_eq!(later.integer("type"), Some(MailboxType::Mail.as_db_value()));
    assert_eq!(parent_key(&later), Some(h.folder("1").id as i64));
    assert!(h.has_children("1"));
}

#[test]
fn server_error_keeps_the_hierarchy_key() {
    let h = Harness::new(ScriptedTransport::new().respond(FolderSyncResponse::status(6).build()));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default().with_sync_key("F1");

    let err = h.engine.run_pass(&mut variant, &mut state).unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.delay_hint(), None);
    assert_eq!(state.sync_key.as_str(), "F1");
}
