//! Mail collection passes against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use easync_codec::tags::{base, email, sync};
use easync_engine::collection::{message_flags, tables, LOADED_COMPLETE};
use easync_engine::status::{self, StatusOutcome};
use easync_engine::{
    CollectionSyncState, EmailCollection, Lookback, MailboxInfo, MailboxType, Session, SyncConfig,
    SyncEngine, SyncError, SyncInterval, PROTOCOL_2_5,
};
use easync_store::{BatchStore, MemoryStore, MutationRecord, Row, Selector, SizeLimit};
use easync_testkit::prelude::*;
use proptest::prelude::*;

struct Harness {
    store: Arc<MemoryStore>,
    transport: Arc<ScriptedTransport>,
    session: Session,
    engine: SyncEngine,
    inbox: MailboxInfo,
}

impl Harness {
    fn new(script: impl FnOnce(&Session, ScriptedTransport) -> ScriptedTransport) -> Self {
        Self::with_config(SyncConfig::default(), script)
    }

    fn with_config(
        config: SyncConfig,
        script: impl FnOnce(&Session, ScriptedTransport) -> ScriptedTransport,
    ) -> Self {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let inbox = seed_mailbox(&store, "inbox", "Inbox", MailboxType::Inbox);
        let session = Session::new();
        let transport = Arc::new(script(&session, ScriptedTransport::new()));
        let engine = SyncEngine::new(
            config,
            transport.clone(),
            store.clone(),
            session.clone(),
            TEST_SCOPE,
        );
        Self {
            store,
            transport,
            session,
            engine,
            inbox,
        }
    }

    fn variant(&self) -> EmailCollection {
        EmailCollection::new(self.inbox.clone())
    }

    fn count(&self, table: &str) -> usize {
        self.store.count(TEST_SCOPE, table)
    }

    fn message(&self, server_id: &str) -> Row {
        self.store
            .rows(TEST_SCOPE, tables::MESSAGES)
            .into_iter()
            .find(|row| row.text("server_id") == Some(server_id))
            .expect("message row")
    }
}

fn synced(key: &str) -> CollectionSyncState {
    CollectionSyncState::new(SyncInterval::Ping, Lookback::Auto).with_sync_key(key)
}

fn line(tag: impl std::fmt::Display, value: &str) -> String {
    format!("{}={}", tag, value)
}

#[test]
fn initial_sync_stores_messages_and_key() {
    let body = SyncResponse::new("A1")
        .add(MessageFixture::new("1:1").html("<p>one</p>"))
        .add(MessageFixture::new("1:2").read().attachment("a.txt", 12))
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::new(SyncInterval::Push, Lookback::Auto);

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(!outcome.more_available);
    assert!(outcome.initial_sync);
    assert!(!outcome.looping);
    assert!(outcome.another_pass);
    assert_eq!(state.sync_key.as_str(), "A1");
    assert_eq!(state.sync_interval, SyncInterval::Ping);

    assert_eq!(h.count(tables::MESSAGES), 2);
    assert_eq!(h.count(tables::BODIES), 2);
    assert_eq!(h.count(tables::ATTACHMENTS), 1);

    let first = h.message("1:1");
    assert_eq!(first.text("display_name"), Some("Sender"));
    assert_eq!(first.integer("timestamp"), Some(1_262_596_427_000));
    assert_eq!(first.integer("flag_loaded"), Some(LOADED_COMPLETE));
    let bodies = h.store.rows(TEST_SCOPE, tables::BODIES);
    let body = bodies
        .iter()
        .find(|b| b.integer("message_key") == Some(first.id as i64))
        .unwrap();
    assert_eq!(body.text("html"), Some("<p>one</p>"));

    let second = h.message("1:2");
    let attachment = &h.store.rows(TEST_SCOPE, tables::ATTACHMENTS)[0];
    assert_eq!(attachment.integer("message_key"), Some(second.id as i64));
    assert_eq!(attachment.text("file_name"), Some("a.txt"));

    let mailbox = &h.store.rows(TEST_SCOPE, tables::MAILBOXES)[0];
    assert_eq!(mailbox.text("sync_key"), Some("A1"));
    assert_eq!(
        mailbox.integer("sync_interval"),
        Some(SyncInterval::Ping.as_db_value())
    );

    let requests = h.transport.requests();
    assert_eq!(requests[0].command, "Sync");
    assert_eq!(requests[0].timeout, h.engine.config().initial_timeout);
    let lines = h.transport.request_lines(0);
    assert!(lines.contains(&line(sync::SYNC_KEY, "0")));
    assert!(lines.contains(&line(sync::COLLECTION_ID, "inbox")));
    assert!(!lines.contains(&sync::OPTIONS.to_string()));
}

#[test]
fn next_pass_starts_from_stored_key_with_options() {
    let first = SyncResponse::new("A1").add(MessageFixture::new("1:1")).build();
    let second = SyncResponse::new("A2").build();
    let h = Harness::new(|_, t| t.respond(first).respond(second));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::new(SyncInterval::Push, Lookback::OneWeek);

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(!outcome.another_pass);
    assert_eq!(state.sync_key.as_str(), "A2");
    let lines = h.transport.request_lines(1);
    assert!(lines.contains(&line(sync::SYNC_KEY, "A1")));
    assert!(lines.contains(&line(sync::DELETES_AS_MOVES, "1")));
    assert!(lines.contains(&sync::GET_CHANGES.to_string()));
    assert!(lines.contains(&line(sync::WINDOW_SIZE, "5")));
    assert!(lines.contains(&line(sync::FILTER_TYPE, "3")));
    assert!(lines.contains(&line(base::TYPE, "2")));
    assert!(!lines.iter().any(|l| l.starts_with(&sync::CLASS.to_string())));
    assert_eq!(
        h.transport.requests()[1].timeout,
        h.engine.config().timeout
    );
}

#[test]
fn old_protocol_sends_class_and_mime_options() {
    let h = Harness::with_config(SyncConfig::new(PROTOCOL_2_5), |_, t| {
        t.respond(SyncResponse::new("A2").build())
    });
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let lines = h.transport.request_lines(0);
    assert!(lines.contains(&line(sync::CLASS, "Email")));
    assert!(lines.contains(&sync::DELETES_AS_MOVES.to_string()));
    assert!(lines.contains(&line(sync::MIME_SUPPORT, "2")));
    assert!(!lines.contains(&base::BODY_PREFERENCE.to_string()));
}

#[test]
fn more_available_without_new_key_is_a_loop() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A1").more_available().build()));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.more_available);
    assert!(outcome.looping);
    assert!(!outcome.another_pass);
    assert!(state.looping);
    assert_eq!(state.sync_key.as_str(), "A1");
}

#[test]
fn more_available_with_new_key_asks_for_another_pass() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A2").more_available().build()));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(!outcome.looping);
    assert!(outcome.another_pass);
    assert!(!state.looping);
    assert_eq!(state.sync_key.as_str(), "A2");
}

#[test]
fn bad_sync_key_resets_and_wipes() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::status(3).build()));
    let inbox = h.inbox.clone();
    seed_message(&h.store, &inbox, "1:1", true);
    seed_local_delete(&h.store, &inbox, "1:7");
    let mut variant = h.variant();
    let mut state = synced("A9");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.reset);
    assert!(outcome.looping);
    assert!(!outcome.another_pass);
    assert!(state.sync_key.is_initial());
    assert_eq!(state.sync_interval, SyncInterval::Push);
    assert_eq!(h.count(tables::MESSAGES), 0);
    assert_eq!(h.count(tables::DELETED), 0);
}

#[test]
fn folder_status_requests_refresh() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::status(12).build()));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let err = h.engine.run_pass(&mut variant, &mut state).unwrap_err();

    assert!(matches!(err, SyncError::NeedsFolderRefresh { status: 12 }));
    assert!(h.session.take_folder_refresh());
    assert_eq!(state, synced("A1"));
}

#[test]
fn retry_status_keeps_state_and_hints_delay() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::status(5).build()));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let err = h.engine.run_pass(&mut variant, &mut state).unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.delay_hint(), Some(status::RETRY_DELAY_HINT));
    assert_eq!(state, synced("A1"));
}

#[test]
fn unauthorized_is_an_authentication_error() {
    let h = Harness::new(|_, t| t.respond_status(401));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let err = h.engine.run_pass(&mut variant, &mut state).unwrap_err();

    assert!(matches!(err, SyncError::Authentication(_)));
    assert_eq!(state, synced("A1"));
}

#[test]
fn empty_response_demotes_push_and_commits_only_state() {
    let h = Harness::new(|_, t| t.respond_empty());
    let mut variant = h.variant();
    let mut state =
        CollectionSyncState::new(SyncInterval::Push, Lookback::Auto).with_sync_key("A1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(!outcome.another_pass);
    assert_eq!(outcome.committed, 1);
    assert_eq!(state.sync_interval, SyncInterval::Ping);
    assert_eq!(h.count(tables::MESSAGES), 0);
}

#[test]
fn changes_on_periodic_push_account_restart_as_ping() {
    let body = SyncResponse::new("A2").add(MessageFixture::new("1:1")).build();
    let config = SyncConfig::default().with_account_push(true);
    let h = Harness::with_config(config, |_, t| t.respond(body));
    let mut variant = h.variant();
    let mut state =
        CollectionSyncState::new(SyncInterval::Minutes(15), Lookback::Auto).with_sync_key("A1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.restart_as_ping);
    assert_eq!(state.sync_interval, SyncInterval::Ping);
    assert_eq!(h.session.change_count(), 1);
}

#[test]
fn server_changes_update_read_and_verb_flags() {
    let body = SyncResponse::new("A2")
        .change(ChangeFixture::new("1:1").read(true).verb(3))
        .change(ChangeFixture::new("1:2").read(false))
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let inbox = h.inbox.clone();
    seed_message(&h.store, &inbox, "1:1", false);
    seed_message(&h.store, &inbox, "1:2", false);
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let changed = h.message("1:1");
    assert_eq!(changed.get("read").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(changed.integer("flags"), Some(message_flags::FORWARDED));
    // Unchanged read state produces no update.
    assert_eq!(h.message("1:2").integer("flags"), Some(0));
}

#[test]
fn deletes_and_soft_deletes_remove_messages() {
    let body = SyncResponse::new("A2")
        .delete("1:1")
        .soft_delete("1:2")
        .delete("1:404")
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let inbox = h.inbox.clone();
    seed_message(&h.store, &inbox, "1:1", false);
    seed_message(&h.store, &inbox, "1:2", false);
    seed_message(&h.store, &inbox, "1:3", false);
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert_eq!(h.count(tables::MESSAGES), 1);
    assert_eq!(h.message("1:3").text("server_id"), Some("1:3"));
}

#[test]
fn meeting_invites_are_flagged() {
    let body = SyncResponse::new("A2")
        .add(MessageFixture::new("1:1").class("IPM.Schedule.Meeting.Request"))
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let flags = h.message("1:1").integer("flags").unwrap();
    assert_ne!(flags & message_flags::INCOMING_MEETING_INVITE, 0);
}

#[test]
fn rejected_add_aborts_the_pass() {
    let body = SyncResponse::new("A2")
        .add(MessageFixture::new("1:1"))
        .add(MessageFixture::new("1:2").status(6))
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let mut variant = h.variant();
    let mut state = synced("A1");

    assert!(h.engine.run_pass(&mut variant, &mut state).is_err());
    assert_eq!(state, synced("A1"));
    assert_eq!(h.count(tables::MESSAGES), 0);
}

#[test]
fn local_changes_are_sent_and_cleared() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A2").build()));
    let inbox = h.inbox.clone();
    let read_now = seed_message(&h.store, &inbox, "1:1", true);
    seed_local_update(&h.store, &inbox, read_now, false, false);
    seed_local_delete(&h.store, &inbox, "1:9");
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let lines = h.transport.request_lines(0);
    assert!(lines.contains(&sync::COMMANDS.to_string()));
    assert!(lines.contains(&line(sync::SERVER_ID, "1:9")));
    assert!(lines.contains(&line(sync::SERVER_ID, "1:1")));
    assert!(lines.contains(&line(email::READ, "1")));
    assert!(!lines.contains(&email::FLAG.to_string()));
    assert_eq!(h.count(tables::UPDATED), 0);
    assert_eq!(h.count(tables::DELETED), 0);
}

#[test]
fn flagging_sends_follow_up_dates() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A2").build()));
    let inbox = h.inbox.clone();
    let message = seed_message(&h.store, &inbox, "1:1", false);
    h.store
        .apply_batch(
            TEST_SCOPE,
            vec![MutationRecord::update(tables::MESSAGES, Selector::Id(message)).with("favorite", true)],
        )
        .unwrap();
    seed_local_update(&h.store, &inbox, message, false, false);
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let lines = h.transport.request_lines(0);
    assert!(lines.contains(&line(email::FLAG_STATUS, "2")));
    assert!(lines.contains(&line(email::FLAG_TYPE, "FollowUp")));
    assert!(!lines.contains(&line(email::READ, "1")));
}

#[test]
fn nothing_is_sent_on_initial_sync() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A1").build()));
    let inbox = h.inbox.clone();
    seed_local_delete(&h.store, &inbox, "1:9");
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(!h
        .transport
        .request_lines(0)
        .contains(&sync::COMMANDS.to_string()));
    assert_eq!(h.count(tables::DELETED), 1);
}

#[test]
fn conflicting_update_is_kept_and_upsync_skipped_once() {
    let first = SyncResponse::new("A2")
        .response(sync::CHANGE, "1:1", 7)
        .build();
    let second = SyncResponse::new("A3").build();
    let third = SyncResponse::new("A4").build();
    let h = Harness::new(|_, t| t.respond(first).respond(second).respond(third));
    let inbox = h.inbox.clone();
    let message = seed_message(&h.store, &inbox, "1:1", true);
    seed_local_update(&h.store, &inbox, message, false, false);
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    assert!(h.session.upsync_failed());
    assert_eq!(h.count(tables::UPDATED), 1);

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    assert!(!h.session.upsync_failed());
    assert!(!h
        .transport
        .request_lines(1)
        .contains(&sync::COMMANDS.to_string()));

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    assert!(h
        .transport
        .request_lines(2)
        .contains(&line(sync::SERVER_ID, "1:1")));
    assert_eq!(h.count(tables::UPDATED), 0);
}

#[test]
fn collection_conflict_keeps_key_and_commits_adds() {
    let body = SyncResponse::new("A1")
        .with_status(status::code::CONFLICT)
        .more_available()
        .add(MessageFixture::new("1:5"))
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.upsync_conflict);
    assert!(h.session.upsync_failed());
    assert!(outcome.looping);
    assert!(!outcome.another_pass);
    assert!(state.looping);
    assert_eq!(state.sync_key.as_str(), "A1");
    assert_eq!(h.count(tables::MESSAGES), 1);
}

#[test]
fn collection_conflict_with_new_key_asks_for_another_pass() {
    let body = SyncResponse::new("A2")
        .with_status(status::code::CONFLICT)
        .build();
    let h = Harness::new(|_, t| t.respond(body));
    let mut variant = h.variant();
    let mut state = synced("A1");

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.upsync_conflict);
    assert!(!outcome.looping);
    assert!(outcome.another_pass);
    assert_eq!(state.sync_key.as_str(), "A2");
}

#[test]
fn driver_does_not_spin_on_repeated_conflicts() {
    let h = Harness::new(|_, mut t| {
        for _ in 0..3 {
            t = t.respond(
                SyncResponse::new("A1")
                    .with_status(status::code::CONFLICT)
                    .more_available()
                    .build(),
            );
        }
        t
    });
    let mut variant = h.variant();
    let mut state = synced("A1");

    let summary = h.engine.sync(&mut variant, &mut state).unwrap();

    assert_eq!(summary.passes, 1);
    assert!(summary.last.looping);
    assert!(!summary.loop_limit_reached);
    assert_eq!(h.transport.remaining(), 2);
}

#[test]
fn moving_to_trash_sends_delete_and_marks_placeholder() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A2").build()));
    let inbox = h.inbox.clone();
    let trash = seed_mailbox(&h.store, "trash", "Deleted Items", MailboxType::Trash);
    let message = seed_message(&h.store, &trash, "1:1", false);
    seed_local_update(&h.store, &inbox, message, false, false);
    let mut variant = h.variant();
    let mut state = synced("A1");

    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let lines = h.transport.request_lines(0);
    assert!(lines.contains(&sync::DELETE.to_string()));
    let flags = h.message("1:1").integer("flags").unwrap();
    assert_ne!(flags & message_flags::MOVED, 0);
}

#[test]
fn oversized_commit_is_split_per_message() {
    let mut response = SyncResponse::new("A1");
    for i in 1..=5 {
        response = response.add(MessageFixture::new(&format!("1:{}", i)).attachment("a.txt", 1));
    }
    let body = response.build();
    let h = Harness::new(|_, t| t.respond(body));
    h.store.set_limit(SizeLimit::Operations(4));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert_eq!(state.sync_key.as_str(), "A1");
    assert_eq!(outcome.committed, 16);
    assert_eq!(h.store.rejected_batches(), 1);
    assert!(h.store.commit_sizes().ends_with(&[3, 3, 3, 3, 3, 1]));

    let messages = h.store.rows(TEST_SCOPE, tables::MESSAGES);
    for attachment in h.store.rows(TEST_SCOPE, tables::ATTACHMENTS) {
        let owner = attachment.integer("message_key").unwrap();
        assert!(messages.iter().any(|m| m.id as i64 == owner));
    }
}

#[test]
fn store_failure_mid_split_leaves_cursor() {
    let mut response = SyncResponse::new("A1");
    for i in 1..=4 {
        response = response.add(MessageFixture::new(&format!("1:{}", i)));
    }
    let body = response.build();
    let h = Harness::new(|_, t| t.respond(body));
    h.store.set_limit(SizeLimit::Operations(2));
    h.store.fail_after(2);
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    let err = h.engine.run_pass(&mut variant, &mut state).unwrap_err();

    assert!(matches!(err, SyncError::Exec(_)));
    assert!(state.sync_key.is_initial());
    assert_eq!(h.count(tables::MESSAGES), 2);
}

#[test]
fn stop_during_pass_commits_nothing() {
    let body = SyncResponse::new("A1").add(MessageFixture::new("1:1")).build();
    let h = Harness::new(|session, t| t.stop_then_respond(session, body));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    let outcome = h.engine.run_pass(&mut variant, &mut state).unwrap();

    assert!(outcome.stopped);
    assert!(!outcome.another_pass);
    assert!(state.sync_key.is_initial());
    assert_eq!(h.count(tables::MESSAGES), 0);
}

#[test]
fn driver_runs_until_caught_up() {
    let first = SyncResponse::new("A1").add(MessageFixture::new("1:1")).build();
    let second = SyncResponse::new("A2").add(MessageFixture::new("1:2")).more_available().build();
    let third = SyncResponse::new("A3").build();
    let h = Harness::new(|_, t| t.respond(first).respond(second).respond(third));
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    let summary = h.engine.sync(&mut variant, &mut state).unwrap();

    assert_eq!(summary.passes, 3);
    assert!(!summary.loop_limit_reached);
    assert_eq!(state.sync_key.as_str(), "A3");
    assert_eq!(h.count(tables::MESSAGES), 2);
    assert_eq!(h.transport.remaining(), 0);
}

#[test]
fn driver_repeats_after_reset() {
    let reset = SyncResponse::status(3).build();
    let fresh = SyncResponse::new("B1").add(MessageFixture::new("1:1")).build();
    let done = SyncResponse::new("B2").build();
    let h = Harness::new(|_, t| t.respond(reset).respond(fresh).respond(done));
    let mut variant = h.variant();
    let mut state = synced("A7");

    let summary = h.engine.sync(&mut variant, &mut state).unwrap();

    assert_eq!(summary.resets, 1);
    assert_eq!(summary.passes, 3);
    assert_eq!(state.sync_key.as_str(), "B2");
    assert!(h
        .transport
        .request_lines(1)
        .contains(&line(sync::SYNC_KEY, "0")));
}

#[test]
fn driver_stops_at_pass_limit() {
    let config = SyncConfig::default().with_max_looping_passes(3);
    let h = Harness::with_config(config, |_, mut t| {
        for i in 1..=5 {
            t = t.respond(SyncResponse::new(&format!("K{}", i)).more_available().build());
        }
        t
    });
    let mut variant = h.variant();
    let mut state = synced("K0");

    let summary = h.engine.sync(&mut variant, &mut state).unwrap();

    assert!(summary.loop_limit_reached);
    assert_eq!(summary.passes, 3);
    assert_eq!(state.sync_key.as_str(), "K3");
}

#[test]
fn driver_starts_each_cycle_with_no_counted_changes() {
    let config = SyncConfig::default().with_account_push(true);
    let h = Harness::with_config(config, |_, t| t.respond(SyncResponse::new("A2").build()));
    h.session.add_changes(4);
    let mut variant = h.variant();
    let mut state =
        CollectionSyncState::new(SyncInterval::Minutes(15), Lookback::Auto).with_sync_key("A1");

    let summary = h.engine.sync(&mut variant, &mut state).unwrap();

    assert!(!summary.last.restart_as_ping);
    assert_eq!(h.session.change_count(), 0);
    assert_eq!(state.sync_interval, SyncInterval::Minutes(15));
}

#[test]
fn driver_honors_stop_before_first_pass() {
    let h = Harness::new(|_, t| t.respond(SyncResponse::new("A1").build()));
    h.session.stop();
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    let summary = h.engine.sync(&mut variant, &mut state).unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.passes, 0);
    assert!(h.transport.requests().is_empty());
}

#[test]
fn status_table_is_total() {
    for code in (1u16..=20).chain([255]) {
        let outcome = status::interpret(code);
        if code == 1 {
            assert_eq!(outcome, StatusOutcome::Success);
        } else {
            assert!(!outcome.is_success(), "status {}", code);
        }
    }
    assert!(matches!(status::interpret(255), StatusOutcome::Fatal(255)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn failed_status_never_moves_the_cursor(code in status_code_strategy()) {
        let h = Harness::new(|_, t| t.respond(SyncResponse::status(code).build()));
        let mut variant = h.variant();
        let mut state = synced("A1");

        match h.engine.run_pass(&mut variant, &mut state) {
            Ok(outcome) if outcome.reset => prop_assert!(state.sync_key.is_initial()),
            Ok(_) => prop_assert_eq!(state.sync_key.as_str(), "A1"),
            Err(_) => prop_assert_eq!(&state, &synced("A1")),
        }
    }

    #[test]
    fn every_added_message_is_stored(messages in messages_strategy(6), key in sync_key_strategy()) {
        let mut response = SyncResponse::new(&key);
        for message in &messages {
            response = response.add(message.clone());
        }
        let body = response.build();
        let h = Harness::new(|_, t| t.respond(body));
        let mut variant = h.variant();
        let mut state = synced("A1");

        h.engine.run_pass(&mut variant, &mut state).unwrap();

        prop_assert_eq!(h.count(tables::MESSAGES), messages.len());
        prop_assert_eq!(h.count(tables::BODIES), messages.len());
        let attachments: usize = messages.iter().map(|m| m.attachments.len()).sum();
        prop_assert_eq!(h.count(tables::ATTACHMENTS), attachments);
        prop_assert_eq!(state.sync_key.as_str(), key.as_str());
    }
}

#[test]
fn request_timeout_tracks_initial_sync() {
    let config = SyncConfig::default()
        .with_timeout(Duration::from_secs(7))
        .with_initial_timeout(Duration::from_secs(70));
    let h = Harness::with_config(config, |_, t| {
        t.respond(SyncResponse::new("A1").build())
            .respond(SyncResponse::new("A2").build())
    });
    let mut variant = h.variant();
    let mut state = CollectionSyncState::default();

    h.engine.run_pass(&mut variant, &mut state).unwrap();
    h.engine.run_pass(&mut variant, &mut state).unwrap();

    let requests = h.transport.requests();
    assert_eq!(requests[0].timeout, Duration::from_secs(70));
    assert_eq!(requests[1].timeout, Duration::from_secs(7));
}
