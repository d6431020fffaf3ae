//! Fuzz harnesses.
//!
//! Each target takes arbitrary bytes and must never panic. They can be
//! driven by cargo-fuzz or by proptest.

use std::sync::Arc;

use easync_codec::{wire, Decoder, Event, Scope, Token};
use easync_engine::collection::tables;
use easync_engine::{
    CollectionSyncState, EmailCollection, MailboxInfo, MailboxType, MockTransport, Response,
    Session, SyncConfig, SyncEngine,
};
use easync_store::MemoryStore;

use crate::fixtures::TEST_SCOPE;

/// Walks the raw event stream of `data` until it ends or fails.
pub fn fuzz_decode_events(data: &[u8]) {
    let Ok(mut dec) = Decoder::new(data) else {
        return;
    };
    loop {
        match dec.next_event() {
            Ok(Event::EndDocument) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Walks `data`, placed after a valid header, with the scoped cursor,
/// reading every element's value.
pub fn fuzz_decode_scoped(data: &[u8]) {
    let mut bytes = wire::HEADER.to_vec();
    bytes.extend_from_slice(data);
    let Ok(mut dec) = Decoder::new(&bytes) else {
        return;
    };
    loop {
        match dec.next_tag(Scope::Document) {
            Ok(Token::Tag(_)) => {
                if dec.value().is_err() {
                    return;
                }
            }
            _ => return,
        }
    }
}

/// Runs one mail pass against `body` as the server response.
///
/// A failed pass must leave the cursor and the local tables untouched.
pub fn fuzz_sync_pass(body: &[u8]) {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    transport.push_response(Response::ok(body.to_vec()));
    let engine = SyncEngine::new(
        SyncConfig::default(),
        transport,
        store.clone(),
        Session::new(),
        TEST_SCOPE,
    );
    let mut variant = EmailCollection::new(MailboxInfo {
        id: 1,
        server_id: "inbox".to_string(),
        display_name: "Inbox".to_string(),
        kind: MailboxType::Inbox,
    });
    let mut state = CollectionSyncState::default().with_sync_key("A1");
    let before = state.clone();

    if engine.run_pass(&mut variant, &mut state).is_err() {
        assert_eq!(state, before, "failed pass changed the cursor");
        assert_eq!(store.count(TEST_SCOPE, tables::MESSAGES), 0);
    }
}
