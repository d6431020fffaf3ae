//! Server response builders and store helpers.
//!
//! Responses are produced with the real [`Encoder`], so a fixture is always
//! well-formed WBXML.

use bytes::Bytes;
use easync_codec::tags::{base, email, email2, folder, sync};
use easync_codec::{Decoder, Encoder, Event, TagToken};
use easync_engine::collection::tables;
use easync_engine::{MailboxInfo, MailboxType};
use easync_store::{BatchStore, MemoryStore, MutationRecord, RowId};

/// Store scope used by the fixtures.
pub const TEST_SCOPE: &str = "account-1";

/// Account row id used by the fixtures.
pub const TEST_ACCOUNT: RowId = 1;

/// An attachment of a [`MessageFixture`].
#[derive(Debug, Clone)]
pub struct AttachmentFixture {
    /// File name.
    pub name: String,
    /// Server location.
    pub location: String,
    /// Size in bytes.
    pub size: u64,
}

/// An added message.
#[derive(Debug, Clone)]
pub struct MessageFixture {
    /// Server id.
    pub server_id: String,
    /// Subject.
    pub subject: String,
    /// From header.
    pub from: String,
    /// Date received.
    pub date: String,
    /// Read flag.
    pub read: bool,
    /// Follow-up flag.
    pub flagged: bool,
    /// HTML body.
    pub html: Option<String>,
    /// Message class.
    pub message_class: Option<String>,
    /// Per-item status.
    pub status: Option<u16>,
    /// Attachments.
    pub attachments: Vec<AttachmentFixture>,
}

impl MessageFixture {
    /// A plain unread message.
    pub fn new(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            subject: format!("Subject {}", server_id),
            from: "\"Sender\" <sender@example.com>".to_string(),
            date: "2010-01-04T09:13:47.000Z".to_string(),
            read: false,
            flagged: false,
            html: None,
            message_class: None,
            status: None,
            attachments: Vec::new(),
        }
    }

    /// Marks the message read.
    pub fn read(mut self) -> Self {
        self.read = true;
        self
    }

    /// Flags the message.
    pub fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }

    /// Sets an HTML body.
    pub fn html(mut self, body: &str) -> Self {
        self.html = Some(body.to_string());
        self
    }

    /// Sets the message class.
    pub fn class(mut self, class: &str) -> Self {
        self.message_class = Some(class.to_string());
        self
    }

    /// Sets a per-item status.
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds an attachment.
    pub fn attachment(mut self, name: &str, size: u64) -> Self {
        self.attachments.push(AttachmentFixture {
            name: name.to_string(),
            location: format!("{}/{}", self.server_id, name),
            size,
        });
        self
    }

    fn encode(&self, enc: &mut Encoder) {
        enc.start(sync::ADD).expect("add");
        enc.data(sync::SERVER_ID, &self.server_id).expect("server id");
        if let Some(status) = self.status {
            enc.data(sync::STATUS, &status.to_string()).expect("status");
        }
        enc.start(sync::APPLICATION_DATA).expect("application data");
        enc.data(email::TO, "me@example.com").expect("to");
        enc.data(email::FROM, &self.from).expect("from");
        enc.data(email::SUBJECT, &self.subject).expect("subject");
        enc.data(email::DATE_RECEIVED, &self.date).expect("date");
        enc.data(email::READ, if self.read { "1" } else { "0" })
            .expect("read");
        if self.flagged {
            enc.start(email::FLAG)
                .and_then(|e| e.data(email::FLAG_STATUS, "2"))
                .and_then(|e| e.end())
                .expect("flag");
        }
        if let Some(class) = &self.message_class {
            enc.data(email::MESSAGE_CLASS, class).expect("class");
        }
        if let Some(html) = &self.html {
            enc.start(base::BODY)
                .and_then(|e| e.data(base::TYPE, "2"))
                .and_then(|e| e.data(base::DATA, html))
                .and_then(|e| e.end())
                .expect("body");
        }
        if !self.attachments.is_empty() {
            enc.start(base::ATTACHMENTS).expect("attachments");
            for att in &self.attachments {
                enc.start(base::ATTACHMENT)
                    .and_then(|e| e.data(base::DISPLAY_NAME, &att.name))
                    .and_then(|e| e.data(base::FILE_REFERENCE, &att.location))
                    .and_then(|e| e.data(base::ESTIMATED_DATA_SIZE, &att.size.to_string()))
                    .and_then(|e| e.end())
                    .expect("attachment");
            }
            enc.end().expect("attachments end");
        }
        enc.end().and_then(|e| e.end()).expect("add end");
    }
}

/// A changed message.
#[derive(Debug, Clone, Default)]
pub struct ChangeFixture {
    /// Server id.
    pub server_id: String,
    /// New read flag.
    pub read: Option<bool>,
    /// New follow-up flag.
    pub flagged: Option<bool>,
    /// Last verb executed.
    pub last_verb: Option<i64>,
}

impl ChangeFixture {
    /// A change with no fields.
    pub fn new(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            ..Self::default()
        }
    }

    /// Sets the read flag.
    pub fn read(mut self, read: bool) -> Self {
        self.read = Some(read);
        self
    }

    /// Sets the follow-up flag.
    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = Some(flagged);
        self
    }

    /// Sets the last verb executed.
    pub fn verb(mut self, verb: i64) -> Self {
        self.last_verb = Some(verb);
        self
    }

    fn encode(&self, enc: &mut Encoder) {
        enc.start(sync::CHANGE)
            .and_then(|e| e.data(sync::SERVER_ID, &self.server_id))
            .and_then(|e| e.start(sync::APPLICATION_DATA))
            .expect("change");
        if let Some(read) = self.read {
            enc.data(email::READ, if read { "1" } else { "0" })
                .expect("read");
        }
        if let Some(flagged) = self.flagged {
            enc.start(email::FLAG)
                .and_then(|e| e.data(email::FLAG_STATUS, if flagged { "2" } else { "0" }))
                .and_then(|e| e.end())
                .expect("flag");
        }
        if let Some(verb) = self.last_verb {
            enc.data(email2::LAST_VERB_EXECUTED, &verb.to_string())
                .expect("verb");
        }
        enc.end().and_then(|e| e.end()).expect("change end");
    }
}

/// Builder for a Sync response of one collection.
#[derive(Debug, Clone)]
pub struct SyncResponse {
    collection_id: String,
    status: u16,
    sync_key: Option<String>,
    more_available: bool,
    adds: Vec<MessageFixture>,
    changes: Vec<ChangeFixture>,
    deletes: Vec<(TagToken, String)>,
    responses: Vec<(TagToken, String, u16)>,
}

impl SyncResponse {
    /// A successful response carrying `sync_key`.
    pub fn new(sync_key: &str) -> Self {
        Self {
            collection_id: "inbox".to_string(),
            status: 1,
            sync_key: Some(sync_key.to_string()),
            more_available: false,
            adds: Vec::new(),
            changes: Vec::new(),
            deletes: Vec::new(),
            responses: Vec::new(),
        }
    }

    /// A response with `status` and no key.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            sync_key: None,
            ..Self::new("")
        }
    }

    /// Overrides the status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Sets the collection id.
    pub fn collection(mut self, id: &str) -> Self {
        self.collection_id = id.to_string();
        self
    }

    /// Adds a MoreAvailable element.
    pub fn more_available(mut self) -> Self {
        self.more_available = true;
        self
    }

    /// Adds a message.
    pub fn add(mut self, message: MessageFixture) -> Self {
        self.adds.push(message);
        self
    }

    /// Adds a change.
    pub fn change(mut self, change: ChangeFixture) -> Self {
        self.changes.push(change);
        self
    }

    /// Adds a delete.
    pub fn delete(mut self, server_id: &str) -> Self {
        self.deletes.push((sync::DELETE, server_id.to_string()));
        self
    }

    /// Adds a soft delete.
    pub fn soft_delete(mut self, server_id: &str) -> Self {
        self.deletes.push((sync::SOFT_DELETE, server_id.to_string()));
        self
    }

    /// Adds a response to a local change (`sync::CHANGE`, `sync::DELETE`, ...).
    pub fn response(mut self, command: TagToken, server_id: &str, status: u16) -> Self {
        self.responses.push((command, server_id.to_string(), status));
        self
    }

    /// Encodes the response.
    pub fn build(&self) -> Bytes {
        let mut enc = Encoder::new();
        enc.start(sync::SYNC)
            .and_then(|e| e.start(sync::COLLECTIONS))
            .and_then(|e| e.start(sync::COLLECTION))
            .and_then(|e| e.data(sync::CLASS, "Email"))
            .expect("collection");
        if let Some(key) = &self.sync_key {
            enc.data(sync::SYNC_KEY, key).expect("sync key");
        }
        enc.data(sync::COLLECTION_ID, &self.collection_id)
            .and_then(|e| e.data(sync::STATUS, &self.status.to_string()))
            .expect("status");
        if self.more_available {
            enc.tag(sync::MORE_AVAILABLE).expect("more available");
        }
        if !self.adds.is_empty() || !self.changes.is_empty() || !self.deletes.is_empty() {
            enc.start(sync::COMMANDS).expect("commands");
            for add in &self.adds {
                add.encode(&mut enc);
            }
            for change in &self.changes {
                change.encode(&mut enc);
            }
            for (tag, server_id) in &self.deletes {
                enc.start(*tag)
                    .and_then(|e| e.data(sync::SERVER_ID, server_id))
                    .and_then(|e| e.end())
                    .expect("delete");
            }
            enc.end().expect("commands end");
        }
        if !self.responses.is_empty() {
            enc.start(sync::RESPONSES).expect("responses");
            for (tag, server_id, status) in &self.responses {
                enc.start(*tag)
                    .and_then(|e| e.data(sync::SERVER_ID, server_id))
                    .and_then(|e| e.data(sync::STATUS, &status.to_string()))
                    .and_then(|e| e.end())
                    .expect("response");
            }
            enc.end().expect("responses end");
        }
        for _ in 0..3 {
            enc.end().expect("close");
        }
        enc.finish().expect("finish")
    }
}

/// A folder added by the server.
#[derive(Debug, Clone)]
pub struct FolderFixture {
    /// Server id.
    pub server_id: String,
    /// Parent server id, `"0"` at the top.
    pub parent_id: String,
    /// Display name.
    pub name: String,
    /// Server folder type.
    pub kind: i64,
}

impl FolderFixture {
    /// A top-level folder.
    pub fn new(server_id: &str, name: &str, kind: i64) -> Self {
        Self {
            server_id: server_id.to_string(),
            parent_id: "0".to_string(),
            name: name.to_string(),
            kind,
        }
    }

    /// Places the folder under `parent_id`.
    pub fn under(mut self, parent_id: &str) -> Self {
        self.parent_id = parent_id.to_string();
        self
    }
}

/// Builder for a FolderSync response.
#[derive(Debug, Clone)]
pub struct FolderSyncResponse {
    status: u16,
    sync_key: Option<String>,
    adds: Vec<FolderFixture>,
    updates: Vec<(String, Option<String>, Option<String>)>,
    deletes: Vec<String>,
}

impl FolderSyncResponse {
    /// A successful response carrying `sync_key`.
    pub fn new(sync_key: &str) -> Self {
        Self {
            status: 1,
            sync_key: Some(sync_key.to_string()),
            adds: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// A response with `status` and no key.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            sync_key: None,
            ..Self::new("")
        }
    }

    /// Adds a folder.
    pub fn add(mut self, folder: FolderFixture) -> Self {
        self.adds.push(folder);
        self
    }

    /// Renames or moves a folder.
    pub fn update(mut self, server_id: &str, name: Option<&str>, parent_id: Option<&str>) -> Self {
        self.updates.push((
            server_id.to_string(),
            name.map(str::to_string),
            parent_id.map(str::to_string),
        ));
        self
    }

    /// Deletes a folder.
    pub fn delete(mut self, server_id: &str) -> Self {
        self.deletes.push(server_id.to_string());
        self
    }

    /// Encodes the response.
    pub fn build(&self) -> Bytes {
        let mut enc = Encoder::new();
        enc.start(folder::FOLDER_SYNC)
            .and_then(|e| e.data(folder::STATUS, &self.status.to_string()))
            .expect("status");
        if let Some(key) = &self.sync_key {
            enc.data(folder::SYNC_KEY, key).expect("sync key");
        }
        let count = self.adds.len() + self.updates.len() + self.deletes.len();
        if count > 0 {
            enc.start(folder::CHANGES)
                .and_then(|e| e.data(folder::COUNT, &count.to_string()))
                .expect("changes");
            for add in &self.adds {
                enc.start(folder::ADD)
                    .and_then(|e| e.data(folder::SERVER_ID, &add.server_id))
                    .and_then(|e| e.data(folder::PARENT_ID, &add.parent_id))
                    .and_then(|e| e.data(folder::DISPLAY_NAME, &add.name))
                    .and_then(|e| e.data(folder::TYPE, &add.kind.to_string()))
                    .and_then(|e| e.end())
                    .expect("add");
            }
            for (server_id, name, parent) in &self.updates {
                enc.start(folder::UPDATE)
                    .and_then(|e| e.data(folder::SERVER_ID, server_id))
                    .expect("update");
                if let Some(parent) = parent {
                    enc.data(folder::PARENT_ID, parent).expect("parent");
                }
                if let Some(name) = name {
                    enc.data(folder::DISPLAY_NAME, name).expect("name");
                }
                enc.end().expect("update end");
            }
            for server_id in &self.deletes {
                enc.start(folder::DELETE)
                    .and_then(|e| e.data(folder::SERVER_ID, server_id))
                    .and_then(|e| e.end())
                    .expect("delete");
            }
            enc.end().expect("changes end");
        }
        enc.end().expect("folder sync end");
        enc.finish().expect("finish")
    }
}

/// Flattens a request or response into `Page:Tag` and `Page:Tag=value` lines.
pub fn describe(bytes: &[u8]) -> Vec<String> {
    let mut dec = Decoder::new(bytes).expect("header");
    let mut lines: Vec<String> = Vec::new();
    loop {
        match dec.next_event().expect("well-formed document") {
            Event::Start { tag, .. } => lines.push(tag.to_string()),
            Event::Text(text) => {
                if let Some(last) = lines.last_mut() {
                    last.push('=');
                    last.push_str(text);
                }
            }
            Event::Opaque(data) => {
                if let Some(last) = lines.last_mut() {
                    last.push_str(&format!("=<{} bytes>", data.len()));
                }
            }
            Event::End(_) => {}
            Event::EndDocument => return lines,
        }
    }
}

fn insert(store: &MemoryStore, record: MutationRecord) -> RowId {
    store
        .apply_batch(TEST_SCOPE, vec![record])
        .expect("seed insert")[0]
        .row_id
        .expect("inserted row id")
}

/// Inserts a mailbox row and returns its description.
pub fn seed_mailbox(store: &MemoryStore, server_id: &str, name: &str, kind: MailboxType) -> MailboxInfo {
    let id = insert(
        store,
        MutationRecord::insert(tables::MAILBOXES)
            .with("account_key", TEST_ACCOUNT)
            .with("server_id", server_id)
            .with("display_name", name)
            .with("type", kind.as_db_value()),
    );
    MailboxInfo {
        id,
        server_id: server_id.to_string(),
        display_name: name.to_string(),
        kind,
    }
}

/// Inserts the account row.
pub fn seed_account(store: &MemoryStore) -> RowId {
    insert(
        store,
        MutationRecord::insert(tables::ACCOUNTS).with("sync_key", "0"),
    )
}

/// Inserts a synced message and returns its row id.
pub fn seed_message(store: &MemoryStore, mailbox: &MailboxInfo, server_id: &str, read: bool) -> RowId {
    insert(
        store,
        MutationRecord::insert(tables::MESSAGES)
            .with("mailbox_key", mailbox.id)
            .with("server_id", server_id)
            .with("read", read)
            .with("favorite", false)
            .with("flags", 0i64),
    )
}

/// Records that the user changed a message whose synced state was `read`/`favorite`.
pub fn seed_local_update(
    store: &MemoryStore,
    mailbox: &MailboxInfo,
    message: RowId,
    read: bool,
    favorite: bool,
) -> RowId {
    insert(
        store,
        MutationRecord::insert(tables::UPDATED)
            .with("message_id", message)
            .with("mailbox_key", mailbox.id)
            .with("read", read)
            .with("favorite", favorite)
            .with("flags", 0i64),
    )
}

/// Records that the user deleted the message `server_id`.
pub fn seed_local_delete(store: &MemoryStore, mailbox: &MailboxInfo, server_id: &str) -> RowId {
    insert(
        store,
        MutationRecord::insert(tables::DELETED)
            .with("mailbox_key", mailbox.id)
            .with("server_id", server_id),
    )
}
