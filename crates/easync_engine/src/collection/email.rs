//! Mail collection: the messages of one mailbox.

use chrono::{DateTime, Duration, Utc};
use easync_codec::tags::{base, email, email2, sync, tasks};
use easync_codec::{Decoder, Encoder, Scope, TagToken, Token};
use easync_store::{FieldValue, MutationRecord, MutationResult, RowId, Row, Selector};
use tracing::{debug, info, warn};

use super::{tables, CollectionVariant, Grammar, MailboxType, SyncContext};
use crate::batch::Batch;
use crate::config::PROTOCOL_12_0;
use crate::error::{SyncError, SyncResult};
use crate::state::CollectionSyncState;
use crate::status;

/// Bits of the `flags` message column.
pub mod message_flags {
    /// The message is a meeting invitation.
    pub const INCOMING_MEETING_INVITE: i64 = 1 << 2;
    /// The message cancels a meeting.
    pub const INCOMING_MEETING_CANCEL: i64 = 1 << 3;
    /// Placeholder for a message moved by the user; dropped after the next sync.
    pub const MOVED: i64 = 1 << 9;
    /// The user replied.
    pub const REPLIED_TO: i64 = 1 << 18;
    /// The user forwarded.
    pub const FORWARDED: i64 = 1 << 19;
}

/// The whole message is stored.
pub const LOADED_COMPLETE: i64 = 1;
/// The body is missing and must be fetched.
pub const LOADED_PARTIAL: i64 = 2;

const BODY_TYPE_HTML: &str = "2";
const MIME_SUPPORT_ALWAYS: &str = "2";
const MEETING_REQUEST_CLASS: &str = "IPM.Schedule.Meeting.Request";
const MEETING_CANCEL_CLASS: &str = "IPM.Schedule.Meeting.Canceled";
const LAST_VERB_REPLY: i64 = 1;
const LAST_VERB_REPLY_ALL: i64 = 2;
const LAST_VERB_FORWARD: i64 = 3;
const FLAG_STATUS_SET: i64 = 2;

static GRAMMAR: Grammar = Grammar {
    command: "Sync",
    request_path: &[sync::SYNC, sync::COLLECTIONS, sync::COLLECTION],
    class: Some(sync::CLASS),
    collection_id: Some(sync::COLLECTION_ID),
    root: sync::SYNC,
    nesting: &[sync::COLLECTIONS, sync::COLLECTION],
    status: sync::STATUS,
    sync_key: sync::SYNC_KEY,
    more_available: Some(sync::MORE_AVAILABLE),
    commands: sync::COMMANDS,
    responses: Some(sync::RESPONSES),
    add: sync::ADD,
    change: sync::CHANGE,
    delete: sync::DELETE,
    soft_delete: Some(sync::SOFT_DELETE),
};

/// The mailbox being synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    /// Local row id.
    pub id: RowId,
    /// Server id, sent as the collection id.
    pub server_id: String,
    /// Display name.
    pub display_name: String,
    /// Folder kind.
    pub kind: MailboxType,
}

impl MailboxInfo {
    /// Reads a mailbox row.
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.id,
            server_id: row.text("server_id")?.to_string(),
            display_name: row.text("display_name").unwrap_or_default().to_string(),
            kind: MailboxType::from_db_value(row.integer("type")?),
        })
    }

    fn key(&self) -> i64 {
        i64::try_from(self.id).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Default)]
struct IncomingAttachment {
    file_name: String,
    size: i64,
    location: String,
    content_id: Option<String>,
    is_inline: bool,
}

#[derive(Debug)]
struct IncomingMessage {
    server_id: String,
    subject: Option<String>,
    from: Option<String>,
    display_name: Option<String>,
    to: Option<String>,
    cc: Option<String>,
    reply_to: Option<String>,
    timestamp: Option<i64>,
    read: bool,
    favorite: bool,
    flags: i64,
    loaded: i64,
    html: Option<String>,
    text: Option<String>,
    mime: Option<String>,
    thread_topic: Option<String>,
    conversation_id: Option<Vec<u8>>,
    attachments: Vec<IncomingAttachment>,
}

impl Default for IncomingMessage {
    fn default() -> Self {
        Self {
            server_id: String::new(),
            subject: None,
            from: None,
            display_name: None,
            to: None,
            cc: None,
            reply_to: None,
            timestamp: None,
            read: false,
            favorite: false,
            flags: 0,
            loaded: LOADED_COMPLETE,
            html: None,
            text: None,
            mime: None,
            thread_topic: None,
            conversation_id: None,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ServerChange {
    id: RowId,
    read: Option<bool>,
    favorite: Option<bool>,
    flags: Option<i64>,
}

/// Local state of a message a change applies to.
struct Existing {
    id: RowId,
    read: bool,
    favorite: bool,
    flags: i64,
}

/// An updated-table row sent in this pass.
#[derive(Debug, Clone, Copy)]
struct SentUpdate {
    row: RowId,
    message: RowId,
}

/// Syncs the messages of one mailbox.
#[derive(Debug)]
pub struct EmailCollection {
    mailbox: MailboxInfo,
    added: Vec<IncomingMessage>,
    changed: Vec<ServerChange>,
    deleted: Vec<RowId>,
    sent_deleted: Vec<RowId>,
    sent_updated: Vec<SentUpdate>,
    moved_to_trash: Vec<(RowId, i64)>,
}

impl EmailCollection {
    /// Creates the variant for `mailbox`.
    pub fn new(mailbox: MailboxInfo) -> Self {
        Self {
            mailbox,
            added: Vec::new(),
            changed: Vec::new(),
            deleted: Vec::new(),
            sent_deleted: Vec::new(),
            sent_updated: Vec::new(),
            moved_to_trash: Vec::new(),
        }
    }

    /// The mailbox being synced.
    pub fn mailbox(&self) -> &MailboxInfo {
        &self.mailbox
    }

    fn in_mailbox(&self) -> Selector {
        Selector::field("mailbox_key", self.mailbox.key())
    }

    fn find_by_server_id(&self, server_id: &str, ctx: &SyncContext<'_>) -> SyncResult<Vec<Row>> {
        ctx.find(
            tables::MESSAGES,
            &Selector::field("server_id", server_id).and("mailbox_key", self.mailbox.key()),
        )
    }

    fn application_data(
        &self,
        dec: &mut Decoder<'_>,
        msg: &mut IncomingMessage,
        end: TagToken,
    ) -> SyncResult<()> {
        let mut mime_truncated = false;
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(end))? {
            match tag {
                email::ATTACHMENTS | base::ATTACHMENTS => attachments(dec, tag, msg)?,
                email::TO => msg.to = Some(dec.value()?),
                email::FROM => {
                    let from = dec.value()?;
                    msg.display_name = friendly_name(&from);
                    msg.from = Some(from);
                }
                email::CC => msg.cc = Some(dec.value()?),
                email::REPLY_TO => msg.reply_to = Some(dec.value()?),
                email::DATE_RECEIVED => msg.timestamp = parse_date(&dec.value()?),
                email::SUBJECT => msg.subject = Some(dec.value()?),
                email::READ => msg.read = dec.value_int()? == 1,
                base::BODY => body(dec, msg)?,
                email::FLAG => msg.favorite = flag(dec)?,
                email::MIME_TRUNCATED => mime_truncated = dec.value_int()? == 1,
                email::MIME_DATA => {
                    let data = dec.value()?;
                    if mime_truncated {
                        debug!(server_id = %msg.server_id, "partially loaded");
                        msg.loaded = LOADED_PARTIAL;
                    } else {
                        msg.mime = Some(data);
                    }
                }
                email::BODY => msg.text = Some(dec.value()?),
                email::MESSAGE_CLASS => match dec.value()?.as_str() {
                    MEETING_REQUEST_CLASS => msg.flags |= message_flags::INCOMING_MEETING_INVITE,
                    MEETING_CANCEL_CLASS => msg.flags |= message_flags::INCOMING_MEETING_CANCEL,
                    _ => {}
                },
                email::THREAD_TOPIC => msg.thread_topic = Some(dec.value()?),
                email2::CONVERSATION_ID => msg.conversation_id = Some(dec.value_bytes()?),
                email2::LAST_VERB_EXECUTED => msg.flags |= verb_flags(dec.value_int()?),
                _ => dec.skip_tag()?,
            }
        }
        Ok(())
    }

    fn change_application_data(
        &mut self,
        dec: &mut Decoder<'_>,
        existing: Option<&Existing>,
    ) -> SyncResult<()> {
        let mut read = None;
        let mut favorite = None;
        let mut flags = None;
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(sync::APPLICATION_DATA))? {
            match tag {
                email::READ => read = Some(dec.value_int()? == 1),
                email::FLAG => favorite = Some(flag(dec)?),
                email2::LAST_VERB_EXECUTED => {
                    let old = existing.map_or(0, |e| e.flags);
                    let cleared =
                        old & !(message_flags::REPLIED_TO | message_flags::FORWARDED);
                    flags = Some(cleared | verb_flags(dec.value_int()?));
                }
                _ => dec.skip_tag()?,
            }
        }

        let Some(existing) = existing else {
            return Ok(());
        };
        let read_changed = read.is_some_and(|r| r != existing.read);
        let favorite_changed = favorite.is_some_and(|f| f != existing.favorite);
        if read_changed || favorite_changed || flags.is_some() {
            self.changed.push(ServerChange {
                id: existing.id,
                read,
                favorite,
                flags,
            });
        }
        Ok(())
    }

    fn message_record(&self, msg: &IncomingMessage) -> MutationRecord {
        MutationRecord::insert(tables::MESSAGES)
            .with("mailbox_key", self.mailbox.key())
            .with("server_id", msg.server_id.as_str())
            .with("subject", msg.subject.clone())
            .with("from", msg.from.clone())
            .with("display_name", msg.display_name.clone())
            .with("to", msg.to.clone())
            .with("cc", msg.cc.clone())
            .with("reply_to", msg.reply_to.clone())
            .with("timestamp", msg.timestamp)
            .with("read", msg.read)
            .with("favorite", msg.favorite)
            .with("flags", msg.flags)
            .with("flag_loaded", msg.loaded)
            .with("flag_attachment", !msg.attachments.is_empty())
            .with("thread_topic", msg.thread_topic.clone())
            .with("conversation_id", msg.conversation_id.clone())
    }

    fn delete_message(&self, batch: &mut Batch, id: RowId) {
        let key = i64::try_from(id).unwrap_or(i64::MAX);
        batch.push(MutationRecord::delete(tables::BODIES, Selector::field("message_key", key)));
        batch.push(MutationRecord::delete(
            tables::ATTACHMENTS,
            Selector::field("message_key", key),
        ));
        batch.push(MutationRecord::delete(tables::MESSAGES, Selector::Id(id)));
    }
}

impl CollectionVariant for EmailCollection {
    fn name(&self) -> &str {
        &self.mailbox.display_name
    }

    fn grammar(&self) -> &'static Grammar {
        &GRAMMAR
    }

    fn class(&self) -> Option<&'static str> {
        Some("Email")
    }

    fn collection_id(&self) -> Option<String> {
        Some(self.mailbox.server_id.clone())
    }

    fn begin_pass(&mut self) {
        self.added.clear();
        self.changed.clear();
        self.deleted.clear();
        self.sent_deleted.clear();
        self.sent_updated.clear();
        self.moved_to_trash.clear();
    }

    fn build_outgoing_options(
        &mut self,
        enc: &mut Encoder,
        state: &CollectionSyncState,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        if ctx.initial_sync {
            return Ok(());
        }
        let modern = ctx.config.supports(PROTOCOL_12_0);
        let trash = self.mailbox.kind == MailboxType::Trash;
        if modern {
            enc.data(sync::DELETES_AS_MOVES, if trash { "0" } else { "1" })?;
        } else if !trash {
            enc.tag(sync::DELETES_AS_MOVES)?;
        }
        enc.tag(sync::GET_CHANGES)?
            .data(sync::WINDOW_SIZE, &ctx.config.window_size.to_string())?;

        enc.start(sync::OPTIONS)?
            .data(sync::FILTER_TYPE, state.lookback.filter_type())?;
        if modern {
            enc.start(base::BODY_PREFERENCE)?
                .data(base::TYPE, BODY_TYPE_HTML)?
                .data(base::TRUNCATION_SIZE, &ctx.config.truncation_size.to_string())?
                .end()?;
        } else {
            enc.data(sync::MIME_SUPPORT, MIME_SUPPORT_ALWAYS)?
                .data(
                    sync::MIME_TRUNCATION,
                    &ctx.config.mime_truncation_size.to_string(),
                )?;
        }
        enc.end()?;
        Ok(())
    }

    fn send_local_changes(
        &mut self,
        enc: &mut Encoder,
        _state: &CollectionSyncState,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        if matches!(self.mailbox.kind, MailboxType::Drafts | MailboxType::Outbox) {
            return Ok(());
        }
        let mut commands = Commands::default();

        for row in ctx.find(tables::DELETED, &self.in_mailbox())? {
            let Some(server_id) = row.text("server_id") else {
                continue;
            };
            commands.open(enc)?;
            enc.start(sync::DELETE)?
                .data(sync::SERVER_ID, server_id)?
                .end()?;
            self.sent_deleted.push(row.id);
        }

        let trash = ctx
            .find(
                tables::MAILBOXES,
                &Selector::field("type", MailboxType::Trash.as_db_value()),
            )?
            .first()
            .map(|row| row.id);
        let send_flags = ctx.config.supports(PROTOCOL_12_0);

        for original in ctx.find(tables::UPDATED, &self.in_mailbox())? {
            let Some(message) = original
                .integer("message_id")
                .and_then(|id| RowId::try_from(id).ok())
            else {
                continue;
            };
            self.sent_updated.push(SentUpdate {
                row: original.id,
                message,
            });
            let Some(current) = ctx
                .find(tables::MESSAGES, &Selector::Id(message))?
                .into_iter()
                .next()
            else {
                continue;
            };
            let Some(server_id) = current.text("server_id") else {
                continue;
            };

            let mailbox = current.integer("mailbox_key");
            if mailbox.is_some() && mailbox == trash.and_then(|id| i64::try_from(id).ok()) {
                commands.open(enc)?;
                enc.start(sync::DELETE)?
                    .data(sync::SERVER_ID, server_id)?
                    .end()?;
                let flags = original.integer("flags").unwrap_or(0);
                self.moved_to_trash.push((message, flags | message_flags::MOVED));
                continue;
            } else if mailbox != original.integer("mailbox_key") {
                // Moves are not expressible in Sync; keep the row until the move is handled.
                self.sent_updated.pop();
            }

            let favorite = bool_column(&current, "favorite");
            let flag_change = send_flags && favorite != bool_column(&original, "favorite");
            let read = bool_column(&current, "read");
            let read_change = read != bool_column(&original, "read");
            if !flag_change && !read_change {
                continue;
            }

            commands.open(enc)?;
            enc.start(sync::CHANGE)?
                .data(sync::SERVER_ID, server_id)?
                .start(sync::APPLICATION_DATA)?;
            if read_change {
                enc.data(email::READ, if read { "1" } else { "0" })?;
            }
            if flag_change {
                if favorite {
                    let now = Utc::now();
                    let start = format_eas_date(now);
                    let due = format_eas_date(now + Duration::weeks(1));
                    enc.start(email::FLAG)?
                        .data(email::FLAG_STATUS, "2")?
                        .data(email::FLAG_TYPE, "FollowUp")?
                        .data(tasks::START_DATE, &start)?
                        .data(tasks::UTC_START_DATE, &start)?
                        .data(tasks::DUE_DATE, &due)?
                        .data(tasks::UTC_DUE_DATE, &due)?
                        .end()?;
                } else {
                    enc.tag(email::FLAG)?;
                }
            }
            enc.end()?.end()?;
        }

        commands.close(enc)?;
        debug!(
            collection = %self.mailbox.display_name,
            deletes = self.sent_deleted.len(),
            updates = self.sent_updated.len(),
            "local changes sent"
        );
        Ok(())
    }

    fn parse_add(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()> {
        let mut msg = IncomingMessage::default();
        let mut item_status = None;
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(sync::ADD))? {
            match tag {
                sync::SERVER_ID => msg.server_id = dec.value()?,
                sync::STATUS => item_status = Some(dec.value_int()?),
                sync::APPLICATION_DATA => {
                    self.application_data(dec, &mut msg, sync::APPLICATION_DATA)?
                }
                _ => dec.skip_tag()?,
            }
        }
        if let Some(code) = item_status.filter(|code| *code != 1) {
            let code = u16::try_from(code).unwrap_or(u16::MAX);
            warn!(server_id = %msg.server_id, status = code, "add rejected");
            return Err(status::interpret(code)
                .into_error(code)
                .unwrap_or(SyncError::Fatal { status: code }));
        }
        ctx.session.add_changes(1);
        self.added.push(msg);
        Ok(())
    }

    fn parse_change(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()> {
        let mut existing = None;
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(sync::CHANGE))? {
            match tag {
                sync::SERVER_ID => {
                    let server_id = dec.value()?;
                    existing = self
                        .find_by_server_id(&server_id, ctx)?
                        .first()
                        .map(|row| Existing {
                            id: row.id,
                            read: bool_column(row, "read"),
                            favorite: bool_column(row, "favorite"),
                            flags: row.integer("flags").unwrap_or(0),
                        });
                    if existing.is_none() {
                        debug!(server_id = %server_id, "change for unknown message");
                    }
                }
                sync::APPLICATION_DATA => self.change_application_data(dec, existing.as_ref())?,
                _ => dec.skip_tag()?,
            }
        }
        ctx.session.add_changes(1);
        Ok(())
    }

    fn parse_delete(
        &mut self,
        dec: &mut Decoder<'_>,
        tag: TagToken,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        while let Token::Tag(child) = dec.next_tag(Scope::Tag(tag))? {
            if child == sync::SERVER_ID {
                let server_id = dec.value()?;
                for row in self.find_by_server_id(&server_id, ctx)? {
                    if !self.deleted.contains(&row.id) {
                        self.deleted.push(row.id);
                    }
                }
            } else {
                dec.skip_tag()?;
            }
        }
        ctx.session.add_changes(1);
        Ok(())
    }

    fn parse_responses(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()> {
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(sync::RESPONSES))? {
            if tag != sync::ADD && tag != sync::CHANGE && tag != sync::DELETE {
                dec.skip_tag()?;
                continue;
            }
            let mut server_id = None;
            while let Token::Tag(child) = dec.next_tag(Scope::Tag(tag))? {
                match child {
                    sync::SERVER_ID => server_id = Some(dec.value()?),
                    sync::STATUS => {
                        let code = dec.value_int()?;
                        if code != i64::from(status::code::CONFLICT) {
                            continue;
                        }
                        let Some(server_id) = server_id.as_deref() else {
                            continue;
                        };
                        if let Some(row) = self.find_by_server_id(server_id, ctx)?.first() {
                            info!(server_id, "update rejected, will retry");
                            self.sent_updated.retain(|sent| sent.message != row.id);
                            ctx.session.set_upsync_failed(true);
                        }
                    }
                    _ => dec.skip_tag()?,
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, batch: &mut Batch, _ctx: &SyncContext<'_>) -> SyncResult<()> {
        for msg in &self.added {
            let message = batch.push(self.message_record(msg));
            batch.push_deferred(
                MutationRecord::insert(tables::BODIES)
                    .with("mailbox_key", self.mailbox.key())
                    .with("html", msg.html.clone())
                    .with("text", msg.text.clone())
                    .with("mime", msg.mime.clone()),
                "message_key",
                message,
            );
            for att in &msg.attachments {
                batch.push_deferred(
                    MutationRecord::insert(tables::ATTACHMENTS)
                        .with("mailbox_key", self.mailbox.key())
                        .with("file_name", att.file_name.as_str())
                        .with("size", att.size)
                        .with("location", att.location.as_str())
                        .with("content_id", att.content_id.clone())
                        .with("is_inline", att.is_inline),
                    "message_key",
                    message,
                );
            }
            batch.separator();
        }

        for id in &self.deleted {
            self.delete_message(batch, *id);
            batch.separator();
        }

        for change in &self.changed {
            let mut record = MutationRecord::update(tables::MESSAGES, Selector::Id(change.id));
            if let Some(read) = change.read {
                record.set("read", read);
            }
            if let Some(favorite) = change.favorite {
                record.set("favorite", favorite);
            }
            if let Some(flags) = change.flags {
                record.set("flags", flags);
            }
            batch.push(record);
        }

        for (id, flags) in &self.moved_to_trash {
            batch.push(
                MutationRecord::update(tables::MESSAGES, Selector::Id(*id)).with("flags", *flags),
            );
        }

        debug!(
            collection = %self.mailbox.display_name,
            added = self.added.len(),
            deleted = self.deleted.len(),
            changed = self.changed.len(),
            "mail changes staged"
        );
        Ok(())
    }

    fn wipe(&mut self, batch: &mut Batch, _ctx: &SyncContext<'_>) -> SyncResult<()> {
        for table in [
            tables::BODIES,
            tables::ATTACHMENTS,
            tables::MESSAGES,
            tables::DELETED,
            tables::UPDATED,
        ] {
            batch.push(MutationRecord::delete(table, self.in_mailbox()));
        }
        Ok(())
    }

    fn persist_state(&self, batch: &mut Batch, state: &CollectionSyncState, _ctx: &SyncContext<'_>) {
        batch.push(
            MutationRecord::update(tables::MAILBOXES, Selector::Id(self.mailbox.id))
                .with("sync_key", state.sync_key.as_str())
                .with("sync_interval", state.sync_interval.as_db_value())
                .with("sync_lookback", state.lookback.as_db_value()),
        );
    }

    fn after_commit(
        &mut self,
        _results: &[MutationResult],
        ctx: &SyncContext<'_>,
    ) -> SyncResult<Batch> {
        let mut batch = Batch::new();

        for row in ctx.find(tables::MESSAGES, &self.in_mailbox())? {
            if row.integer("flags").unwrap_or(0) & message_flags::MOVED != 0 {
                self.delete_message(&mut batch, row.id);
            }
        }

        if !ctx.session.upsync_failed() {
            for id in self.sent_deleted.drain(..) {
                batch.push(MutationRecord::delete(tables::DELETED, Selector::Id(id)));
            }
            for sent in self.sent_updated.drain(..) {
                batch.push(MutationRecord::delete(tables::UPDATED, Selector::Id(sent.row)));
            }
        }
        Ok(batch)
    }
}

/// Writes the Commands wrapper once, before the first local change.
#[derive(Default)]
struct Commands {
    open: bool,
}

impl Commands {
    fn open(&mut self, enc: &mut Encoder) -> SyncResult<()> {
        if !self.open {
            enc.start(sync::COMMANDS)?;
            self.open = true;
        }
        Ok(())
    }

    fn close(self, enc: &mut Encoder) -> SyncResult<()> {
        if self.open {
            enc.end()?;
        }
        Ok(())
    }
}

fn body(dec: &mut Decoder<'_>, msg: &mut IncomingMessage) -> SyncResult<()> {
    let mut body_type = None;
    let mut data = String::new();
    while let Token::Tag(tag) = dec.next_tag(Scope::Tag(base::BODY))? {
        match tag {
            base::TYPE => body_type = Some(dec.value()?),
            base::DATA => data = dec.value()?,
            _ => dec.skip_tag()?,
        }
    }
    if body_type.as_deref() == Some(BODY_TYPE_HTML) {
        msg.html = Some(data);
    } else {
        msg.text = Some(data);
    }
    Ok(())
}

fn flag(dec: &mut Decoder<'_>) -> SyncResult<bool> {
    let mut set = false;
    while let Token::Tag(tag) = dec.next_tag(Scope::Tag(email::FLAG))? {
        if tag == email::FLAG_STATUS {
            set = dec.value_int()? == FLAG_STATUS_SET;
        } else {
            dec.skip_tag()?;
        }
    }
    Ok(set)
}

fn attachments(
    dec: &mut Decoder<'_>,
    container: TagToken,
    msg: &mut IncomingMessage,
) -> SyncResult<()> {
    while let Token::Tag(tag) = dec.next_tag(Scope::Tag(container))? {
        if tag == email::ATTACHMENT || tag == base::ATTACHMENT {
            if let Some(att) = attachment(dec, tag)? {
                msg.attachments.push(att);
            }
        } else {
            dec.skip_tag()?;
        }
    }
    Ok(())
}

fn attachment(dec: &mut Decoder<'_>, end: TagToken) -> SyncResult<Option<IncomingAttachment>> {
    let mut file_name = None;
    let mut size = None;
    let mut location = None;
    let mut is_inline = false;
    let mut content_id = None;
    while let Token::Tag(tag) = dec.next_tag(Scope::Tag(end))? {
        match tag {
            email::DISPLAY_NAME | base::DISPLAY_NAME => file_name = Some(dec.value()?),
            email::ATT_NAME | base::FILE_REFERENCE => location = Some(dec.value()?),
            email::ATT_SIZE | base::ESTIMATED_DATA_SIZE => size = Some(dec.value_int()?),
            base::IS_INLINE => is_inline = dec.value_int()? == 1,
            base::CONTENT_ID => content_id = Some(dec.value()?),
            _ => dec.skip_tag()?,
        }
    }
    let (Some(file_name), Some(size), Some(location)) = (file_name, size, location) else {
        return Ok(None);
    };
    Ok(Some(IncomingAttachment {
        file_name,
        size,
        location,
        content_id: content_id.filter(|id| is_inline && !id.is_empty()),
        is_inline,
    }))
}

fn verb_flags(verb: i64) -> i64 {
    match verb {
        LAST_VERB_REPLY | LAST_VERB_REPLY_ALL => message_flags::REPLIED_TO,
        LAST_VERB_FORWARD => message_flags::FORWARDED,
        _ => 0,
    }
}

fn bool_column(row: &Row, column: &str) -> bool {
    row.get(column)
        .and_then(FieldValue::as_bool)
        .unwrap_or(false)
}

/// Display name of the first address in a header list.
fn friendly_name(addresses: &str) -> Option<String> {
    let first = addresses.split(',').next()?.trim();
    let name = match first.find('<') {
        Some(open) => {
            let name = first[..open].trim().trim_matches('"').trim();
            if name.is_empty() {
                first[open + 1..].trim_end_matches('>').trim()
            } else {
                name
            }
        }
        None => first,
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Milliseconds since the epoch of an EAS date such as `2010-01-04T09:13:47.000Z`.
fn parse_date(text: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|date| date.timestamp_millis())
}

fn format_eas_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}
