//! Folder hierarchy of an account (FolderSync).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use easync_codec::tags::folder;
use easync_codec::{Decoder, Scope, TagToken, Token};
use easync_store::{FieldValue, MutationRecord, MutationResult, Row, RowId, Selector};
use tracing::{debug, info};

use super::{tables, CollectionVariant, Grammar, MailboxType, SyncContext};
use crate::batch::Batch;
use crate::error::SyncResult;
use crate::state::{CollectionSyncState, Lookback, SyncInterval};
use crate::status::{self, StatusOutcome};

/// Folders inserted per transaction on an initial sync.
pub const MAILBOX_COMMIT_SIZE: usize = 20;

/// Display name of the server folder of unresolved conflicts, never shown locally.
pub const SYNC_ISSUES: &str = "Sync Issues";

/// Folder types sent by the server.
pub mod server_folder_type {
    /// User-created folder of unspecified content.
    pub const USER_GENERIC: i64 = 1;
    /// Inbox.
    pub const INBOX: i64 = 2;
    /// Drafts.
    pub const DRAFTS: i64 = 3;
    /// Deleted items.
    pub const DELETED: i64 = 4;
    /// Sent items.
    pub const SENT: i64 = 5;
    /// Outbox.
    pub const OUTBOX: i64 = 6;
    /// Tasks.
    pub const TASKS: i64 = 7;
    /// Calendar.
    pub const CALENDAR: i64 = 8;
    /// Contacts.
    pub const CONTACTS: i64 = 9;
    /// Notes.
    pub const NOTES: i64 = 10;
    /// Journal.
    pub const JOURNAL: i64 = 11;
    /// User-created mail folder.
    pub const USER_MAILBOX: i64 = 12;
}

const NO_PARENT: &str = "0";

static GRAMMAR: Grammar = Grammar {
    command: "FolderSync",
    request_path: &[folder::FOLDER_SYNC],
    class: None,
    collection_id: None,
    root: folder::FOLDER_SYNC,
    nesting: &[],
    status: folder::STATUS,
    sync_key: folder::SYNC_KEY,
    more_available: None,
    commands: folder::CHANGES,
    responses: None,
    add: folder::ADD,
    change: folder::UPDATE,
    delete: folder::DELETE,
    soft_delete: None,
};

#[derive(Debug, Clone)]
struct NewFolder {
    server_id: String,
    display_name: String,
    kind: MailboxType,
    parent_server_id: Option<String>,
    interval: SyncInterval,
}

#[derive(Debug)]
struct FolderUpdate {
    id: RowId,
    display_name: Option<String>,
    parent_server_id: Option<Option<String>>,
}

/// Syncs the folder list of one account.
///
/// Sync options of folders dropped by a hierarchy reset are kept here and
/// put back once the next initial sync has re-created the folders, so the
/// same value must be used across passes.
#[derive(Debug)]
pub struct FolderHierarchy {
    account_id: RowId,
    account_interval: SyncInterval,
    added: Vec<NewFolder>,
    deleted: Vec<RowId>,
    updated: Vec<FolderUpdate>,
    parent_fixups: BTreeSet<String>,
    saved_options: BTreeMap<String, (SyncInterval, Lookback)>,
}

impl FolderHierarchy {
    /// Creates the variant. `account_interval` is given to the folders that
    /// sync on the account schedule.
    pub fn new(account_id: RowId, account_interval: SyncInterval) -> Self {
        Self {
            account_id,
            account_interval,
            added: Vec::new(),
            deleted: Vec::new(),
            updated: Vec::new(),
            parent_fixups: BTreeSet::new(),
            saved_options: BTreeMap::new(),
        }
    }

    /// Number of folders whose options wait to be restored.
    pub fn saved_options(&self) -> usize {
        self.saved_options.len()
    }

    fn account_key(&self) -> i64 {
        i64::try_from(self.account_id).unwrap_or(i64::MAX)
    }

    fn local_folders(&self, ctx: &SyncContext<'_>) -> SyncResult<Vec<Row>> {
        ctx.find(
            tables::MAILBOXES,
            &Selector::field("account_key", self.account_key()),
        )
    }

    fn find_folder(&self, server_id: &str, ctx: &SyncContext<'_>) -> SyncResult<Option<Row>> {
        Ok(ctx
            .find(
                tables::MAILBOXES,
                &Selector::field("server_id", server_id).and("account_key", self.account_key()),
            )?
            .into_iter()
            .next())
    }

    /// Maps a server type; `None` for types not kept locally.
    fn local_type(&self, server_type: i64) -> Option<(MailboxType, SyncInterval)> {
        use server_folder_type::*;
        let account = self.account_interval;
        let mapped = match server_type {
            INBOX => (MailboxType::Inbox, account),
            CONTACTS => (MailboxType::Contacts, account),
            CALENDAR => (MailboxType::Calendar, account),
            OUTBOX => (MailboxType::Outbox, SyncInterval::Never),
            SENT => (MailboxType::Sent, SyncInterval::Never),
            DRAFTS => (MailboxType::Drafts, SyncInterval::Never),
            DELETED => (MailboxType::Trash, SyncInterval::Never),
            USER_MAILBOX => (MailboxType::Mail, SyncInterval::Never),
            USER_GENERIC => (MailboxType::Unknown, SyncInterval::Never),
            _ => return None,
        };
        Some(mapped)
    }

    /// Resolves a generic folder through its ancestors: it holds mail if
    /// the nearest typed ancestor does.
    fn holds_mail(
        &self,
        folder: &NewFolder,
        incoming: &HashMap<&str, &NewFolder>,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<bool> {
        let mut kind = folder.kind;
        let mut parent = folder.parent_server_id.clone();
        let mut seen = BTreeSet::new();
        loop {
            if kind.is_email() {
                return Ok(true);
            }
            if kind != MailboxType::Unknown {
                return Ok(false);
            }
            let Some(server_id) = parent.take() else {
                return Ok(false);
            };
            if !seen.insert(server_id.clone()) {
                return Ok(false);
            }
            if let Some(new) = incoming.get(server_id.as_str()) {
                kind = new.kind;
                parent = new.parent_server_id.clone();
            } else if let Some(row) = self.find_folder(&server_id, ctx)? {
                kind = MailboxType::from_db_value(row.integer("type").unwrap_or(-1));
                parent = row.text("parent_server_id").map(str::to_string);
            } else {
                return Ok(false);
            }
        }
    }

    /// Added folders with parents ahead of their children.
    fn parent_first(&self) -> Vec<&NewFolder> {
        let index: HashMap<&str, usize> = self
            .added
            .iter()
            .enumerate()
            .map(|(i, f)| (f.server_id.as_str(), i))
            .collect();
        let mut placed = vec![false; self.added.len()];
        let mut order = Vec::with_capacity(self.added.len());
        for start in 0..self.added.len() {
            let mut chain = Vec::new();
            let mut at = Some(start);
            while let Some(i) = at {
                if placed[i] || chain.contains(&i) {
                    break;
                }
                chain.push(i);
                at = self.added[i]
                    .parent_server_id
                    .as_deref()
                    .and_then(|p| index.get(p).copied());
            }
            for i in chain.into_iter().rev() {
                placed[i] = true;
                order.push(&self.added[i]);
            }
        }
        order
    }

    /// Deletes every folder but the account mailbox, optionally saving
    /// their sync options first.
    fn delete_local_folders(
        &mut self,
        batch: &mut Batch,
        ctx: &SyncContext<'_>,
        save: bool,
    ) -> SyncResult<()> {
        for row in self.local_folders(ctx)? {
            let kind = MailboxType::from_db_value(row.integer("type").unwrap_or(-1));
            if kind == MailboxType::AccountMailbox {
                continue;
            }
            if save {
                let interval = row
                    .integer("sync_interval")
                    .map_or(SyncInterval::Never, SyncInterval::from_db_value);
                let lookback = row
                    .integer("sync_lookback")
                    .map_or(Lookback::Unknown, Lookback::from_db_value);
                if let Some(server_id) = row.text("server_id") {
                    if interval != SyncInterval::Never || lookback != Lookback::Unknown {
                        self.saved_options
                            .insert(server_id.to_string(), (interval, lookback));
                    }
                }
            }
            batch.push(MutationRecord::delete(tables::MAILBOXES, Selector::Id(row.id)));
        }
        Ok(())
    }
}

impl CollectionVariant for FolderHierarchy {
    fn name(&self) -> &str {
        "folders"
    }

    fn grammar(&self) -> &'static Grammar {
        &GRAMMAR
    }

    fn interpret_status(&self, status: u16) -> StatusOutcome {
        status::interpret_folder(status)
    }

    fn begin_pass(&mut self) {
        self.added.clear();
        self.deleted.clear();
        self.updated.clear();
        self.parent_fixups.clear();
    }

    fn parse_add(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()> {
        let mut server_id = None;
        let mut display_name = String::new();
        let mut parent_id = None;
        let mut server_type = None;
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(folder::ADD))? {
            match tag {
                folder::DISPLAY_NAME => display_name = dec.value()?,
                folder::SERVER_ID => server_id = Some(dec.value()?),
                folder::PARENT_ID => parent_id = Some(dec.value()?),
                folder::TYPE => server_type = Some(dec.value_int()?),
                _ => dec.skip_tag()?,
            }
        }

        let (Some(server_id), Some(server_type)) = (server_id, server_type) else {
            return Ok(());
        };
        let Some((kind, interval)) = self.local_type(server_type) else {
            debug!(server_id = %server_id, server_type, "ignoring folder type");
            return Ok(());
        };
        let parent_server_id = parent_id.filter(|p| p != NO_PARENT);
        if let Some(parent) = &parent_server_id {
            if !ctx.initial_sync {
                self.parent_fixups.insert(parent.clone());
            }
        }
        self.added.push(NewFolder {
            server_id,
            display_name,
            kind,
            parent_server_id,
            interval,
        });
        Ok(())
    }

    fn parse_change(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()> {
        let mut server_id = None;
        let mut display_name = None;
        let mut parent_id = None;
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(folder::UPDATE))? {
            match tag {
                folder::SERVER_ID => server_id = Some(dec.value()?),
                folder::DISPLAY_NAME => display_name = Some(dec.value()?),
                folder::PARENT_ID => parent_id = Some(dec.value()?),
                _ => dec.skip_tag()?,
            }
        }

        let Some(server_id) = server_id else {
            return Ok(());
        };
        if display_name.is_none() && parent_id.is_none() {
            return Ok(());
        }
        let Some(row) = self.find_folder(&server_id, ctx)? else {
            debug!(server_id = %server_id, "update for unknown folder");
            return Ok(());
        };

        let parent_server_id = parent_id.map(|p| Some(p).filter(|p| p != NO_PARENT));
        if let Some(new_parent) = &parent_server_id {
            if let Some(parent) = new_parent {
                self.parent_fixups.insert(parent.clone());
            }
            if let Some(old) = row.text("parent_server_id") {
                self.parent_fixups.insert(old.to_string());
            }
        }
        self.updated.push(FolderUpdate {
            id: row.id,
            display_name,
            parent_server_id,
        });
        Ok(())
    }

    fn parse_delete(
        &mut self,
        dec: &mut Decoder<'_>,
        tag: TagToken,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        while let Token::Tag(child) = dec.next_tag(Scope::Tag(tag))? {
            if child != folder::SERVER_ID {
                dec.skip_tag()?;
                continue;
            }
            let server_id = dec.value()?;
            if let Some(row) = self.find_folder(&server_id, ctx)? {
                debug!(server_id = %server_id, "deleting folder");
                if !ctx.initial_sync {
                    if let Some(parent) = row.text("parent_server_id") {
                        self.parent_fixups.insert(parent.to_string());
                    }
                }
                self.deleted.push(row.id);
            }
        }
        Ok(())
    }

    fn commit(&mut self, batch: &mut Batch, ctx: &SyncContext<'_>) -> SyncResult<()> {
        if ctx.initial_sync {
            self.delete_local_folders(batch, ctx, false)?;
            batch.separator();
        }

        for id in &self.deleted {
            batch.push(MutationRecord::delete(tables::MAILBOXES, Selector::Id(*id)));
        }

        for update in &self.updated {
            let mut record = MutationRecord::update(tables::MAILBOXES, Selector::Id(update.id));
            if let Some(name) = &update.display_name {
                record.set("display_name", name.as_str());
            }
            if let Some(parent) = &update.parent_server_id {
                record.set("parent_server_id", parent.clone());
                record.set("parent_key", FieldValue::Null);
            }
            batch.push(record);
        }

        let incoming: HashMap<&str, &NewFolder> = self
            .added
            .iter()
            .map(|f| (f.server_id.as_str(), f))
            .collect();
        let mut chunk_start = batch.next_offset();
        let mut in_chunk: HashMap<String, usize> = HashMap::new();
        let mut inserted = 0usize;
        for new in self.parent_first() {
            let mut kind = new.kind;
            if kind == MailboxType::Unknown {
                if !self.holds_mail(new, &incoming, ctx)? {
                    info!(folder = %new.display_name, "rejecting folder of unknown type");
                    continue;
                }
                kind = MailboxType::Mail;
            }

            let record = MutationRecord::insert(tables::MAILBOXES)
                .with("account_key", self.account_key())
                .with("server_id", new.server_id.as_str())
                .with("display_name", new.display_name.as_str())
                .with("type", kind.as_db_value())
                .with("parent_server_id", new.parent_server_id.clone())
                .with("sync_interval", new.interval.as_db_value())
                .with("sync_lookback", Lookback::Unknown.as_db_value())
                .with("sync_key", crate::state::SyncKey::INITIAL)
                .with("visible", kind.is_email())
                .with("has_children", false);
            let parent_offset = new
                .parent_server_id
                .as_deref()
                .and_then(|p| in_chunk.get(p).copied())
                .filter(|offset| *offset >= chunk_start);
            let offset = match parent_offset {
                Some(parent) => batch.push_deferred(record, "parent_key", parent),
                None => batch.push(record.with("parent_key", FieldValue::Null)),
            };
            in_chunk.insert(new.server_id.clone(), offset);

            inserted += 1;
            if ctx.initial_sync && inserted % MAILBOX_COMMIT_SIZE == 0 {
                batch.separator();
                chunk_start = batch.next_offset();
            }
        }

        info!(
            added = inserted,
            deleted = self.deleted.len(),
            updated = self.updated.len(),
            "folder changes staged"
        );
        Ok(())
    }

    fn wipe(&mut self, batch: &mut Batch, ctx: &SyncContext<'_>) -> SyncResult<()> {
        self.delete_local_folders(batch, ctx, true)?;
        info!(saved = self.saved_options.len(), "folder hierarchy wiped");
        Ok(())
    }

    fn persist_state(&self, batch: &mut Batch, state: &CollectionSyncState, _ctx: &SyncContext<'_>) {
        batch.push(
            MutationRecord::update(tables::ACCOUNTS, Selector::Id(self.account_id))
                .with("sync_key", state.sync_key.as_str())
                .with("sync_interval", state.sync_interval.as_db_value()),
        );
    }

    fn after_commit(
        &mut self,
        _results: &[MutationResult],
        ctx: &SyncContext<'_>,
    ) -> SyncResult<Batch> {
        let mut batch = Batch::new();
        let mut folders = self.local_folders(ctx)?;

        if let Some(issues) = folders
            .iter()
            .find(|row| row.text("display_name") == Some(SYNC_ISSUES))
        {
            let issues_id = issues.id;
            let issues_server_id = issues.text("server_id").map(str::to_string);
            batch.push(MutationRecord::delete(tables::MAILBOXES, Selector::Id(issues_id)));
            if let Some(server_id) = &issues_server_id {
                batch.push(MutationRecord::delete(
                    tables::MAILBOXES,
                    Selector::field("parent_server_id", server_id.as_str())
                        .and("account_key", self.account_key()),
                ));
            }
            folders.retain(|row| {
                row.id != issues_id
                    && (issues_server_id.is_none()
                        || row.text("parent_server_id") != issues_server_id.as_deref())
            });
        }

        if ctx.initial_sync && !self.saved_options.is_empty() {
            for (server_id, (interval, lookback)) in std::mem::take(&mut self.saved_options) {
                debug!(server_id = %server_id, "restoring sync options");
                batch.push(
                    MutationRecord::update(
                        tables::MAILBOXES,
                        Selector::field("server_id", server_id)
                            .and("account_key", self.account_key()),
                    )
                    .with("sync_interval", interval.as_db_value())
                    .with("sync_lookback", lookback.as_db_value()),
                );
            }
        }

        let mut parents = std::mem::take(&mut self.parent_fixups);
        parents.extend(
            self.added
                .iter()
                .filter_map(|folder| folder.parent_server_id.clone()),
        );
        for row in &folders {
            let unlinked = row.get("parent_key").map_or(true, FieldValue::is_null);
            if let (Some(parent), true) = (row.text("parent_server_id"), unlinked) {
                parents.insert(parent.to_string());
            }
        }
        for parent_server_id in &parents {
            let Some(parent) = folders
                .iter()
                .find(|row| row.text("server_id") == Some(parent_server_id.as_str()))
            else {
                continue;
            };
            let parent_key = i64::try_from(parent.id).unwrap_or(i64::MAX);
            let mut children = 0usize;
            for child in folders
                .iter()
                .filter(|row| row.text("parent_server_id") == Some(parent_server_id.as_str()))
            {
                children += 1;
                if child.integer("parent_key") != Some(parent_key) {
                    batch.push(
                        MutationRecord::update(tables::MAILBOXES, Selector::Id(child.id))
                            .with("parent_key", parent_key),
                    );
                }
            }
            batch.push(
                MutationRecord::update(tables::MAILBOXES, Selector::Id(parent.id))
                    .with("has_children", children > 0),
            );
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(server_id: &str, parent: Option<&str>, kind: MailboxType) -> NewFolder {
        NewFolder {
            server_id: server_id.to_string(),
            display_name: server_id.to_string(),
            kind,
            parent_server_id: parent.map(str::to_string),
            interval: SyncInterval::Never,
        }
    }

    #[test]
    fn type_mapping() {
        let hierarchy = FolderHierarchy::new(1, SyncInterval::Push);
        assert_eq!(
            hierarchy.local_type(server_folder_type::INBOX),
            Some((MailboxType::Inbox, SyncInterval::Push))
        );
        assert_eq!(
            hierarchy.local_type(server_folder_type::DELETED),
            Some((MailboxType::Trash, SyncInterval::Never))
        );
        assert_eq!(
            hierarchy.local_type(server_folder_type::USER_GENERIC),
            Some((MailboxType::Unknown, SyncInterval::Never))
        );
        assert_eq!(hierarchy.local_type(server_folder_type::TASKS), None);
        assert_eq!(hierarchy.local_type(server_folder_type::NOTES), None);
        assert_eq!(hierarchy.local_type(99), None);
    }

    #[test]
    fn parents_are_ordered_first() {
        let mut hierarchy = FolderHierarchy::new(1, SyncInterval::Never);
        hierarchy.added = vec![
            folder("c", Some("b"), MailboxType::Mail),
            folder("b", Some("a"), MailboxType::Mail),
            folder("x", None, MailboxType::Inbox),
            folder("a", None, MailboxType::Mail),
        ];
        let order: Vec<&str> = hierarchy
            .parent_first()
            .iter()
            .map(|f| f.server_id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "x"]);
    }

    #[test]
    fn parent_cycles_terminate() {
        let mut hierarchy = FolderHierarchy::new(1, SyncInterval::Never);
        hierarchy.added = vec![
            folder("a", Some("b"), MailboxType::Mail),
            folder("b", Some("a"), MailboxType::Mail),
        ];
        assert_eq!(hierarchy.parent_first().len(), 2);
    }
}
