//! Collection sync variants.
//!
//! The engine is generic over [`CollectionVariant`]: the variant says what
//! the command looks like ([`Grammar`]), adds its own request options and
//! local changes, turns parsed commands into mutations, and persists its
//! cursor. Two variants ship here:
//!
//! - [`EmailCollection`]: the messages of one mailbox (Sync command)
//! - [`FolderHierarchy`]: the account's folder tree (FolderSync command)

mod email;
mod folder;

pub use email::{message_flags, EmailCollection, MailboxInfo, LOADED_COMPLETE, LOADED_PARTIAL};
pub use folder::{server_folder_type, FolderHierarchy, MAILBOX_COMMIT_SIZE, SYNC_ISSUES};

use easync_codec::{Decoder, Encoder, TagToken};
use easync_store::{MutationResult, RecordReader, Row};

use crate::batch::Batch;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::session::Session;
use crate::state::CollectionSyncState;
use crate::status::{self, StatusOutcome};

/// Table names shared by the variants.
pub mod tables {
    /// Accounts; holds the folder hierarchy key.
    pub const ACCOUNTS: &str = "accounts";
    /// Folders.
    pub const MAILBOXES: &str = "mailboxes";
    /// Messages.
    pub const MESSAGES: &str = "messages";
    /// Message bodies.
    pub const BODIES: &str = "bodies";
    /// Message attachments.
    pub const ATTACHMENTS: &str = "attachments";
    /// Locally deleted messages waiting to be sent.
    pub const DELETED: &str = "deleted_messages";
    /// Original state of locally changed messages waiting to be sent.
    pub const UPDATED: &str = "updated_messages";
}

/// Local folder kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailboxType {
    /// The inbox.
    Inbox,
    /// Any other mail folder.
    Mail,
    /// A folder that only holds other folders.
    Parent,
    /// Drafts.
    Drafts,
    /// Outbox.
    Outbox,
    /// Sent items.
    Sent,
    /// Deleted items.
    Trash,
    /// Junk.
    Junk,
    /// Calendar.
    Calendar,
    /// Contacts.
    Contacts,
    /// Tasks.
    Tasks,
    /// The account's own mailbox, which outlives hierarchy resets.
    AccountMailbox,
    /// A user folder whose content type is not known yet.
    Unknown,
}

impl MailboxType {
    const NOT_EMAIL: i64 = 0x40;

    /// Stored representation.
    pub fn as_db_value(self) -> i64 {
        match self {
            MailboxType::Inbox => 0,
            MailboxType::Mail => 1,
            MailboxType::Parent => 2,
            MailboxType::Drafts => 3,
            MailboxType::Outbox => 4,
            MailboxType::Sent => 5,
            MailboxType::Trash => 6,
            MailboxType::Junk => 7,
            MailboxType::Calendar => 0x41,
            MailboxType::Contacts => 0x42,
            MailboxType::Tasks => 0x43,
            MailboxType::AccountMailbox => 0x44,
            MailboxType::Unknown => 0x45,
        }
    }

    /// Parses the stored representation.
    pub fn from_db_value(value: i64) -> Self {
        match value {
            0 => MailboxType::Inbox,
            1 => MailboxType::Mail,
            2 => MailboxType::Parent,
            3 => MailboxType::Drafts,
            4 => MailboxType::Outbox,
            5 => MailboxType::Sent,
            6 => MailboxType::Trash,
            7 => MailboxType::Junk,
            0x41 => MailboxType::Calendar,
            0x42 => MailboxType::Contacts,
            0x43 => MailboxType::Tasks,
            0x44 => MailboxType::AccountMailbox,
            _ => MailboxType::Unknown,
        }
    }

    /// Returns true for folders that hold mail.
    pub fn is_email(self) -> bool {
        self.as_db_value() < Self::NOT_EMAIL
    }
}

/// Element layout of a sync command.
#[derive(Debug)]
pub struct Grammar {
    /// Command name passed to the transport.
    pub command: &'static str,
    /// Elements opened around the request body, outermost first.
    pub request_path: &'static [TagToken],
    /// Class element, sent before protocol 12.1.
    pub class: Option<TagToken>,
    /// Collection id element.
    pub collection_id: Option<TagToken>,
    /// Root element of the response.
    pub root: TagToken,
    /// Containers walked through as if they were not there.
    pub nesting: &'static [TagToken],
    /// Status element.
    pub status: TagToken,
    /// Sync key element, in both directions.
    pub sync_key: TagToken,
    /// MoreAvailable element.
    pub more_available: Option<TagToken>,
    /// Container of server changes.
    pub commands: TagToken,
    /// Container of responses to local changes.
    pub responses: Option<TagToken>,
    /// Added item.
    pub add: TagToken,
    /// Changed item.
    pub change: TagToken,
    /// Deleted item.
    pub delete: TagToken,
    /// Item that left the sync window.
    pub soft_delete: Option<TagToken>,
}

/// What a variant can see while a pass runs.
pub struct SyncContext<'a> {
    /// Engine configuration.
    pub config: &'a SyncConfig,
    /// Session handle.
    pub session: &'a Session,
    /// Read access to local state.
    pub reader: &'a dyn RecordReader,
    /// Store scope of the account.
    pub scope: &'a str,
    /// The pass started from the `"0"` key.
    pub initial_sync: bool,
}

impl SyncContext<'_> {
    /// Looks up rows of `table` by column equality.
    pub fn find(
        &self,
        table: &str,
        selector: &easync_store::Selector,
    ) -> SyncResult<Vec<Row>> {
        Ok(self.reader.find(self.scope, table, selector)?)
    }
}

/// A kind of collection the engine can sync.
///
/// Parse hooks are called with the decoder positioned on the element they
/// handle: the hook walks it with `Scope::Tag(<that element>)` until the
/// matching end. Nothing is written while parsing; mutations are produced
/// by [`CollectionVariant::commit`] once the whole response is read.
pub trait CollectionVariant: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Element layout.
    fn grammar(&self) -> &'static Grammar;

    /// Class sent to old servers.
    fn class(&self) -> Option<&'static str> {
        None
    }

    /// Server id of the collection, if the command names one.
    fn collection_id(&self) -> Option<String> {
        None
    }

    /// Interprets a status element.
    fn interpret_status(&self, status: u16) -> StatusOutcome {
        status::interpret(status)
    }

    /// Clears anything left from a previous pass.
    fn begin_pass(&mut self) {}

    /// Writes collection options after the collection id.
    fn build_outgoing_options(
        &mut self,
        _enc: &mut Encoder,
        _state: &CollectionSyncState,
        _ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        Ok(())
    }

    /// Writes local changes. Not called on an initial sync, nor right after
    /// an upsync conflict.
    fn send_local_changes(
        &mut self,
        _enc: &mut Encoder,
        _state: &CollectionSyncState,
        _ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        Ok(())
    }

    /// Parses an added item.
    fn parse_add(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()>;

    /// Parses a changed item.
    fn parse_change(&mut self, dec: &mut Decoder<'_>, ctx: &SyncContext<'_>) -> SyncResult<()>;

    /// Parses a deleted item. `tag` tells a delete from a soft delete.
    fn parse_delete(
        &mut self,
        dec: &mut Decoder<'_>,
        tag: TagToken,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()>;

    /// Parses the responses to local changes.
    fn parse_responses(&mut self, dec: &mut Decoder<'_>, _ctx: &SyncContext<'_>) -> SyncResult<()> {
        dec.skip_tag()?;
        Ok(())
    }

    /// Adds the mutations for everything parsed in this pass.
    fn commit(&mut self, batch: &mut Batch, ctx: &SyncContext<'_>) -> SyncResult<()>;

    /// Adds the mutations that drop all local content of the collection.
    fn wipe(&mut self, batch: &mut Batch, ctx: &SyncContext<'_>) -> SyncResult<()>;

    /// Adds the mutation persisting `state`.
    fn persist_state(&self, batch: &mut Batch, state: &CollectionSyncState, ctx: &SyncContext<'_>);

    /// Builds follow-up mutations that need the row ids of the commit.
    fn after_commit(
        &mut self,
        _results: &[MutationResult],
        _ctx: &SyncContext<'_>,
    ) -> SyncResult<Batch> {
        Ok(Batch::new())
    }
}
