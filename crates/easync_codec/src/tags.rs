//! Tag catalog.
//!
//! Maps `(page, code)` pairs to semantic tags. Both codec directions use
//! [`TagToken`] values; names are only resolved for logging.
//!
//! Codes below [`TAG_BASE`] are structural tokens and never name a tag.
//! The two high bits of a tag byte are flags, so a page holds at most
//! `TAG_MAX - TAG_BASE + 1` tags.

use std::fmt;

use crate::error::{CodecError, CodecResult};

/// Lowest code that names a content tag.
pub const TAG_BASE: u8 = 0x05;

/// Highest code that names a content tag.
pub const TAG_MAX: u8 = 0x3f;

/// Highest code page defined by the protocol.
pub const MAX_PAGE: u8 = 24;

const PAGE_NAMES: [&str; MAX_PAGE as usize + 1] = [
    "AirSync",
    "Contacts",
    "Email",
    "AirNotify",
    "Calendar",
    "Move",
    "GetItemEstimate",
    "FolderHierarchy",
    "MeetingResponse",
    "Tasks",
    "ResolveRecipients",
    "ValidateCert",
    "Contacts2",
    "Ping",
    "Provision",
    "Search",
    "GAL",
    "AirSyncBase",
    "Settings",
    "DocumentLibrary",
    "ItemOperations",
    "ComposeMail",
    "Email2",
    "Notes",
    "RightsManagement",
];

/// A semantic element identifier: code page plus tag code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagToken {
    page: u8,
    code: u8,
}

impl TagToken {
    /// Creates a tag token.
    ///
    /// # Panics
    ///
    /// Panics if `code` is a structural code or has flag bits set. This is
    /// only meant for the catalog constants; use [`TagToken::try_new`] for
    /// values coming off the wire.
    pub const fn new(page: u8, code: u8) -> Self {
        assert!(code >= TAG_BASE && code <= TAG_MAX, "tag code out of range");
        Self { page, code }
    }

    /// Creates a tag token, validating the code range.
    pub fn try_new(page: u8, code: u8) -> CodecResult<Self> {
        if (TAG_BASE..=TAG_MAX).contains(&code) {
            Ok(Self { page, code })
        } else {
            Err(CodecError::InvalidTag { page, code })
        }
    }

    /// Code page of this tag.
    pub const fn page(self) -> u8 {
        self.page
    }

    /// Code of this tag within its page.
    pub const fn code(self) -> u8 {
        self.code
    }

    /// Catalog name of this tag, or `"unknown"`.
    pub fn name(self) -> &'static str {
        page_tags(self.page)
            .and_then(|names| {
                names
                    .iter()
                    .find(|(code, _)| *code == self.code)
                    .map(|(_, name)| *name)
            })
            .unwrap_or("unknown")
    }
}

impl fmt::Display for TagToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match page_name(self.page) {
            Some(page) => write!(f, "{}:{}", page, self.name()),
            None => write!(f, "{}:{:#04x}", self.page, self.code),
        }
    }
}

/// Name of a code page, if the protocol defines it.
pub fn page_name(page: u8) -> Option<&'static str> {
    PAGE_NAMES.get(page as usize).copied()
}

/// Returns true if `page` is a defined code page.
pub fn is_known_page(page: u8) -> bool {
    page <= MAX_PAGE
}

fn page_tags(page: u8) -> Option<&'static [(u8, &'static str)]> {
    match page {
        sync::PAGE => Some(sync::NAMES),
        email::PAGE => Some(email::NAMES),
        gie::PAGE => Some(gie::NAMES),
        folder::PAGE => Some(folder::NAMES),
        tasks::PAGE => Some(tasks::NAMES),
        ping::PAGE => Some(ping::NAMES),
        provision::PAGE => Some(provision::NAMES),
        base::PAGE => Some(base::NAMES),
        email2::PAGE => Some(email2::NAMES),
        _ => None,
    }
}

macro_rules! code_page {
    ($(#[$doc:meta])* $module:ident = $page:literal { $($name:ident = $code:literal => $wire:literal,)* }) => {
        $(#[$doc])*
        pub mod $module {
            use super::TagToken;

            /// Code page number.
            pub const PAGE: u8 = $page;

            $(
                #[doc = concat!("`", $wire, "`")]
                pub const $name: TagToken = TagToken::new($page, $code);
            )*

            pub(super) const NAMES: &[(u8, &str)] = &[$(($code, $wire),)*];
        }
    };
}

code_page! {
    /// AirSync (page 0): the Sync command.
    sync = 0 {
        SYNC = 0x05 => "Sync",
        RESPONSES = 0x06 => "Responses",
        ADD = 0x07 => "Add",
        CHANGE = 0x08 => "Change",
        DELETE = 0x09 => "Delete",
        FETCH = 0x0a => "Fetch",
        SYNC_KEY = 0x0b => "SyncKey",
        CLIENT_ID = 0x0c => "ClientId",
        SERVER_ID = 0x0d => "ServerId",
        STATUS = 0x0e => "Status",
        COLLECTION = 0x0f => "Collection",
        CLASS = 0x10 => "Class",
        VERSION = 0x11 => "Version",
        COLLECTION_ID = 0x12 => "CollectionId",
        GET_CHANGES = 0x13 => "GetChanges",
        MORE_AVAILABLE = 0x14 => "MoreAvailable",
        WINDOW_SIZE = 0x15 => "WindowSize",
        COMMANDS = 0x16 => "Commands",
        OPTIONS = 0x17 => "Options",
        FILTER_TYPE = 0x18 => "FilterType",
        TRUNCATION = 0x19 => "Truncation",
        RTF_TRUNCATION = 0x1a => "RtfTruncation",
        CONFLICT = 0x1b => "Conflict",
        COLLECTIONS = 0x1c => "Collections",
        APPLICATION_DATA = 0x1d => "ApplicationData",
        DELETES_AS_MOVES = 0x1e => "DeletesAsMoves",
        NOTIFY_GUID = 0x1f => "NotifyGUID",
        SUPPORTED = 0x20 => "Supported",
        SOFT_DELETE = 0x21 => "SoftDelete",
        MIME_SUPPORT = 0x22 => "MIMESupport",
        MIME_TRUNCATION = 0x23 => "MIMETruncation",
        WAIT = 0x24 => "Wait",
        LIMIT = 0x25 => "Limit",
        PARTIAL = 0x26 => "Partial",
        CONVERSATION_MODE = 0x27 => "ConversationMode",
        MAX_ITEMS = 0x28 => "MaxItems",
        HEARTBEAT_INTERVAL = 0x29 => "HeartbeatInterval",
    }
}

code_page! {
    /// Email (page 2).
    email = 2 {
        ATTACHMENT = 0x05 => "Attachment",
        ATTACHMENTS = 0x06 => "Attachments",
        ATT_NAME = 0x07 => "AttName",
        ATT_SIZE = 0x08 => "AttSize",
        ATT0_ID = 0x09 => "Att0Id",
        ATT_METHOD = 0x0a => "AttMethod",
        ATT_REMOVED = 0x0b => "AttRemoved",
        BODY = 0x0c => "Body",
        BODY_SIZE = 0x0d => "BodySize",
        BODY_TRUNCATED = 0x0e => "BodyTruncated",
        DATE_RECEIVED = 0x0f => "DateReceived",
        DISPLAY_NAME = 0x10 => "DisplayName",
        DISPLAY_TO = 0x11 => "DisplayTo",
        IMPORTANCE = 0x12 => "Importance",
        MESSAGE_CLASS = 0x13 => "MessageClass",
        SUBJECT = 0x14 => "Subject",
        READ = 0x15 => "Read",
        TO = 0x16 => "To",
        CC = 0x17 => "Cc",
        FROM = 0x18 => "From",
        REPLY_TO = 0x19 => "ReplyTo",
        ALL_DAY_EVENT = 0x1a => "AllDayEvent",
        CATEGORIES = 0x1b => "Categories",
        CATEGORY = 0x1c => "Category",
        DTSTAMP = 0x1d => "DTStamp",
        END_TIME = 0x1e => "EndTime",
        INSTANCE_TYPE = 0x1f => "InstanceType",
        BUSY_STATUS = 0x20 => "BusyStatus",
        LOCATION = 0x21 => "Location",
        MEETING_REQUEST = 0x22 => "MeetingRequest",
        ORGANIZER = 0x23 => "Organizer",
        RECURRENCE_ID = 0x24 => "RecurrenceId",
        REMINDER = 0x25 => "Reminder",
        RESPONSE_REQUESTED = 0x26 => "ResponseRequested",
        RECURRENCES = 0x27 => "Recurrences",
        RECURRENCE = 0x28 => "Recurrence",
        RECURRENCE_TYPE = 0x29 => "Type",
        RECURRENCE_UNTIL = 0x2a => "Until",
        RECURRENCE_OCCURRENCES = 0x2b => "Occurrences",
        RECURRENCE_INTERVAL = 0x2c => "Interval",
        RECURRENCE_DAY_OF_WEEK = 0x2d => "DayOfWeek",
        RECURRENCE_DAY_OF_MONTH = 0x2e => "DayOfMonth",
        RECURRENCE_WEEK_OF_MONTH = 0x2f => "WeekOfMonth",
        RECURRENCE_MONTH_OF_YEAR = 0x30 => "MonthOfYear",
        START_TIME = 0x31 => "StartTime",
        SENSITIVITY = 0x32 => "Sensitivity",
        TIME_ZONE = 0x33 => "TimeZone",
        GLOBAL_OBJ_ID = 0x34 => "GlobalObjId",
        THREAD_TOPIC = 0x35 => "ThreadTopic",
        MIME_DATA = 0x36 => "MIMEData",
        MIME_TRUNCATED = 0x37 => "MIMETruncated",
        MIME_SIZE = 0x38 => "MIMESize",
        INTERNET_CPID = 0x39 => "InternetCPID",
        FLAG = 0x3a => "Flag",
        FLAG_STATUS = 0x3b => "FlagStatus",
        CONTENT_CLASS = 0x3c => "ContentClass",
        FLAG_TYPE = 0x3d => "FlagType",
        COMPLETE_TIME = 0x3e => "CompleteTime",
        DISALLOW_NEW_TIME_PROPOSAL = 0x3f => "DisallowNewTimeProposal",
    }
}

code_page! {
    /// GetItemEstimate (page 6).
    gie = 6 {
        GET_ITEM_ESTIMATE = 0x05 => "GetItemEstimate",
        VERSION = 0x06 => "Version",
        COLLECTIONS = 0x07 => "Collections",
        COLLECTION = 0x08 => "Collection",
        CLASS = 0x09 => "Class",
        COLLECTION_ID = 0x0a => "CollectionId",
        DATE_TIME = 0x0b => "DateTime",
        ESTIMATE = 0x0c => "Estimate",
        RESPONSE = 0x0d => "Response",
        STATUS = 0x0e => "Status",
    }
}

code_page! {
    /// FolderHierarchy (page 7): the FolderSync command.
    folder = 7 {
        FOLDERS = 0x05 => "Folders",
        FOLDER = 0x06 => "Folder",
        DISPLAY_NAME = 0x07 => "DisplayName",
        SERVER_ID = 0x08 => "ServerId",
        PARENT_ID = 0x09 => "ParentId",
        TYPE = 0x0a => "Type",
        RESPONSE = 0x0b => "Response",
        STATUS = 0x0c => "Status",
        CONTENT_CLASS = 0x0d => "ContentClass",
        CHANGES = 0x0e => "Changes",
        ADD = 0x0f => "Add",
        DELETE = 0x10 => "Delete",
        UPDATE = 0x11 => "Update",
        SYNC_KEY = 0x12 => "SyncKey",
        FOLDER_CREATE = 0x13 => "FolderCreate",
        FOLDER_DELETE = 0x14 => "FolderDelete",
        FOLDER_UPDATE = 0x15 => "FolderUpdate",
        FOLDER_SYNC = 0x16 => "FolderSync",
        COUNT = 0x17 => "Count",
        VERSION = 0x18 => "Version",
    }
}

code_page! {
    /// Tasks (page 9). Mail flags reuse the task date tags.
    tasks = 9 {
        BODY = 0x05 => "Body",
        BODY_SIZE = 0x06 => "BodySize",
        BODY_TRUNCATED = 0x07 => "BodyTruncated",
        CATEGORIES = 0x08 => "Categories",
        CATEGORY = 0x09 => "Category",
        COMPLETE = 0x0a => "Complete",
        DATE_COMPLETED = 0x0b => "DateCompleted",
        DUE_DATE = 0x0c => "DueDate",
        UTC_DUE_DATE = 0x0d => "UtcDueDate",
        IMPORTANCE = 0x0e => "Importance",
        REMINDER_SET = 0x1b => "ReminderSet",
        REMINDER_TIME = 0x1c => "ReminderTime",
        SENSITIVITY = 0x1d => "Sensitivity",
        START_DATE = 0x1e => "StartDate",
        UTC_START_DATE = 0x1f => "UtcStartDate",
        SUBJECT = 0x20 => "Subject",
    }
}

code_page! {
    /// Ping (page 13).
    ping = 13 {
        PING = 0x05 => "Ping",
        AUTD_STATE = 0x06 => "AutdState",
        STATUS = 0x07 => "Status",
        HEARTBEAT_INTERVAL = 0x08 => "HeartbeatInterval",
        FOLDERS = 0x09 => "Folders",
        FOLDER = 0x0a => "Folder",
        ID = 0x0b => "Id",
        CLASS = 0x0c => "Class",
        MAX_FOLDERS = 0x0d => "MaxFolders",
    }
}

code_page! {
    /// Provision (page 14). Only the envelope tags; policy bodies are skipped.
    provision = 14 {
        PROVISION = 0x05 => "Provision",
        POLICIES = 0x06 => "Policies",
        POLICY = 0x07 => "Policy",
        POLICY_TYPE = 0x08 => "PolicyType",
        POLICY_KEY = 0x09 => "PolicyKey",
        DATA = 0x0a => "Data",
        STATUS = 0x0b => "Status",
        REMOTE_WIPE = 0x0c => "RemoteWipe",
        EAS_PROVISION_DOC = 0x0d => "EASProvisionDoc",
    }
}

code_page! {
    /// AirSyncBase (page 17): body preferences and attachments for EAS 12+.
    base = 17 {
        BODY_PREFERENCE = 0x05 => "BodyPreference",
        TYPE = 0x06 => "Type",
        TRUNCATION_SIZE = 0x07 => "TruncationSize",
        ALL_OR_NONE = 0x08 => "AllOrNone",
        BODY = 0x0a => "Body",
        DATA = 0x0b => "Data",
        ESTIMATED_DATA_SIZE = 0x0c => "EstimatedDataSize",
        TRUNCATED = 0x0d => "Truncated",
        ATTACHMENTS = 0x0e => "Attachments",
        ATTACHMENT = 0x0f => "Attachment",
        DISPLAY_NAME = 0x10 => "DisplayName",
        FILE_REFERENCE = 0x11 => "FileReference",
        METHOD = 0x12 => "Method",
        CONTENT_ID = 0x13 => "ContentId",
        CONTENT_LOCATION = 0x14 => "ContentLocation",
        IS_INLINE = 0x15 => "IsInline",
        NATIVE_BODY_TYPE = 0x16 => "NativeBodyType",
        CONTENT_TYPE = 0x17 => "ContentType",
        PREVIEW = 0x18 => "Preview",
        BODY_PART_PREFERENCE = 0x19 => "BodyPartPreference",
        BODY_PART = 0x1a => "BodyPart",
        STATUS = 0x1b => "Status",
    }
}

code_page! {
    /// Email2 (page 22).
    email2 = 22 {
        UM_CALLER_ID = 0x05 => "UmCallerID",
        UM_USER_NOTES = 0x06 => "UmUserNotes",
        UM_ATT_DURATION = 0x07 => "UmAttDuration",
        UM_ATT_ORDER = 0x08 => "UmAttOrder",
        CONVERSATION_ID = 0x09 => "ConversationId",
        CONVERSATION_INDEX = 0x0a => "ConversationIndex",
        LAST_VERB_EXECUTED = 0x0b => "LastVerbExecuted",
        LAST_VERB_EXECUTION_TIME = 0x0c => "LastVerbExecutionTime",
        RECEIVED_AS_BCC = 0x0d => "ReceivedAsBcc",
        SENDER = 0x0e => "Sender",
        CALENDAR_TYPE = 0x0f => "CalendarType",
        IS_LEAP_MONTH = 0x10 => "IsLeapMonth",
        ACCOUNT_ID = 0x11 => "AccountId",
        FIRST_DAY_OF_WEEK = 0x12 => "FirstDayOfWeek",
        MEETING_MESSAGE_TYPE = 0x13 => "MeetingMessageType",
    }
}
