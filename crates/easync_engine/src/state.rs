//! Sync cursor state and the per-pass state machine.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use easync_codec::{Decoder, Encoder, Scope, TagToken, Token};
use easync_store::{BatchStore, RecordReader};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchExecutor};
use crate::collection::{CollectionVariant, Grammar, SyncContext};
use crate::config::{ExecutorConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::session::Session;
use crate::status::StatusOutcome;
use crate::transport::Transport;

/// Server-issued collection cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncKey(String);

impl SyncKey {
    /// Sentinel key of a collection that has never synced.
    pub const INITIAL: &'static str = "0";

    /// Creates a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The `"0"` key.
    pub fn initial() -> Self {
        Self::new(Self::INITIAL)
    }

    /// Returns true for the `"0"` key.
    pub fn is_initial(&self) -> bool {
        self.0 == Self::INITIAL
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SyncKey {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SyncKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// How a collection is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncInterval {
    /// Manual sync only.
    #[default]
    Never,
    /// Sync continuously until the first key arrives, then ping.
    Push,
    /// Triggered by the server's ping notifications.
    Ping,
    /// Periodic, every n minutes.
    Minutes(u32),
}

impl SyncInterval {
    /// Stored representation.
    pub fn as_db_value(self) -> i64 {
        match self {
            SyncInterval::Never => -1,
            SyncInterval::Push => -2,
            SyncInterval::Ping => -3,
            SyncInterval::Minutes(n) => i64::from(n),
        }
    }

    /// Parses the stored representation. Unknown negative values are `Never`.
    pub fn from_db_value(value: i64) -> Self {
        match value {
            -2 => SyncInterval::Push,
            -3 => SyncInterval::Ping,
            n if n > 0 => SyncInterval::Minutes(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => SyncInterval::Never,
        }
    }

    /// Returns true for a positive periodic interval.
    pub fn is_periodic(self) -> bool {
        matches!(self, SyncInterval::Minutes(n) if n > 0)
    }
}

/// How far back mail is synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Lookback {
    /// Not configured; the server default window is used.
    #[default]
    Unknown,
    /// Chosen by the client.
    Auto,
    /// One day.
    OneDay,
    /// Three days.
    ThreeDays,
    /// One week.
    OneWeek,
    /// Two weeks.
    TwoWeeks,
    /// One month.
    OneMonth,
    /// Everything.
    All,
}

impl Lookback {
    /// FilterType value sent to the server.
    pub fn filter_type(self) -> &'static str {
        match self {
            Lookback::OneDay => "1",
            Lookback::Auto | Lookback::ThreeDays => "2",
            Lookback::Unknown | Lookback::OneWeek => "3",
            Lookback::TwoWeeks => "4",
            Lookback::OneMonth => "5",
            Lookback::All => "0",
        }
    }

    /// Stored representation.
    pub fn as_db_value(self) -> i64 {
        match self {
            Lookback::Unknown => 0,
            Lookback::Auto => -1,
            Lookback::OneDay => 1,
            Lookback::ThreeDays => 2,
            Lookback::OneWeek => 3,
            Lookback::TwoWeeks => 4,
            Lookback::OneMonth => 5,
            Lookback::All => 6,
        }
    }

    /// Parses the stored representation.
    pub fn from_db_value(value: i64) -> Self {
        match value {
            -1 => Lookback::Auto,
            1 => Lookback::OneDay,
            2 => Lookback::ThreeDays,
            3 => Lookback::OneWeek,
            4 => Lookback::TwoWeeks,
            5 => Lookback::OneMonth,
            6 => Lookback::All,
            _ => Lookback::Unknown,
        }
    }
}

/// Persisted per-collection cursor state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionSyncState {
    /// Current sync key.
    pub sync_key: SyncKey,
    /// Scheduling.
    pub sync_interval: SyncInterval,
    /// Lookback window.
    pub lookback: Lookback,
    /// The last pass detected a loop. Recomputed every pass.
    #[serde(default)]
    pub looping: bool,
}

impl CollectionSyncState {
    /// State of a collection that has never synced.
    pub fn new(sync_interval: SyncInterval, lookback: Lookback) -> Self {
        Self {
            sync_key: SyncKey::initial(),
            sync_interval,
            lookback,
            looping: false,
        }
    }

    /// Sets the sync key.
    pub fn with_sync_key(mut self, key: impl Into<String>) -> Self {
        self.sync_key = SyncKey::new(key);
        self
    }
}

/// Pass lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    /// No pass running.
    #[default]
    Idle,
    /// The request body is encoded.
    RequestBuilt,
    /// Waiting on the transport.
    AwaitingResponse,
    /// Decoding the response.
    Parsing,
    /// Changes and state committed.
    Committed,
    /// The pass failed or was stopped.
    Aborted,
}

impl PassState {
    /// Returns true if `next` may follow this state.
    pub fn can_transition_to(self, next: PassState) -> bool {
        use PassState::*;
        matches!(
            (self, next),
            (Idle | Committed | Aborted, Idle)
                | (Idle, RequestBuilt)
                | (RequestBuilt, AwaitingResponse)
                | (AwaitingResponse, Parsing)
                | (Parsing, Committed)
                | (Idle | RequestBuilt | AwaitingResponse | Parsing, Aborted)
        )
    }
}

/// What one pass found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassOutcome {
    /// The server sent MoreAvailable.
    pub more_available: bool,
    /// The pass started from the `"0"` key and received a key.
    pub initial_sync: bool,
    /// More was promised without a new key.
    pub looping: bool,
    /// The collection was reset to `"0"` and wiped.
    pub reset: bool,
    /// The server rejected local changes.
    pub upsync_conflict: bool,
    /// Another pass should run straight away.
    pub another_pass: bool,
    /// The collection was switched to ping because changes arrived.
    pub restart_as_ping: bool,
    /// The session was stopped before the commit.
    pub stopped: bool,
    /// Records committed.
    pub committed: usize,
}

/// Result of [`SyncEngine::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSummary {
    /// Passes run.
    pub passes: u32,
    /// Records committed across passes.
    pub committed: usize,
    /// Collection resets seen.
    pub resets: u32,
    /// The loop guard ended the cycle.
    pub loop_limit_reached: bool,
    /// The session was stopped.
    pub stopped: bool,
    /// Outcome of the last pass.
    pub last: PassOutcome,
}

/// Fields gathered while walking a response.
#[derive(Debug, Default)]
struct Parsed {
    status: Option<u16>,
    outcome: Option<StatusOutcome>,
    sync_key: Option<String>,
    more_available: bool,
}

/// Applies a parsed sync key to `next`. Returns true if the key changed.
fn take_key(
    collection: &str,
    key: Option<&str>,
    initial: bool,
    next: &mut CollectionSyncState,
    outcome: &mut PassOutcome,
) -> bool {
    let Some(key) = key else {
        return false;
    };
    outcome.initial_sync = initial;
    let changed = key != next.sync_key.as_str();
    if changed {
        info!(collection, from = %next.sync_key, to = %key, "sync key advanced");
        next.sync_key = SyncKey::new(key);
    }
    if next.sync_interval == SyncInterval::Push {
        next.sync_interval = SyncInterval::Ping;
    }
    changed
}

/// Drives sync passes for one account.
pub struct SyncEngine {
    config: SyncConfig,
    executor_config: ExecutorConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn BatchStore>,
    reader: Arc<dyn RecordReader>,
    session: Session,
    scope: String,
    state: RwLock<PassState>,
}

impl SyncEngine {
    /// Creates an engine writing into `scope` of `store`.
    pub fn new<S>(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        store: Arc<S>,
        session: Session,
        scope: impl Into<String>,
    ) -> Self
    where
        S: BatchStore + RecordReader + 'static,
    {
        Self {
            config,
            executor_config: ExecutorConfig::default(),
            transport,
            store: store.clone(),
            reader: store,
            session,
            scope: scope.into(),
            state: RwLock::new(PassState::Idle),
        }
    }

    /// Sets the executor configuration.
    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Current pass state.
    pub fn state(&self) -> PassState {
        *self.state.read()
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Session handle.
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn transition(&self, next: PassState) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            return Err(SyncError::InvalidState {
                from: format!("{:?}", *state),
                to: format!("{:?}", next),
            });
        }
        *state = next;
        Ok(())
    }

    fn abort(&self) {
        *self.state.write() = PassState::Aborted;
    }

    fn context(&self, initial_sync: bool) -> SyncContext<'_> {
        SyncContext {
            config: &self.config,
            session: &self.session,
            reader: self.reader.as_ref(),
            scope: &self.scope,
            initial_sync,
        }
    }

    /// Runs one pass for `variant`.
    ///
    /// `state` is replaced only after the pass committed. A failed or stopped
    /// pass leaves it untouched.
    pub fn run_pass(
        &self,
        variant: &mut dyn CollectionVariant,
        state: &mut CollectionSyncState,
    ) -> SyncResult<PassOutcome> {
        self.transition(PassState::Idle)?;
        variant.begin_pass();
        let result = self.pass(variant, state);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn pass(
        &self,
        variant: &mut dyn CollectionVariant,
        state: &mut CollectionSyncState,
    ) -> SyncResult<PassOutcome> {
        let initial = state.sync_key.is_initial();
        let ctx = self.context(initial);
        let grammar = variant.grammar();

        let body = self.build_request(variant, grammar, state, &ctx)?;
        self.transition(PassState::RequestBuilt)?;
        debug!(collection = variant.name(), sync_key = %state.sync_key, bytes = body.len(), "request built");

        self.transition(PassState::AwaitingResponse)?;
        let response = self
            .transport
            .send(grammar.command, body, self.config.timeout_for(initial))?;
        response.check_status()?;
        self.transition(PassState::Parsing)?;

        let mut next = state.clone();
        let mut outcome = PassOutcome::default();
        let mut batch = Batch::new();

        if response.is_empty() {
            debug!(collection = variant.name(), "empty response, no changes");
            if next.sync_interval == SyncInterval::Push {
                next.sync_interval = SyncInterval::Ping;
            }
            next.looping = false;
            if next != *state {
                variant.persist_state(&mut batch, &next, &ctx);
            }
            return self.commit(variant, state, next, batch, outcome, &ctx);
        }

        let parsed = self.parse(variant, grammar, &response.body, &ctx)?;
        let status = parsed.status.unwrap_or(crate::status::code::SUCCESS);
        let reported = parsed.outcome.unwrap_or(StatusOutcome::Success);
        outcome.more_available = parsed.more_available;

        let key = parsed.sync_key.as_deref();
        let mut new_key = false;
        match reported {
            StatusOutcome::Success => {
                new_key = take_key(variant.name(), key, initial, &mut next, &mut outcome);
                variant.commit(&mut batch, &ctx)?;
            }
            StatusOutcome::ResetCollection => {
                warn!(collection = variant.name(), status, "bad sync key, resetting collection");
                next.sync_key = SyncKey::initial();
                next.sync_interval = SyncInterval::Push;
                outcome.reset = true;
                variant.wipe(&mut batch, &ctx)?;
            }
            StatusOutcome::UpsyncConflict => {
                warn!(collection = variant.name(), status, "local changes rejected");
                self.session.set_upsync_failed(true);
                outcome.upsync_conflict = true;
                new_key = take_key(variant.name(), key, initial, &mut next, &mut outcome);
                variant.commit(&mut batch, &ctx)?;
            }
            other => {
                if other == StatusOutcome::NeedsFolderRefresh {
                    self.session.request_folder_refresh();
                }
                warn!(collection = variant.name(), status, outcome = ?other, "pass aborted by status");
                return Err(other
                    .into_error(status)
                    .unwrap_or(SyncError::Fatal { status }));
            }
        }

        let more = outcome.more_available
            || outcome.initial_sync
            || outcome.reset
            || outcome.upsync_conflict;
        outcome.looping = more && !new_key;
        outcome.another_pass = more && !outcome.looping;
        next.looping = outcome.looping;
        if outcome.looping {
            warn!(collection = variant.name(), sync_key = %next.sync_key, "more available without a new key");
        }

        if next.sync_interval == state.sync_interval
            && self.session.change_count() > 0
            && self.config.account_push
            && next.sync_interval.is_periodic()
        {
            info!(collection = variant.name(), "changes found, switching to ping");
            next.sync_interval = SyncInterval::Ping;
            outcome.restart_as_ping = true;
        }

        batch.separator();
        variant.persist_state(&mut batch, &next, &ctx);
        self.commit(variant, state, next, batch, outcome, &ctx)
    }

    fn commit(
        &self,
        variant: &mut dyn CollectionVariant,
        state: &mut CollectionSyncState,
        next: CollectionSyncState,
        batch: Batch,
        mut outcome: PassOutcome,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<PassOutcome> {
        let executor = BatchExecutor::new(self.store.clone(), self.session.clone(), &self.scope)
            .with_config(self.executor_config);

        let results = executor.execute(batch)?;
        if self.session.is_stopped() {
            debug!(collection = variant.name(), "session stopped, state not updated");
            self.abort();
            outcome.stopped = true;
            outcome.another_pass = false;
            return Ok(outcome);
        }
        outcome.committed = results.len();

        let followup = variant.after_commit(&results, ctx)?;
        outcome.committed += executor.execute(followup)?.len();

        *state = next;
        self.transition(PassState::Committed)?;
        debug!(collection = variant.name(), sync_key = %state.sync_key, committed = outcome.committed, "pass committed");
        Ok(outcome)
    }

    fn build_request(
        &self,
        variant: &mut dyn CollectionVariant,
        grammar: &Grammar,
        state: &CollectionSyncState,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<Bytes> {
        let mut enc = Encoder::new();
        for tag in grammar.request_path {
            enc.start(*tag)?;
        }
        if let (Some(class), Some(tag)) = (variant.class(), grammar.class) {
            if !self.config.supports(crate::config::PROTOCOL_12_1) {
                enc.data(tag, class)?;
            }
        }
        enc.data(grammar.sync_key, state.sync_key.as_str())?;
        if let (Some(id), Some(tag)) = (variant.collection_id(), grammar.collection_id) {
            enc.data(tag, &id)?;
        }
        variant.build_outgoing_options(&mut enc, state, ctx)?;

        if !ctx.initial_sync {
            if self.session.upsync_failed() {
                debug!(collection = variant.name(), "skipping upsync after conflict");
                self.session.set_upsync_failed(false);
            } else {
                variant.send_local_changes(&mut enc, state, ctx)?;
            }
        }
        for _ in grammar.request_path {
            enc.end()?;
        }
        Ok(enc.finish()?)
    }

    fn parse(
        &self,
        variant: &mut dyn CollectionVariant,
        grammar: &Grammar,
        body: &[u8],
        ctx: &SyncContext<'_>,
    ) -> SyncResult<Parsed> {
        let mut dec = Decoder::new(body)?;
        match dec.next_tag(Scope::Document)? {
            Token::Tag(tag) if tag == grammar.root => {}
            Token::Tag(tag) => {
                return Err(easync_codec::CodecError::invalid_structure(format!(
                    "expected {} at top level, found {}",
                    grammar.root, tag
                ))
                .into())
            }
            _ => {
                return Err(easync_codec::CodecError::invalid_structure(format!(
                    "expected {} at top level",
                    grammar.root
                ))
                .into())
            }
        }

        let mut parsed = Parsed::default();
        self.walk(variant, grammar, &mut dec, grammar.root, &mut parsed, ctx)?;
        Ok(parsed)
    }

    fn walk(
        &self,
        variant: &mut dyn CollectionVariant,
        grammar: &Grammar,
        dec: &mut Decoder<'_>,
        scope: TagToken,
        parsed: &mut Parsed,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        while let Token::Tag(tag) = dec.next_tag(Scope::Tag(scope))? {
            if grammar.nesting.contains(&tag) {
                self.walk(variant, grammar, dec, tag, parsed, ctx)?;
            } else if tag == grammar.status {
                let status = u16::try_from(dec.value_int()?).unwrap_or(u16::MAX);
                let outcome = variant.interpret_status(status);
                if !outcome.is_success() {
                    warn!(collection = variant.name(), status, "sync status");
                }
                // The first failure wins over a later success.
                if parsed.outcome.map_or(true, StatusOutcome::is_success) {
                    parsed.status = Some(status);
                    parsed.outcome = Some(outcome);
                }
            } else if tag == grammar.sync_key {
                let key = dec.value()?;
                debug!(collection = variant.name(), sync_key = %key, "parsed key");
                parsed.sync_key = Some(key);
            } else if Some(tag) == grammar.more_available {
                dec.skip_tag()?;
                parsed.more_available = true;
            } else if tag == grammar.commands {
                self.commands(variant, grammar, dec, ctx)?;
            } else if Some(tag) == grammar.responses {
                variant.parse_responses(dec, ctx)?;
            } else {
                dec.skip_tag()?;
            }
        }
        Ok(())
    }

    fn commands(
        &self,
        variant: &mut dyn CollectionVariant,
        grammar: &Grammar,
        dec: &mut Decoder<'_>,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<()> {
        let scope = Scope::Tag(grammar.commands);
        while let Token::Tag(tag) = dec.next_tag(scope)? {
            if tag == grammar.add {
                variant.parse_add(dec, ctx)?;
            } else if tag == grammar.change {
                variant.parse_change(dec, ctx)?;
            } else if tag == grammar.delete || Some(tag) == grammar.soft_delete {
                variant.parse_delete(dec, tag, ctx)?;
            } else {
                dec.skip_tag()?;
            }
        }
        Ok(())
    }

    /// Runs passes until nothing more is pending.
    ///
    /// A pass is repeated when it asks for another pass or reset the
    /// collection. The cycle ends early when the session stops, and after
    /// `max_looping_passes` consecutive passes that kept asking for more.
    /// The session's change counter is cleared when the cycle starts.
    pub fn sync(
        &self,
        variant: &mut dyn CollectionVariant,
        state: &mut CollectionSyncState,
    ) -> SyncResult<SyncSummary> {
        self.session.reset_changes();
        let mut summary = SyncSummary::default();
        let mut repeats = 0u32;
        loop {
            if self.session.is_stopped() {
                summary.stopped = true;
                return Ok(summary);
            }
            let outcome = self.run_pass(variant, state)?;
            summary.passes += 1;
            summary.committed += outcome.committed;
            summary.last = outcome;
            if outcome.reset {
                summary.resets += 1;
            }
            if outcome.stopped {
                summary.stopped = true;
                return Ok(summary);
            }
            if !(outcome.another_pass || outcome.reset) {
                return Ok(summary);
            }
            repeats += 1;
            if repeats >= self.config.max_looping_passes {
                warn!(collection = variant.name(), passes = summary.passes, "too many passes, stopping");
                summary.loop_limit_reached = true;
                return Ok(summary);
            }
        }
    }
}
