//! Selection and editing state for one interactive browsing session.
//!
//! [`BrowserSession`] owns every piece of mutable state (selected table,
//! page, schema, rows, drafts) in a [`SessionState`]. The components it
//! drives receive plain values and hand back new ones, so the state only
//! changes here and only after a request has succeeded.

use thiserror::Error;

use crate::audit_trail::{AuditOperation, AuditOutcome, AuditRecord, AuditSink};
use crate::catalog::{
    BackendMode, CatalogBackend, CatalogError, ColumnDescriptor, SchemaCatalog, TableDescriptor,
    TableSchema,
};
use crate::error::ApiError;
use crate::mutation::{EditDraft, MutationBackend, MutationCoordinator, MutationError};
use crate::pagination::{clamp_page, FetchError, PageBackend, PageFetcher, PageWindow};
use crate::query_runner::{QueryBackend, QueryResult, QueryRunner, QueryRunnerError};
use crate::row_identity::{resolve_primary_key, IdentityError, PrimaryKey};
use crate::value::Row;

/// Everything a session needs from the backend.
pub trait BrowserBackend:
    CatalogBackend + PageBackend + MutationBackend + QueryBackend + Clone
{
}

impl<T> BrowserBackend for T where
    T: CatalogBackend + PageBackend + MutationBackend + QueryBackend + Clone
{
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    NoTableSelected,
    SchemaLoading,
    DataLoading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// The last thing the operator should be told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// An open update: the row as it was when editing began plus the draft.
#[derive(Debug, Clone, PartialEq)]
pub struct EditFlow {
    pub row: Row,
    pub draft: EditDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteToken(String);

impl DeleteToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelete {
    pub token: DeleteToken,
    pub table: String,
    pub key: PrimaryKey,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub mode: BackendMode,
    pub tables: Vec<TableDescriptor>,
    pub selected_table: Option<String>,
    pub page: u32,
    pub schema: Option<TableSchema>,
    pub window: Option<PageWindow>,
    pub insert_draft: Option<EditDraft>,
    pub edit: Option<EditFlow>,
    pub pending_delete: Option<PendingDelete>,
    pub query_result: Option<QueryResult>,
    pub notice: Option<Notice>,
}

impl SessionState {
    /// Schema of the selected table. A schema retained from a previously
    /// selected table is never returned.
    #[must_use]
    pub fn current_schema(&self) -> Option<&TableSchema> {
        let table = self.selected_table.as_deref()?;
        self.schema.as_ref().filter(|schema| schema.is_for(table))
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.window.as_ref().and_then(|window| window.row(index))
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.window.as_ref().map_or(0, |window| window.rows.len())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("select a table first")]
    NoTableSelected,
    #[error("backend is in read-only mode")]
    ReadOnly,
    #[error("row {index} is not on the current page ({len} rows loaded)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("no insert is in progress")]
    NoInsertInProgress,
    #[error("no edit is in progress")]
    NoEditInProgress,
    #[error("no delete is awaiting confirmation")]
    NoPendingDelete,
    #[error("confirmation token is invalid or expired")]
    InvalidConfirmation,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Query(#[from] QueryRunnerError),
}

impl SessionError {
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Catalog(error) => Some(error.api_error()),
            Self::Fetch(error) => error.api_error(),
            Self::Mutation(error) => error.api_error(),
            Self::Query(error) => Some(error.api_error()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_no_primary_key(&self) -> bool {
        matches!(
            self,
            Self::Identity(IdentityError::NoPrimaryKey)
                | Self::Mutation(MutationError::Identity(IdentityError::NoPrimaryKey))
        )
    }

    /// Backend-reported messages are shown verbatim; everything else uses
    /// the error's own description.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.api_error() {
            Some(api_error) => api_error.user_message(),
            None => self.to_string(),
        }
    }
}

pub struct BrowserSession<B: BrowserBackend> {
    catalog: SchemaCatalog<B>,
    fetcher: PageFetcher<B>,
    mutations: MutationCoordinator<B>,
    queries: QueryRunner<B>,
    audit: Option<Box<dyn AuditSink>>,
    state: SessionState,
    delete_nonce: u64,
}

impl<B: BrowserBackend> BrowserSession<B> {
    #[must_use]
    pub fn new(backend: B, page_limit: u32) -> Self {
        Self {
            catalog: SchemaCatalog::new(backend.clone()),
            fetcher: PageFetcher::new(backend.clone(), page_limit),
            mutations: MutationCoordinator::new(backend.clone()),
            queries: QueryRunner::new(backend),
            audit: None,
            state: SessionState {
                page: 1,
                ..SessionState::default()
            },
            delete_nonce: 0,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn page_limit(&self) -> u32 {
        self.fetcher.limit()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.state.notice.take()
    }

    /// Reads the backend mode and the table list. A failed mode probe is
    /// treated as writable; the backend still refuses writes on its own.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        match self.catalog.backend_mode().await {
            Ok(mode) => {
                log::info!("backend mode: readonly={}", mode.readonly);
                self.state.mode = mode;
            }
            Err(error) => log::warn!("{error}; assuming a writable backend"),
        }
        self.refresh_tables().await
    }

    pub async fn refresh_tables(&mut self) -> Result<(), SessionError> {
        match self.catalog.list_tables().await {
            Ok(tables) => {
                self.state.tables = tables;
                Ok(())
            }
            Err(error) => Err(self.fail(error.into())),
        }
    }

    /// Always restarts at schema loading, even for the table already shown.
    pub async fn select_table(&mut self, table: &str) -> Result<(), SessionError> {
        log::info!("selecting table `{table}`");
        self.state.selected_table = Some(table.to_string());
        self.state.page = 1;
        self.state.window = None;
        self.state.insert_draft = None;
        self.state.edit = None;
        self.state.pending_delete = None;
        self.state.phase = SessionPhase::SchemaLoading;

        match self.catalog.load_schema(table).await {
            Ok(schema) => self.state.schema = Some(schema),
            Err(error) => return Err(self.fail(error.into())),
        }

        self.state.phase = SessionPhase::DataLoading;
        self.load_into_state(table, 1).await
    }

    /// Replaces the schema of the selected table, then loads rows if none
    /// are showing yet.
    pub async fn reload_schema(&mut self) -> Result<(), SessionError> {
        let table = self.selected_table()?;
        if self.state.phase != SessionPhase::Ready {
            self.state.phase = SessionPhase::SchemaLoading;
        }

        match self.catalog.load_schema(&table).await {
            Ok(schema) => self.state.schema = Some(schema),
            Err(error) => return Err(self.fail(error.into())),
        }

        if self.state.window.is_none() {
            self.state.phase = SessionPhase::DataLoading;
            let page = self.state.page;
            return self.load_into_state(&table, page).await;
        }
        Ok(())
    }

    /// Returns `false` without fetching when already on the last page.
    pub async fn next_page(&mut self) -> Result<bool, SessionError> {
        let Some(target) = self.state.window.as_ref().and_then(PageWindow::next_page) else {
            return Ok(false);
        };
        let table = self.selected_table()?;
        self.load_into_state(&table, target).await.map(|()| true)
    }

    /// Returns `false` without fetching when already on the first page.
    pub async fn previous_page(&mut self) -> Result<bool, SessionError> {
        let Some(target) = self
            .state
            .window
            .as_ref()
            .and_then(PageWindow::previous_page)
        else {
            return Ok(false);
        };
        let table = self.selected_table()?;
        self.load_into_state(&table, target).await.map(|()| true)
    }

    /// Re-reads the current page, stepping back when rows were removed
    /// from under it.
    pub async fn refresh_page(&mut self) -> Result<(), SessionError> {
        let table = self.selected_table()?;
        let page = self.state.page;
        let window = match self.fetcher.load_page(&table, page).await {
            Ok(window) => window,
            Err(error) => return Err(self.fail(error.into())),
        };

        let clamped = clamp_page(page, window.total, window.limit);
        if clamped != page && window.rows.is_empty() {
            log::debug!("page {page} of `{table}` is now empty; moving to page {clamped}");
            return self.load_into_state(&table, clamped).await;
        }

        self.commit_window(page, window);
        Ok(())
    }

    pub fn open_insert(&mut self) -> Result<(), SessionError> {
        let table = self.selected_table()?;
        self.ensure_writable(AuditOperation::Insert, &table)?;
        self.current_columns(&table)?;
        if self.state.insert_draft.is_none() {
            self.state.insert_draft = Some(EditDraft::new());
        }
        Ok(())
    }

    pub fn insert_draft_mut(&mut self) -> Option<&mut EditDraft> {
        self.state.insert_draft.as_mut()
    }

    pub fn cancel_insert(&mut self) {
        self.state.insert_draft = None;
    }

    /// On failure the draft stays in place for another attempt.
    pub async fn submit_insert(&mut self) -> Result<(), SessionError> {
        let table = self.selected_table()?;
        let Some(draft) = self.state.insert_draft.clone() else {
            return Err(self.fail(SessionError::NoInsertInProgress));
        };
        self.ensure_writable(AuditOperation::Insert, &table)?;
        let columns = self.current_columns(&table)?;

        match self.mutations.insert(&table, &columns, &draft).await {
            Ok(_) => {
                self.audit(
                    AuditRecord::now(AuditOperation::Insert, AuditOutcome::Succeeded)
                        .with_table(&table),
                );
                self.state.insert_draft = None;
                self.state.notice = Some(Notice::info(format!("Row inserted into `{table}`")));
                self.reconcile().await;
                Ok(())
            }
            Err(error) => {
                self.audit(
                    AuditRecord::now(AuditOperation::Insert, AuditOutcome::Failed)
                        .with_table(&table)
                        .with_error(error.to_string()),
                );
                Err(self.fail(error.into()))
            }
        }
    }

    /// Opens an update for a row on the current page, seeding the draft
    /// from its values.
    pub fn open_edit(&mut self, row_index: usize) -> Result<(), SessionError> {
        let table = self.selected_table()?;
        self.ensure_writable(AuditOperation::Update, &table)?;
        let columns = self.current_columns(&table)?;
        let row = self.row_at(row_index)?;
        if let Err(error) = resolve_primary_key(&row, &columns) {
            return Err(self.fail(error.into()));
        }

        let draft = EditDraft::from_row(&row, &columns);
        self.state.edit = Some(EditFlow { row, draft });
        Ok(())
    }

    pub fn edit_draft_mut(&mut self) -> Option<&mut EditDraft> {
        self.state.edit.as_mut().map(|flow| &mut flow.draft)
    }

    pub fn cancel_edit(&mut self) {
        self.state.edit = None;
    }

    /// The key is re-derived from the current schema at submission time.
    pub async fn submit_edit(&mut self) -> Result<(), SessionError> {
        let table = self.selected_table()?;
        let Some(flow) = self.state.edit.clone() else {
            return Err(self.fail(SessionError::NoEditInProgress));
        };
        self.ensure_writable(AuditOperation::Update, &table)?;
        let columns = self.current_columns(&table)?;

        match self
            .mutations
            .update(&table, &columns, &flow.row, &flow.draft)
            .await
        {
            Ok(key) => {
                self.audit(
                    AuditRecord::now(AuditOperation::Update, AuditOutcome::Succeeded)
                        .with_table(&table)
                        .with_primary_key(key.to_string()),
                );
                self.state.edit = None;
                self.state.notice = Some(Notice::info(format!("Row {key} updated")));
                self.reconcile().await;
                Ok(())
            }
            Err(error) => {
                let mut record = AuditRecord::now(AuditOperation::Update, AuditOutcome::Failed)
                    .with_table(&table)
                    .with_error(error.to_string());
                if let Ok(key) = resolve_primary_key(&flow.row, &columns) {
                    record = record.with_primary_key(key.to_string());
                }
                self.audit(record);
                Err(self.fail(error.into()))
            }
        }
    }

    /// First half of a delete: resolves the row's key and parks it behind a
    /// single-use token. Nothing is sent until [`Self::confirm_delete`].
    pub fn request_delete(&mut self, row_index: usize) -> Result<PendingDelete, SessionError> {
        let table = self.selected_table()?;
        self.ensure_writable(AuditOperation::Delete, &table)?;
        let columns = self.current_columns(&table)?;
        let row = self.row_at(row_index)?;
        let key = match resolve_primary_key(&row, &columns) {
            Ok(key) => key,
            Err(error) => return Err(self.fail(error.into())),
        };

        self.delete_nonce = self.delete_nonce.saturating_add(1);
        let pending = PendingDelete {
            token: DeleteToken(format!("delete-{}-{table}", self.delete_nonce)),
            table,
            key,
        };
        self.state.pending_delete = Some(pending.clone());
        Ok(pending)
    }

    pub fn decline_delete(&mut self) -> Option<PendingDelete> {
        let pending = self.state.pending_delete.take()?;
        log::info!("delete of `{}` row {} declined", pending.table, pending.key);
        self.audit(
            AuditRecord::now(AuditOperation::Delete, AuditOutcome::Declined)
                .with_table(&pending.table)
                .with_primary_key(pending.key.to_string()),
        );
        self.state.notice = Some(Notice::info("Delete cancelled"));
        Some(pending)
    }

    /// A mismatched token is rejected and leaves the pending delete in place.
    pub async fn confirm_delete(&mut self, token: &DeleteToken) -> Result<(), SessionError> {
        let verdict = self.state.pending_delete.as_ref().map(|pending| {
            &pending.token == token
                && self.state.selected_table.as_deref() == Some(pending.table.as_str())
        });
        match verdict {
            None => return Err(self.fail(SessionError::NoPendingDelete)),
            Some(false) => return Err(self.fail(SessionError::InvalidConfirmation)),
            Some(true) => {}
        }
        let Some(pending) = self.state.pending_delete.take() else {
            return Err(self.fail(SessionError::NoPendingDelete));
        };
        let table = pending.table.clone();
        self.ensure_writable(AuditOperation::Delete, &table)?;

        let record = AuditRecord::now(AuditOperation::Delete, AuditOutcome::Succeeded)
            .with_table(&table)
            .with_primary_key(pending.key.to_string());
        match self.mutations.delete(&table, &pending.key).await {
            Ok(()) => {
                self.audit(record);
                self.state.notice = Some(Notice::info(format!("Row {} deleted", pending.key)));
                self.reconcile().await;
                Ok(())
            }
            Err(error) => {
                self.audit(AuditRecord {
                    outcome: AuditOutcome::Failed,
                    error: Some(error.to_string()),
                    ..record
                });
                Err(self.fail(error.into()))
            }
        }
    }

    /// Replaces the previous result only when the query succeeds.
    pub async fn run_query(&mut self, sql: &str) -> Result<(), SessionError> {
        match self.queries.run(sql).await {
            Ok(execution) => {
                self.audit(
                    AuditRecord::now(AuditOperation::Query, AuditOutcome::Succeeded).with_sql(sql),
                );
                self.state.notice = Some(Notice::info(format!(
                    "Query returned {} rows in {}ms",
                    execution.result.row_count(),
                    execution.elapsed.as_millis()
                )));
                self.state.query_result = Some(execution.result);
                Ok(())
            }
            Err(error) => {
                self.audit(
                    AuditRecord::now(AuditOperation::Query, AuditOutcome::Failed)
                        .with_sql(sql)
                        .with_error(error.to_string()),
                );
                Err(self.fail(error.into()))
            }
        }
    }

    async fn load_into_state(&mut self, table: &str, page: u32) -> Result<(), SessionError> {
        match self.fetcher.load_page(table, page).await {
            Ok(window) => {
                self.commit_window(page, window);
                Ok(())
            }
            Err(error) => Err(self.fail(error.into())),
        }
    }

    // Page number and window only ever change together.
    fn commit_window(&mut self, page: u32, window: PageWindow) {
        self.state.page = page;
        self.state.window = Some(window);
        if self.state.current_schema().is_some() {
            self.state.phase = SessionPhase::Ready;
        }
    }

    /// After a write: re-read the page and the table list. Failures here are
    /// reported but do not undo the write.
    async fn reconcile(&mut self) {
        if let Err(error) = self.refresh_page().await {
            log::warn!("refresh after write failed: {error}");
        }
        if let Err(error) = self.refresh_tables().await {
            log::warn!("table list refresh after write failed: {error}");
        }
    }

    fn selected_table(&mut self) -> Result<String, SessionError> {
        match self.state.selected_table.clone() {
            Some(table) => Ok(table),
            None => Err(self.fail(SessionError::NoTableSelected)),
        }
    }

    fn ensure_writable(
        &mut self,
        operation: AuditOperation,
        table: &str,
    ) -> Result<(), SessionError> {
        if !self.state.mode.readonly {
            return Ok(());
        }
        self.audit(AuditRecord::now(operation, AuditOutcome::Blocked).with_table(table));
        Err(self.fail(SessionError::ReadOnly))
    }

    fn current_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, SessionError> {
        match self.state.current_schema() {
            Some(schema) => Ok(schema.columns.clone()),
            None => Err(self.fail(
                IdentityError::SchemaUnavailable {
                    table: table.to_string(),
                }
                .into(),
            )),
        }
    }

    fn row_at(&mut self, index: usize) -> Result<Row, SessionError> {
        match self.state.row(index) {
            Some(row) => Ok(row.clone()),
            None => {
                let len = self.state.row_count();
                Err(self.fail(SessionError::RowOutOfRange { index, len }))
            }
        }
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        log::warn!("{error}");
        self.state.notice = Some(Notice::error(error.user_message()));
        error
    }

    fn audit(&self, record: AuditRecord) {
        let Some(sink) = &self.audit else {
            return;
        };
        if let Err(error) = sink.append(&record) {
            log::warn!("failed to write audit record: {error}");
        }
    }
}
