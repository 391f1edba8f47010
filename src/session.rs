//! Mapping session: catalog cache, prepared values, execution and transactions.

use crate::catalog::{ActionMode, FieldCatalog};
use crate::context::ExecContext;
use crate::decode::ValueDecoder;
use crate::driver::{Connection, ExecResult, QueryResult, Statement, Transaction};
use crate::encode::ValueEncoder;
use crate::error::{Error, Result};
use crate::policy::{Opt, Policy};
use crate::record::Record;
use crate::types::Value;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A unit of work against one base connection.
///
/// The session caches the column catalog of the last prepared record type
/// and the parameters encoded by the last insert/update. It is not meant
/// to be shared between tasks; open one session per logical unit of work.
/// Many sessions may share a connection through `Arc<C>`.
///
/// # Example
///
/// ```no_run
/// # async fn demo<C: sqltool_rs::Connection>(conn: C) -> sqltool_rs::Result<()> {
/// use sqltool_rs::{record, Opt, Session};
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     created_at: i64,
///     username: String,
/// }
///
/// record!(User {
///     id => "id",
///     created_at => "created_at",
///     username => "username",
/// });
///
/// let mut session = Session::new(conn);
/// let user = User { username: "sample".into(), ..Default::default() };
/// session.prepare_insert(&user, [
///     Opt::date_time_columns(["created_at"]),
///     Opt::auto_create_date_time_columns(["created_at"]),
/// ])?;
///
/// let columns = session.columns().join(",");
/// let marks = vec!["?"; session.insert_values().len()].join(",");
/// let sql = format!("INSERT INTO user ({}) VALUES ({})", columns, marks);
/// let args = session.insert_values().to_vec();
/// session.exec(&sql, &args).await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<C: Connection> {
    conn: C,
    ctx: ExecContext,
    tx: Option<C::Transaction>,
    policy: Policy,
    mode: ActionMode,
    catalog: Option<Arc<FieldCatalog>>,
    written: Vec<String>,
    values: Vec<Value>,
}

impl<C: Connection> Session<C> {
    /// Open a session with the default policy and no timeout.
    pub fn new(conn: C) -> Self {
        Self::with_context(conn, ExecContext::background())
    }

    /// Open a session whose driver calls are bounded by `ctx`.
    pub fn with_context(conn: C, ctx: ExecContext) -> Self {
        Self {
            conn,
            ctx,
            tx: None,
            policy: Policy::default(),
            mode: ActionMode::Select,
            catalog: None,
            written: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Replace the execution context.
    pub fn set_context(&mut self, ctx: ExecContext) {
        self.ctx = ctx;
    }

    /// Current policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Mode of the last prepare call.
    pub fn mode(&self) -> ActionMode {
        self.mode
    }

    /// Cached catalog, if any record has been prepared.
    ///
    /// The same `Arc` is returned until a prepare call rebuilds the catalog.
    pub fn catalog(&self) -> Option<&Arc<FieldCatalog>> {
        self.catalog.as_ref()
    }

    // --- Prepare ---

    /// Build the insert column list and encode `record`'s values.
    pub fn prepare_insert<R: Record>(
        &mut self,
        record: &R,
        opts: impl IntoIterator<Item = Opt>,
    ) -> Result<()> {
        self.prepare_write(record, ActionMode::Insert, opts)
    }

    /// Build the select column list for `R`.
    pub fn prepare_select<R: Record>(&mut self, _record: &R, opts: impl IntoIterator<Item = Opt>) {
        self.mode = ActionMode::Select;
        refresh_catalog::<R>(&mut self.catalog, &mut self.policy, ActionMode::Select, opts);
    }

    /// Build the update column list and encode `record`'s values.
    pub fn prepare_update<R: Record>(
        &mut self,
        record: &R,
        opts: impl IntoIterator<Item = Opt>,
    ) -> Result<()> {
        self.prepare_write(record, ActionMode::Update, opts)
    }

    /// Switch to delete mode. The catalog is left untouched.
    pub fn prepare_delete(&mut self) {
        self.mode = ActionMode::Delete;
        self.clear_values();
    }

    fn prepare_write<R: Record>(
        &mut self,
        record: &R,
        mode: ActionMode,
        opts: impl IntoIterator<Item = Opt>,
    ) -> Result<()> {
        self.mode = mode;
        self.clear_values();
        let catalog = refresh_catalog::<R>(&mut self.catalog, &mut self.policy, mode, opts);
        let encoder = ValueEncoder::new(catalog, &self.policy, mode, Utc::now());
        self.values = encoder.encode(record)?;
        self.written = encoder.column_names().into_iter().map(String::from).collect();
        Ok(())
    }

    fn clear_values(&mut self) {
        self.written.clear();
        self.values.clear();
    }

    /// Encode another record against the cached catalog, for batch inserts.
    ///
    /// Options are not re-applied and session state is left untouched; the
    /// values line up with the parameters of the last insert/update
    /// prepare. Fails with [`Error::InvalidDestination`] when `R` is not the
    /// prepared record type.
    pub fn prepare_values<R: Record>(&self, record: &R) -> Result<Vec<Value>> {
        let catalog = self.catalog_for::<R>()?;
        ValueEncoder::new(catalog, &self.policy, catalog.mode(), Utc::now()).encode(record)
    }

    /// Column names of the cached catalog, in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        self.catalog
            .as_ref()
            .map(|c| c.column_names())
            .unwrap_or_default()
    }

    /// Parameters encoded by the last insert/update prepare.
    pub fn insert_values(&self) -> &[Value] {
        &self.values
    }

    /// Column to parameter mapping for an UPDATE ... SET clause.
    ///
    /// Built from the columns the last insert/update prepare encoded, so a
    /// later select prepare does not change it.
    pub fn update_map(&self) -> BTreeMap<String, Value> {
        self.written
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    // --- Read ---

    /// Run `sql` and decode the first row into `dest`.
    ///
    /// Fails with [`Error::NoRows`] when the query returns nothing, and with
    /// [`Error::InvalidDestination`] when `R` was not the last prepared record.
    pub async fn select_one<R: Record + Default>(
        &mut self,
        dest: &mut R,
        sql: &str,
        args: &[Value],
    ) -> Result<()> {
        self.catalog_for::<R>()?;
        let result = self.query(sql, args).await?;
        let catalog = self.catalog_for::<R>()?;

        let row = result.rows.first().ok_or(Error::NoRows)?;
        let mut item = R::default();
        ValueDecoder::new(catalog, &self.policy).decode(row, &mut item)?;
        *dest = item;
        Ok(())
    }

    /// Run `sql` and decode every row into `dest`, replacing its contents.
    ///
    /// Rows that fail to decode are logged and skipped. Fails with
    /// [`Error::NoRows`] when no row decoded.
    pub async fn select<R: Record + Default>(
        &mut self,
        dest: &mut Vec<R>,
        sql: &str,
        args: &[Value],
    ) -> Result<()> {
        self.catalog_for::<R>()?;
        dest.clear();
        let result = self.query(sql, args).await?;
        let catalog = self.catalog_for::<R>()?;
        let decoder = ValueDecoder::new(catalog, &self.policy);

        for (index, row) in result.iter().enumerate() {
            let mut item = R::default();
            match decoder.decode(row, &mut item) {
                Ok(()) => dest.push(item),
                Err(err) => tracing::warn!(
                    target: "sqltool::session",
                    row = index,
                    error = %err,
                    "Skipping row that failed to decode"
                ),
            }
        }

        if dest.is_empty() {
            return Err(Error::NoRows);
        }
        Ok(())
    }

    fn catalog_for<R: Record>(&self) -> Result<&FieldCatalog> {
        let catalog = self.catalog.as_deref().ok_or_else(|| {
            Error::invalid_destination("no record prepared; call prepare_select first")
        })?;
        let identity = R::identity();
        if catalog.identity() != identity {
            return Err(Error::invalid_destination(format!(
                "destination {}::{} does not match prepared record {}::{}",
                identity.module_path,
                identity.type_name,
                catalog.identity().module_path,
                catalog.identity().type_name,
            )));
        }
        Ok(catalog)
    }

    // --- Execute ---

    /// Prepare and execute a finished statement.
    ///
    /// Bound the call with the session's [`ExecContext`] rather than by
    /// dropping the returned future: a dropped future skips closing the
    /// statement.
    pub async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let mut stmt = self.prepare_statement(sql).await?;
        let result = self.ctx.run(stmt.execute(args)).await;
        release(stmt).await;
        result
    }

    /// Prepare and run a finished query, returning all rows.
    ///
    /// Cancellation follows the same rule as [`exec`](Self::exec).
    pub async fn query(&mut self, sql: &str, args: &[Value]) -> Result<QueryResult> {
        let mut stmt = self.prepare_statement(sql).await?;
        let result = self.ctx.run(stmt.query(args)).await;
        release(stmt).await;
        result
    }

    async fn prepare_statement(&mut self, sql: &str) -> Result<C::Statement> {
        tracing::debug!(
            target: "sqltool::session",
            sql,
            in_transaction = self.tx.is_some(),
            "Preparing statement"
        );
        match self.tx.as_mut() {
            Some(tx) => self.ctx.run(tx.prepare(sql)).await,
            None => self.ctx.run(self.conn.prepare(sql)).await,
        }
    }

    // --- Transactions ---

    /// Check if a transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Start a transaction. Fails with [`Error::TransactionActive`] if one is open.
    pub async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::TransactionActive);
        }
        let tx = self.ctx.run(self.conn.begin()).await?;
        self.tx = Some(tx);
        Ok(())
    }

    /// Commit the active transaction. A no-op when none is active.
    ///
    /// The session leaves transaction state on any outcome; after a failed
    /// commit the transaction must be treated as lost.
    pub async fn commit(&mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            tracing::warn!(target: "sqltool::session", "Commit called without an active transaction");
            return Ok(());
        };
        self.ctx.run(tx.commit()).await
    }

    /// Roll back the active transaction. A no-op when none is active.
    ///
    /// Transaction state is cleared even when the rollback fails.
    pub async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }
}

/// Rebuild the cached catalog when the record type, mode or a
/// catalog-affecting option changed, and return it.
fn refresh_catalog<'c, R: Record>(
    slot: &'c mut Option<Arc<FieldCatalog>>,
    policy: &mut Policy,
    mode: ActionMode,
    opts: impl IntoIterator<Item = Opt>,
) -> &'c FieldCatalog {
    let mut changed = false;
    for opt in opts {
        changed = opt.apply(policy) || changed;
    }

    let identity = R::identity();
    let stale = slot
        .as_ref()
        .map_or(true, |c| c.identity() != identity || c.mode() != mode);
    if stale || changed {
        *slot = None;
    }
    slot.get_or_insert_with(|| Arc::new(FieldCatalog::build(identity, &R::fields(), policy, mode)))
}

async fn release<S: Statement>(stmt: S) {
    if let Err(err) = stmt.close().await {
        tracing::warn!(target: "sqltool::session", error = %err, "Failed to close statement");
    }
}
