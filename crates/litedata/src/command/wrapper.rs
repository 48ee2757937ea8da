//! Statement executor.
//!
//! A [`Command`] compiles its text into one native statement per SQL
//! statement, binds its parameters into each, and steps each once. Each
//! statement is compiled only after the one before it has run, so a batch may
//! use objects created earlier in the same text. Statements that return
//! columns are handed to the [`DataReader`] primed with the outcome of that
//! first step; statements without columns run to completion and contribute to
//! `records_affected`.

use std::sync::Arc;

use crate::connection::wrapper::next_token;
use crate::connection::{Connection, ConnectionInner, SharedConnection};
use crate::error::{Error, Result};
use crate::native::{HandleId, RawStatement, StepResult};
use crate::reader::{DataReader, PrimedStatement};
use crate::transaction::Transaction;
use crate::types::Value;

use super::parameters::Parameters;

/// SQL command text plus parameters, executed against a connection.
///
/// Compiled statements are cached between executions and finalized when the
/// text or connection changes, when the command drops, or when the
/// connection closes.
///
/// # Example
///
/// ```rust,ignore
/// let mut cmd = conn.create_command("SELECT a, b FROM t WHERE a > :min");
/// cmd.parameters_mut().add_with_value(":min", 0_i64);
/// let mut reader = cmd.execute_reader()?;
/// while reader.read()? {
///     let a: i64 = reader.get_field_value(0)?;
///     let b: Option<String> = reader.get_field_value(1)?;
/// }
/// ```
#[derive(Debug, Default)]
pub struct Command {
    connection: Option<SharedConnection>,
    command_text: String,
    parameters: Parameters,
    transaction: Option<u64>,
    statements: Vec<HandleId>,
    compiled: bool,
}

impl Command {
    /// Command without a connection.
    pub fn new(command_text: impl Into<String>) -> Self {
        Self {
            connection: None,
            command_text: command_text.into(),
            parameters: Parameters::default(),
            transaction: None,
            statements: Vec::new(),
            compiled: false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════════

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    /// Replace the text, finalizing statements compiled from the old one.
    pub fn set_command_text(&mut self, command_text: impl Into<String>) {
        self.release();
        self.command_text = command_text.into();
    }

    /// Attach to (or detach from) a connection. The connection is not owned.
    pub fn set_connection(&mut self, connection: Option<&Connection>) {
        self.release();
        self.connection = connection.map(|conn| Arc::clone(conn.shared()));
    }

    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub const fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Transaction the command runs in. Must be the connection's open
    /// transaction whenever it has one.
    pub fn set_transaction(&mut self, transaction: Option<&Transaction>) {
        self.transaction = transaction.map(Transaction::token);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Compile the command text now instead of on first execution.
    ///
    /// Every statement is compiled against the current schema, so a batch
    /// whose later statements depend on objects created by earlier ones
    /// cannot be prepared ahead; execute it directly instead.
    pub fn prepare(&mut self) -> Result<()> {
        let shared = self.shared("prepare")?;
        let mut inner = shared.lock();
        self.compile(&mut inner, "prepare")
    }

    /// Execute and return a reader over the statements that produce columns.
    ///
    /// Fails if the connection already has an open reader. On an engine
    /// error every statement of the batch is reset before returning.
    pub fn execute_reader(&mut self) -> Result<DataReader<'_>> {
        const OPERATION: &str = "execute_reader";

        let shared = self.shared(OPERATION)?;
        let token = next_token();
        let (primed, records_affected) = {
            let mut inner = shared.lock();
            inner.raw(OPERATION)?;
            if inner.reader().is_some() {
                return Err(Error::invalid_operation(
                    OPERATION,
                    "the connection already has an open data reader",
                ));
            }
            self.check_transaction(&inner, OPERATION)?;
            let executed = if self.is_compiled(&inner) {
                execute(&inner, &self.statements, &self.parameters)?
            } else {
                self.compile_and_execute(&mut inner, OPERATION)?
            };
            inner.acquire_reader(token, OPERATION)?;
            executed
        };

        Ok(DataReader::new(
            shared,
            primed,
            records_affected,
            token,
        ))
    }

    /// Execute and return the number of rows changed, or -1 if no statement
    /// wrote.
    pub fn execute_non_query(&mut self) -> Result<i64> {
        let mut reader = self.execute_reader()?;
        let records_affected = reader.records_affected();
        reader.close()?;
        Ok(records_affected)
    }

    /// Execute and return the first column of the first row, or `Null`.
    pub fn execute_scalar(&mut self) -> Result<Value> {
        let mut reader = self.execute_reader()?;
        let value = if reader.read()? {
            reader.get_value(0)?
        } else {
            Value::Null
        };
        reader.close()?;
        Ok(value)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn shared(&self, operation: &'static str) -> Result<SharedConnection> {
        self.connection
            .clone()
            .ok_or_else(|| Error::invalid_operation(operation, "the command has no connection"))
    }

    fn check_transaction(&self, inner: &ConnectionInner, operation: &'static str) -> Result<()> {
        match (inner.transaction(), self.transaction) {
            (None, None) => Ok(()),
            (Some(active), Some(own)) if active == own => Ok(()),
            (Some(_), None) => Err(Error::invalid_operation(
                operation,
                "the connection has an open transaction that is not assigned to the command",
            )),
            (_, Some(_)) => Err(Error::invalid_operation(
                operation,
                "the command's transaction has completed or belongs to another connection",
            )),
        }
    }

    /// True if every cached statement is still alive on the connection.
    fn is_compiled(&self, inner: &ConnectionInner) -> bool {
        self.compiled && self.statements.iter().all(|id| inner.statements.contains(*id))
    }

    fn check_text(&self, operation: &'static str) -> Result<()> {
        if self.command_text.trim().is_empty() {
            return Err(Error::invalid_operation(operation, "the command text has not been set"));
        }
        Ok(())
    }

    /// Compile the text into statements unless a live compilation exists.
    fn compile(&mut self, inner: &mut ConnectionInner, operation: &'static str) -> Result<()> {
        if self.is_compiled(inner) {
            return Ok(());
        }
        self.release_from(inner);
        self.check_text(operation)?;

        let raw = inner.raw(operation)?;
        let mut compiled: Vec<RawStatement> = Vec::new();
        let mut offset = 0;
        while offset < self.command_text.len() {
            // statements compiled so far are finalized on drop if this fails
            let prepared = raw.prepare(&self.command_text, offset)?;
            offset += prepared.consumed;
            match prepared.statement {
                Some(statement) => compiled.push(statement),
                None => break,
            }
        }

        tracing::debug!(statements = compiled.len(), "compiled command text");
        self.statements = compiled
            .into_iter()
            .map(|statement| inner.statements.insert(statement))
            .collect();
        self.compiled = true;
        Ok(())
    }

    /// Compile and run the text one statement at a time.
    ///
    /// Statements are cached only after the whole batch ran; on failure
    /// every statement compiled so far is finalized.
    fn compile_and_execute(
        &mut self,
        inner: &mut ConnectionInner,
        operation: &'static str,
    ) -> Result<(Vec<PrimedStatement>, i64)> {
        self.release_from(inner);
        self.check_text(operation)?;

        let mut ids = Vec::new();
        let result = compile_each(inner, &self.command_text, &self.parameters, &mut ids, operation);
        match result {
            Ok(executed) => {
                tracing::debug!(statements = ids.len(), "compiled command text");
                self.statements = ids;
                self.compiled = true;
                Ok(executed)
            }
            Err(err) => {
                for id in ids {
                    if let Some(statement) = inner.statements.remove(id) {
                        // repeats the failure being returned
                        let _ = statement.reset();
                        if let Err(finalize_err) = statement.finalize() {
                            tracing::warn!(error = %finalize_err, "failed to finalize statement");
                        }
                    }
                }
                Err(err)
            }
        }
    }

    fn release(&mut self) {
        if self.statements.is_empty() {
            self.compiled = false;
            return;
        }
        if let Some(shared) = self.connection.clone() {
            let mut inner = shared.lock();
            self.release_from(&mut inner);
        }
    }

    /// Finalize every statement this command still owns.
    fn release_from(&mut self, inner: &mut ConnectionInner) {
        for id in self.statements.drain(..) {
            if let Some(statement) = inner.statements.remove(id) {
                // reset first so a stale step failure is not reported as a finalize failure
                let _ = statement.reset();
                if let Err(err) = statement.finalize() {
                    tracing::warn!(error = %err, "failed to finalize statement");
                }
            }
        }
        self.compiled = false;
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        self.release();
    }
}

/// Bind and step each statement once.
///
/// Returns the statements that produce columns, in order, and the number of
/// rows changed by the others (-1 if none of them wrote). On failure every
/// statement of the batch is reset.
fn execute(
    inner: &ConnectionInner,
    ids: &[HandleId],
    parameters: &Parameters,
) -> Result<(Vec<PrimedStatement>, i64)> {
    let result = step_each(inner, ids, parameters);
    if result.is_err() {
        for &id in ids {
            if let Some(statement) = inner.statements.get(id) {
                // repeats the failure being returned
                let _ = statement.reset();
            }
        }
    }
    result
}

fn step_each(
    inner: &ConnectionInner,
    ids: &[HandleId],
    parameters: &Parameters,
) -> Result<(Vec<PrimedStatement>, i64)> {
    let mut primed = Vec::new();
    let mut records_affected = -1_i64;
    for &id in ids {
        step_one(inner, id, parameters, &mut primed, &mut records_affected)?;
    }
    Ok((primed, records_affected))
}

/// Compile the statements of `text` one at a time, running each before the
/// next is compiled. Ids of the compiled statements are pushed to `ids`, also
/// on failure, so the caller can release them.
fn compile_each(
    inner: &mut ConnectionInner,
    text: &str,
    parameters: &Parameters,
    ids: &mut Vec<HandleId>,
    operation: &'static str,
) -> Result<(Vec<PrimedStatement>, i64)> {
    let mut primed = Vec::new();
    let mut records_affected = -1_i64;
    let mut offset = 0;

    while offset < text.len() {
        let prepared = inner.raw(operation)?.prepare(text, offset)?;
        offset += prepared.consumed;
        let Some(statement) = prepared.statement else {
            break;
        };
        let id = inner.statements.insert(statement);
        ids.push(id);
        step_one(inner, id, parameters, &mut primed, &mut records_affected)?;
    }

    Ok((primed, records_affected))
}

/// Bind and step one statement. Column-less statements are reset and their
/// changes added to `records_affected`; the others are primed for the reader.
fn step_one(
    inner: &ConnectionInner,
    id: HandleId,
    parameters: &Parameters,
    primed: &mut Vec<PrimedStatement>,
    records_affected: &mut i64,
) -> Result<()> {
    let raw = inner.raw("execute_reader")?;
    let statement = inner.statements.get(id).ok_or_else(|| {
        Error::invalid_operation("execute_reader", "a compiled statement was finalized")
    })?;

    statement.clear_bindings()?;
    parameters.bind(statement)?;
    let before = raw.total_changes();
    let step = statement.step()?;

    if statement.column_count() > 0 {
        primed.push(PrimedStatement::new(id, step == StepResult::Row));
    } else {
        if !statement.is_readonly() {
            *records_affected = (*records_affected).max(0) + (raw.total_changes() - before);
        }
        statement.reset()?;
    }
    Ok(())
}
