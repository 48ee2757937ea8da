//! Engine transactions.
//!
//! A [`Transaction`] occupies its connection's single transaction slot from
//! `BEGIN` until it is committed, rolled back, dropped, or the connection
//! closes.

use std::fmt;

use crate::connection::SharedConnection;
use crate::connection::wrapper::next_token;
use crate::error::{Error, Result};

/// Requested isolation level.
///
/// The engine has a single writer and serializes transactions, so only
/// `Unspecified` and `Serializable` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    Serializable,
    ReadCommitted,
    ReadUncommitted,
    RepeatableRead,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "Unspecified",
            Self::Serializable => "Serializable",
            Self::ReadCommitted => "ReadCommitted",
            Self::ReadUncommitted => "ReadUncommitted",
            Self::RepeatableRead => "RepeatableRead",
        };
        f.write_str(name)
    }
}

/// An open engine transaction.
///
/// Dropping an uncompleted transaction rolls it back.
#[derive(Debug)]
pub struct Transaction {
    inner: SharedConnection,
    token: u64,
    completed: bool,
}

impl Transaction {
    pub(crate) fn begin(inner: &SharedConnection, isolation_level: IsolationLevel) -> Result<Self> {
        if !matches!(
            isolation_level,
            IsolationLevel::Unspecified | IsolationLevel::Serializable
        ) {
            return Err(Error::not_supported(format!(
                "isolation level {isolation_level}"
            )));
        }

        let mut guard = inner.lock();
        let raw = guard.raw("begin_transaction")?;
        if guard.transaction().is_some() {
            return Err(Error::invalid_operation(
                "begin_transaction",
                "a transaction is already open on this connection",
            ));
        }
        raw.exec("BEGIN")?;

        let token = next_token();
        guard.begin_transaction(token);
        tracing::debug!(token, "transaction started");

        Ok(Self {
            inner: inner.clone(),
            token,
            completed: false,
        })
    }

    /// Effective isolation level.
    pub const fn isolation_level(&self) -> IsolationLevel {
        IsolationLevel::Serializable
    }

    /// True once the transaction no longer occupies the connection's slot.
    pub fn is_completed(&self) -> bool {
        self.completed || self.inner.lock().transaction() != Some(self.token)
    }

    pub(crate) const fn token(&self) -> u64 {
        self.token
    }

    /// Commit the transaction.
    ///
    /// If the engine refuses to commit, the error is returned and the
    /// transaction is rolled back as `self` drops.
    pub fn commit(mut self) -> Result<()> {
        self.finish("commit", "COMMIT")
    }

    /// Roll the transaction back.
    pub fn rollback(mut self) -> Result<()> {
        self.finish("rollback", "ROLLBACK")
    }

    fn finish(&mut self, operation: &'static str, sql: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        if self.completed || guard.transaction() != Some(self.token) {
            self.completed = true;
            return Err(Error::invalid_operation(
                operation,
                "the transaction has already completed",
            ));
        }
        let raw = guard.raw(operation)?;

        // a failed statement may already have ended the engine transaction
        if !raw.is_autocommit() {
            raw.exec(sql)?;
        }

        guard.end_transaction(self.token);
        self.completed = true;
        tracing::debug!(token = self.token, operation, "transaction completed");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if self.inner.lock().transaction() != Some(self.token) {
            return;
        }
        if let Err(err) = self.finish("rollback", "ROLLBACK") {
            tracing::warn!(error = %err, "failed to roll back transaction on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Connection, IsolationLevel};

    fn open() -> Connection {
        let mut conn = Connection::new("Data Source=:memory:").unwrap();
        conn.open().unwrap();
        conn.create_command("CREATE TABLE t(a INTEGER)")
            .execute_non_query()
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        let mut cmd = conn.create_command("SELECT COUNT(*) FROM t");
        cmd.execute_scalar().unwrap().to_string().parse().unwrap()
    }

    #[test]
    fn test_second_begin_fails_until_completed() {
        let conn = open();
        let tx = conn.begin_transaction().unwrap();
        let err = conn.begin_transaction().unwrap_err();
        assert!(err.is_invalid_operation());
        assert_eq!(err.operation(), Some("begin_transaction"));

        tx.commit().unwrap();
        let tx = conn.begin_transaction().unwrap();
        tx.rollback().unwrap();
        conn.begin_transaction().unwrap();
    }

    #[test]
    fn test_commit_and_rollback_effects() {
        let conn = open();

        let tx = conn.begin_transaction().unwrap();
        let mut cmd = conn.create_command("INSERT INTO t VALUES (1)");
        cmd.set_transaction(Some(&tx));
        cmd.execute_non_query().unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&conn), 1);

        let tx = conn.begin_transaction().unwrap();
        cmd.set_transaction(Some(&tx));
        cmd.execute_non_query().unwrap();
        tx.rollback().unwrap();
        cmd.set_transaction(None);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let conn = open();
        {
            let tx = conn.begin_transaction().unwrap();
            let mut cmd = conn.create_command("INSERT INTO t VALUES (1)");
            cmd.set_transaction(Some(&tx));
            cmd.execute_non_query().unwrap();
        }
        assert_eq!(count(&conn), 0);
        conn.begin_transaction().unwrap();
    }

    #[test]
    fn test_unsupported_isolation() {
        let conn = open();
        let err = conn
            .begin_transaction_with(IsolationLevel::ReadUncommitted)
            .unwrap_err();
        assert!(err.is_not_supported());
        let tx = conn
            .begin_transaction_with(IsolationLevel::Serializable)
            .unwrap();
        assert_eq!(tx.isolation_level(), IsolationLevel::Serializable);
    }

    #[test]
    fn test_begin_requires_open_connection() {
        let conn = Connection::new("Data Source=:memory:").unwrap();
        let err = conn.begin_transaction().unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_close_completes_transaction() {
        let mut conn = open();
        let tx = conn.begin_transaction().unwrap();
        conn.close().unwrap();
        assert!(tx.is_completed());
        let err = tx.commit().unwrap_err();
        assert!(err.is_invalid_operation());
    }
}
