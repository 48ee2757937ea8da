//! SQL session: one open connection, commands rendered as they run.

use std::io::{Read, Write};

use litedata::{Connection, StateChange};

use crate::config::Config;
use crate::error::Result;
use crate::output::{CommandOutput, OutputFormat};

/// Open connection plus the output format for its results.
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    output: OutputFormat,
}

impl Session {
    /// Open the configured database.
    pub fn open(config: &Config) -> Result<Self> {
        let mut connection = Connection::from_builder(config.connection.clone())?;
        connection.on_state_change(|change: StateChange| {
            tracing::debug!(from = %change.original, to = %change.current, "connection state changed");
        });
        connection.open()?;
        tracing::info!(
            data_source = connection.data_source(),
            sqlite = %connection.server_version(),
            "session opened"
        );

        Ok(Self {
            connection,
            output: config.output,
        })
    }

    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    pub const fn output(&self) -> OutputFormat {
        self.output
    }

    /// Execute `sql` as one command and render every result it produces.
    ///
    /// Blank input is skipped.
    pub fn execute(&self, sql: &str, out: &mut impl Write) -> Result<()> {
        if sql.trim().is_empty() {
            return Ok(());
        }

        let mut command = self.connection.create_command(sql);
        let mut reader = command.execute_reader()?;
        let output = CommandOutput::collect(&mut reader)?;
        reader.close()?;
        tracing::debug!(
            result_sets = output.result_sets.len(),
            records_affected = ?output.records_affected,
            "command executed"
        );

        output.render(self.output, out)
    }

    /// Read all of `input` and execute it as one batch.
    pub fn execute_script(&self, input: &mut impl Read, out: &mut impl Write) -> Result<()> {
        let mut sql = String::new();
        input.read_to_string(&mut sql)?;
        self.execute(&sql, out)
    }

    /// Close the connection, reporting any failure.
    pub fn close(mut self) -> Result<()> {
        self.connection.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use litedata::{ConnectionState, ConnectionStringBuilder};

    use super::*;
    use crate::config::ConfigBuilder;

    fn config(connection: ConnectionStringBuilder, output: OutputFormat) -> Config {
        ConfigBuilder::new()
            .connection(connection)
            .output(output)
            .build()
            .unwrap()
    }

    #[test]
    fn test_execute_and_render() {
        let session = Session::open(&config(ConnectionStringBuilder::memory(), OutputFormat::Table)).unwrap();
        assert_eq!(session.connection().state(), ConnectionState::Open);

        let mut out = Vec::new();
        session
            .execute("CREATE TABLE t(a INTEGER); INSERT INTO t VALUES (7)", &mut out)
            .unwrap();
        session.execute("SELECT a FROM t", &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1 record(s) affected\na\n-\n7\n(1 row)\n"
        );
        session.close().unwrap();
    }

    #[test]
    fn test_execute_script_from_reader() {
        let session = Session::open(&config(ConnectionStringBuilder::memory(), OutputFormat::Json)).unwrap();
        let mut input = "SELECT 1 AS one;\nSELECT 'two' AS two;\n".as_bytes();
        let mut out = Vec::new();
        session.execute_script(&mut input, &mut out).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["result_sets"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["result_sets"][1]["rows"][0][0], "two");
    }

    #[test]
    fn test_blank_input_is_skipped() {
        let session = Session::open(&config(ConnectionStringBuilder::memory(), OutputFormat::Table)).unwrap();
        let mut out = Vec::new();
        session.execute("  \n ", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_engine_error_is_surfaced() {
        let session = Session::open(&config(ConnectionStringBuilder::memory(), OutputFormat::Table)).unwrap();
        let err = session.execute("SELECT * FROM missing", &mut Vec::new()).unwrap_err();
        assert!(err.as_database().is_some_and(litedata::Error::is_sqlite));

        // the session stays usable
        let mut out = Vec::new();
        session.execute("SELECT 1", &mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.db");
        let cs = ConnectionStringBuilder::new(path.to_string_lossy());

        let session = Session::open(&config(cs.clone(), OutputFormat::Table)).unwrap();
        session
            .execute("CREATE TABLE t(a); INSERT INTO t VALUES (1), (2)", &mut Vec::new())
            .unwrap();
        session.close().unwrap();

        let session = Session::open(&config(cs, OutputFormat::Json)).unwrap();
        let mut out = Vec::new();
        session.execute("SELECT COUNT(*) AS n FROM t", &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["result_sets"][0]["rows"][0][0], 2);
    }

    #[test]
    fn test_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cs = ConnectionStringBuilder::new(dir.path().join("absent.db").to_string_lossy())
            .with_mode(litedata::OpenMode::ReadOnly);
        let err = Session::open(&config(cs, OutputFormat::Table)).unwrap_err();
        assert!(err.as_database().is_some_and(litedata::Error::is_sqlite));
    }
}
