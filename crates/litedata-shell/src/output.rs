//! Result rendering.
//!
//! Every result set of a command is rendered in turn, followed by the
//! records-affected count when the command changed rows.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use litedata::{DataReader, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellError};

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text table
    #[default]
    Table,
    /// One JSON document per command
    Json,
}

impl FromStr for OutputFormat {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(ShellError::config(format!(
                "unknown output format '{other}' (expected table or json)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => f.write_str("table"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// One result set, fully materialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    #[serde(serialize_with = "serialize_rows")]
    pub rows: Vec<Vec<Value>>,
}

/// Everything a command produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub result_sets: Vec<ResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_affected: Option<i64>,
}

impl CommandOutput {
    /// Drain `reader`, collecting every result set that has columns.
    pub fn collect(reader: &mut DataReader<'_>) -> Result<Self> {
        let mut result_sets = Vec::new();
        loop {
            let field_count = reader.field_count()?;
            if field_count > 0 {
                let columns = (0..field_count)
                    .map(|ordinal| reader.get_name(ordinal))
                    .collect::<litedata::Result<Vec<_>>>()?;
                let mut rows = Vec::new();
                while reader.read()? {
                    let mut row = vec![Value::Null; field_count];
                    reader.get_values(&mut row)?;
                    rows.push(row);
                }
                result_sets.push(ResultSet { columns, rows });
            }
            if !reader.next_result()? {
                break;
            }
        }

        let records_affected = Some(reader.records_affected()).filter(|n| *n >= 0);
        Ok(Self {
            result_sets,
            records_affected,
        })
    }

    /// Write in the requested format.
    pub fn render(&self, format: OutputFormat, out: &mut impl Write) -> Result<()> {
        match format {
            OutputFormat::Table => self.render_table(out),
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, self)?;
                writeln!(out)?;
                Ok(())
            }
        }
    }

    fn render_table(&self, out: &mut impl Write) -> Result<()> {
        for set in &self.result_sets {
            let cells: Vec<Vec<String>> = set
                .rows
                .iter()
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect();

            let mut widths: Vec<usize> = set.columns.iter().map(|c| c.chars().count()).collect();
            for row in &cells {
                for (width, cell) in widths.iter_mut().zip(row) {
                    *width = (*width).max(cell.chars().count());
                }
            }

            write_row(out, &set.columns, &widths)?;
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            write_row(out, &rule, &widths)?;
            for row in &cells {
                write_row(out, row, &widths)?;
            }
            let noun = if set.rows.len() == 1 { "row" } else { "rows" };
            writeln!(out, "({} {noun})", set.rows.len())?;
        }

        if let Some(affected) = self.records_affected {
            writeln!(out, "{affected} record(s) affected")?;
        }
        Ok(())
    }
}

fn write_row(out: &mut impl Write, cells: &[String], widths: &[usize]) -> Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ");
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}

/// JSON representation of a single value.
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Boolean(v) => Json::Bool(*v),
        Value::Byte(v) => Json::from(*v),
        Value::SByte(v) => Json::from(*v),
        Value::Int16(v) => Json::from(*v),
        Value::UInt16(v) => Json::from(*v),
        Value::Int32(v) => Json::from(*v),
        Value::UInt32(v) => Json::from(*v),
        Value::Int64(v) => Json::from(*v),
        Value::UInt64(v) => Json::from(*v),
        Value::Single(v) => serde_json::Number::from_f64(f64::from(*v)).map_or(Json::Null, Json::Number),
        Value::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
        // text keeps full precision
        Value::Decimal(_)
        | Value::Char(_)
        | Value::String(_)
        | Value::Blob(_)
        | Value::DateTime(_)
        | Value::Guid(_) => Json::String(value.to_string()),
    }
}

fn serialize_rows<S: serde::Serializer>(
    rows: &[Vec<Value>],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;

    let mut seq = serializer.serialize_seq(Some(rows.len()))?;
    for row in rows {
        let json: Vec<serde_json::Value> = row.iter().map(to_json).collect();
        seq.serialize_element(&json)?;
    }
    seq.end()
}

#[cfg(test)]
mod tests {
    use litedata::Connection;

    use super::*;

    fn memory() -> Connection {
        let mut conn = Connection::new("Data Source=:memory:").unwrap();
        conn.open().unwrap();
        conn
    }

    fn run(conn: &Connection, sql: &str) -> CommandOutput {
        let mut cmd = conn.create_command(sql);
        let mut reader = cmd.execute_reader().unwrap();
        CommandOutput::collect(&mut reader).unwrap()
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!(" JSON ".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("csv".parse::<OutputFormat>().unwrap_err().is_config());
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_collect_multiple_result_sets() {
        let conn = memory();
        let output = run(
            &conn,
            "CREATE TABLE t(a INTEGER, b TEXT); INSERT INTO t VALUES (1,'x'),(2,NULL); \
             SELECT a, b FROM t ORDER BY a; SELECT COUNT(*) AS n FROM t",
        );
        assert_eq!(output.result_sets.len(), 2);
        assert_eq!(output.result_sets[0].columns, vec!["a", "b"]);
        assert_eq!(
            output.result_sets[0].rows,
            vec![
                vec![Value::Int64(1), Value::String("x".into())],
                vec![Value::Int64(2), Value::Null],
            ]
        );
        assert_eq!(output.result_sets[1].rows, vec![vec![Value::Int64(2)]]);
        assert_eq!(output.records_affected, Some(2));
    }

    #[test]
    fn test_render_table() {
        let conn = memory();
        let output = run(&conn, "SELECT 1 AS id, 'alpha' AS name UNION ALL SELECT 22, NULL");
        let mut buf = Vec::new();
        output.render(OutputFormat::Table, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "id | name\n-- | -----\n1  | alpha\n22 | NULL\n(2 rows)\n"
        );
    }

    #[test]
    fn test_render_table_records_affected() {
        let conn = memory();
        let output = run(&conn, "CREATE TABLE t(a); INSERT INTO t VALUES (1)");
        assert!(output.result_sets.is_empty());
        let mut buf = Vec::new();
        output.render(OutputFormat::Table, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1 record(s) affected\n");
    }

    #[test]
    fn test_render_json() {
        let conn = memory();
        let output = run(&conn, "SELECT 1 AS i, 2.5 AS r, 't' AS s, x'0aff' AS b, NULL AS n");
        let mut buf = Vec::new();
        output.render(OutputFormat::Json, &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({
                "result_sets": [{
                    "columns": ["i", "r", "s", "b", "n"],
                    "rows": [[1, 2.5, "t", "x'0AFF'", null]]
                }]
            })
        );
    }

    #[test]
    fn test_to_json_non_finite() {
        assert_eq!(to_json(&Value::Double(f64::NAN)), serde_json::Value::Null);
        assert_eq!(to_json(&Value::Boolean(true)), serde_json::Value::Bool(true));
    }
}
