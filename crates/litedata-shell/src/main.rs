use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use litedata_shell::observability::init_logging;
use litedata_shell::{ConfigBuilder, OutputFormat, Session, config};

#[derive(Parser, Debug)]
#[command(name = "litedata-shell")]
#[command(about = "Run SQL against a SQLite database", long_about = None)]
#[command(version)]
struct Args {
    /// Connection string (Data Source=app.db;Mode=ReadOnly)
    #[arg(short = 'C', long)]
    connection: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (table or json)
    #[arg(short, long)]
    output: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    /// SQL commands; read from stdin when omitted
    sql: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // CLI is the lowest layer; file and environment override it
    let mut cli = ConfigBuilder::new();
    if let Some(ref connection) = args.connection {
        cli = cli.connection_string(connection)?;
    }
    if let Some(ref output) = args.output {
        cli = cli.output(output.parse::<OutputFormat>()?);
    }
    if args.verbose {
        cli = cli.log_level("debug");
    }
    if args.json_logs {
        cli = cli.json_logs(true);
    }

    let builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path, cli)?
    } else {
        config::load_config(cli)?
    };
    let config = builder.build()?;

    init_logging(&config.logging)?;
    tracing::debug!(connection = %config.connection, output = %config.output, "configuration loaded");

    let session = Session::open(&config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.sql.is_empty() {
        session.execute_script(&mut io::stdin().lock(), &mut out)?;
    } else {
        for sql in &args.sql {
            session.execute(sql, &mut out)?;
        }
    }

    out.flush()?;
    session.close()?;
    Ok(())
}
