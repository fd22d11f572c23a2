use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use diesel::pg::PgConnection;
use diesel::Connection;

use backoffice::{
    config::AppConfig,
    import::{import_events, parse_json_lines, IMPORT_ACTOR},
    telemetry::init_tracing,
};

const USAGE: &str = "Usage: import_jobs <file.jsonl> [--tenant <id>]";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let mut path = None;
    let mut tenant = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tenant" => {
                let value = args.next().context("--tenant needs a value")?;
                tenant = Some(value.trim().to_string()).filter(|value| !value.is_empty());
            }
            other if path.is_none() && !other.starts_with("--") => path = Some(other.to_string()),
            other => bail!("unexpected argument: {other}\n{USAGE}"),
        }
    }
    let Some(path) = path else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let input = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "import",
        database_url = %config.redacted_database_url(),
        file = %path,
        tenant = tenant.as_deref().unwrap_or("-"),
        "loaded backend configuration"
    );
    let mut conn =
        PgConnection::establish(&config.database_url).context("failed to connect to database")?;

    let summary = import_events(
        &mut conn,
        tenant.as_deref(),
        parse_json_lines(&input),
        IMPORT_ACTOR,
    );
    println!(
        "created={} skipped={} errors={}",
        summary.created, summary.skipped, summary.errors
    );
    Ok(())
}
