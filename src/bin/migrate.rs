use std::env;

use anyhow::{bail, Context, Result};
use diesel::pg::PgConnection;
use diesel::Connection;

use backoffice::{
    config::AppConfig,
    migrate::{self, RevisionLog, BASE},
    telemetry::init_tracing,
    utils::time::to_iso,
};

const USAGE: &str = "Usage:
  migrate upgrade [--to REV] [--sql [--from REV]]
  migrate downgrade --to REV|base [--sql [--from REV]]
  migrate current
  migrate history";

#[derive(Debug, Default)]
struct Options {
    to: Option<String>,
    from: Option<String>,
    sql: bool,
}

fn parse_options(args: impl Iterator<Item = String>) -> Result<Options> {
    let mut options = Options::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sql" => options.sql = true,
            "--to" => options.to = Some(args.next().context("--to needs a revision")?),
            "--from" => options.from = Some(args.next().context("--from needs a revision")?),
            other => bail!("unexpected argument: {other}\n{USAGE}"),
        }
    }
    if options.from.is_some() && !options.sql {
        bail!("--from only applies to --sql output\n{USAGE}");
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let command = args.next();
    let log = RevisionLog::embedded()?;

    match command.as_deref() {
        Some("upgrade") => {
            let options = parse_options(args)?;
            if options.sql {
                let from = log.resolve_target(Some(options.from.as_deref().unwrap_or(BASE)))?;
                let to = log.resolve_target(options.to.as_deref())?;
                print!("{}", log.render_upgrade_sql(from, to)?);
                return Ok(());
            }
            let mut conn = connect()?;
            let applied = migrate::upgrade(&mut conn, &log, options.to.as_deref())?;
            if applied.is_empty() {
                println!("Nothing to apply.");
            } else {
                println!("Applied {} revision(s): {}", applied.len(), applied.join(", "));
            }
        }
        Some("downgrade") => {
            let options = parse_options(args)?;
            let Some(target) = options.to.as_deref() else {
                bail!("downgrade requires --to REV|base\n{USAGE}");
            };
            if options.sql {
                let from = log.resolve_target(options.from.as_deref())?;
                let to = log.resolve_target(Some(target))?;
                print!("{}", log.render_downgrade_sql(from, to)?);
                return Ok(());
            }
            let mut conn = connect()?;
            let reverted = migrate::downgrade(&mut conn, &log, target)?;
            if reverted.is_empty() {
                println!("Nothing to revert.");
            } else {
                println!("Reverted {} revision(s): {}", reverted.len(), reverted.join(", "));
            }
        }
        Some("current") => {
            let mut conn = connect()?;
            println!("{}", migrate::current(&mut conn)?.as_deref().unwrap_or(BASE));
        }
        Some("history") => {
            let mut conn = connect()?;
            for entry in migrate::history(&mut conn, &log)? {
                let applied = entry
                    .applied_at
                    .map(to_iso)
                    .unwrap_or_else(|| "pending".to_string());
                println!(
                    "{} -> {} {} ({applied})",
                    entry.revision.parent.unwrap_or(BASE),
                    entry.revision.id,
                    entry.revision.name,
                );
            }
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<PgConnection> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "migrate",
        database_url = %config.redacted_database_url(),
        "loaded backend configuration"
    );
    PgConnection::establish(&config.database_url).context("failed to connect to database")
}
