//! # StrataKV interactive shell
//!
//! A REPL over the storage engine: reads commands from stdin, prints
//! results to stdout. Works interactively or scripted (pipe commands in).
//!
//! ## Commands
//!
//! ```text
//! PUT key value [ttl]   Insert or update (optional TTL in seconds)
//! GET key               Look up a key (prints value or "(nil)")
//! DEL key               Delete a key (writes a tombstone)
//! BFADD set v           Bloom log: add value to set
//! BFRM set v            Bloom log: remove value from set
//! BFGET set v           Membership after replaying the log
//! CMSADD k v / CMSRM    Count-min log: increment / decrement
//! CMSGET k v            Count (adds minus removes, floor 0)
//! HLLADD k v / HLLRM    Cardinality log: add / remove value
//! HLLGET k              Distinct values currently added
//! FLUSH                 Force-flush memtables to SSTables
//! STATS                 Print engine debug info
//! EXIT / QUIT           Shut down
//! ```
//!
//! ## Configuration
//!
//! `STRATA_CONFIG` names a JSON config file (default `strata.json`; a
//! missing file means defaults). `STRATA_WAL_SYNC=false` trades durability
//! for write speed.

mod commands;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use commands::{parse, Command};
use engine::{Config, Engine};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config_path =
        PathBuf::from(std::env::var("STRATA_CONFIG").unwrap_or_else(|_| "strata.json".into()));
    let wal_sync = std::env::var("STRATA_WAL_SYNC")
        .map(|v| v != "false")
        .unwrap_or(true);

    let cfg = Config::load(&config_path);
    let mut engine = Engine::new(cfg, wal_sync)?;

    println!(
        "StrataKV started (seq={}, data_dir={}, wal_sync={wal_sync})",
        engine.seq(),
        engine.config().data_dir.display()
    );
    println!("Commands: PUT GET DEL | BFADD BFRM BFGET | CMSADD CMSRM CMSGET | HLLADD HLLRM HLLGET | FLUSH STATS EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Exit)) => {
                println!("bye");
                break;
            }
            Ok(Some(cmd)) => run(&mut engine, cmd),
            Err(usage) => println!("ERR {usage}"),
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

fn run(engine: &mut Engine, cmd: Command) {
    match cmd {
        Command::Put { key, value, ttl } => {
            let result = match ttl {
                Some(ttl) => engine.put_with_ttl(key, value, ttl),
                None => engine.put(key, value),
            };
            reply_unit(result);
        }
        Command::Get { key } => match engine.get(&key) {
            Ok(Some(value)) => println!("{}", String::from_utf8_lossy(&value)),
            Ok(None) => println!("(nil)"),
            Err(e) => println!("ERR {e}"),
        },
        Command::Del { key } => reply_unit(engine.delete(key)),
        Command::BfAdd { key, value } => reply_unit(engine.bf_add(key, value)),
        Command::BfRemove { key, value } => reply_unit(engine.bf_remove(key, value)),
        Command::BfGet { key, value } => match engine.bf_get(&key, &value) {
            Ok(present) => println!("{present}"),
            Err(e) => println!("ERR {e}"),
        },
        Command::CmsAdd { key, value } => reply_unit(engine.cms_add(key, value)),
        Command::CmsRemove { key, value } => reply_unit(engine.cms_remove(key, value)),
        Command::CmsGet { key, value } => match engine.cms_get(&key, &value) {
            Ok(count) => println!("{count}"),
            Err(e) => println!("ERR {e}"),
        },
        Command::HllAdd { key, value } => reply_unit(engine.hll_add(key, value)),
        Command::HllRemove { key, value } => reply_unit(engine.hll_remove(key, value)),
        Command::HllGet { key } => match engine.hll_get(&key) {
            Ok(count) => println!("{count}"),
            Err(e) => println!("ERR {e}"),
        },
        Command::Flush => match engine.force_flush() {
            Ok(()) => match engine.sstable_count() {
                Ok(n) => println!("OK ({n} sstables)"),
                Err(e) => println!("ERR {e}"),
            },
            Err(e) => println!("ERR {e}"),
        },
        Command::Stats => println!("{engine:?}"),
        Command::Exit => unreachable!("handled by the repl loop"),
    }
}

fn reply_unit(result: Result<()>) {
    match result {
        Ok(()) => println!("OK"),
        Err(e) => println!("ERR {e}"),
    }
}
