//! Line grammar of the interactive shell.
//!
//! Commands are whitespace-separated; keys and values are taken as UTF-8
//! bytes. `PUT` accepts an optional trailing TTL in seconds.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration> },
    Get { key: Vec<u8> },
    Del { key: Vec<u8> },
    BfAdd { key: Vec<u8>, value: Vec<u8> },
    BfRemove { key: Vec<u8>, value: Vec<u8> },
    BfGet { key: Vec<u8>, value: Vec<u8> },
    CmsAdd { key: Vec<u8>, value: Vec<u8> },
    CmsRemove { key: Vec<u8>, value: Vec<u8> },
    CmsGet { key: Vec<u8>, value: Vec<u8> },
    HllAdd { key: Vec<u8>, value: Vec<u8> },
    HllRemove { key: Vec<u8>, value: Vec<u8> },
    HllGet { key: Vec<u8> },
    Flush,
    Stats,
    Exit,
}

/// Parses one input line. `Ok(None)` for a blank line; `Err` carries a
/// usage message for the user.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    let bytes = |s: &str| s.as_bytes().to_vec();
    let two = |name: &str, args: &[&str]| -> Result<(Vec<u8>, Vec<u8>), String> {
        match args {
            [k, v] => Ok((bytes(k), bytes(v))),
            _ => Err(format!("usage: {name} key value")),
        }
    };

    let command = match cmd.to_uppercase().as_str() {
        "PUT" => match args.as_slice() {
            [k, v] => Command::Put { key: bytes(k), value: bytes(v), ttl: None },
            [k, v, ttl] => {
                let secs: u64 = ttl.parse().map_err(|_| "usage: PUT key value [ttl_secs]")?;
                Command::Put {
                    key: bytes(k),
                    value: bytes(v),
                    ttl: Some(Duration::from_secs(secs)),
                }
            }
            _ => return Err("usage: PUT key value [ttl_secs]".into()),
        },
        "GET" => match args.as_slice() {
            [k] => Command::Get { key: bytes(k) },
            _ => return Err("usage: GET key".into()),
        },
        "DEL" | "DELETE" => match args.as_slice() {
            [k] => Command::Del { key: bytes(k) },
            _ => return Err("usage: DEL key".into()),
        },
        "BFADD" => two("BFADD", &args).map(|(key, value)| Command::BfAdd { key, value })?,
        "BFRM" => two("BFRM", &args).map(|(key, value)| Command::BfRemove { key, value })?,
        "BFGET" => two("BFGET", &args).map(|(key, value)| Command::BfGet { key, value })?,
        "CMSADD" => two("CMSADD", &args).map(|(key, value)| Command::CmsAdd { key, value })?,
        "CMSRM" => two("CMSRM", &args).map(|(key, value)| Command::CmsRemove { key, value })?,
        "CMSGET" => two("CMSGET", &args).map(|(key, value)| Command::CmsGet { key, value })?,
        "HLLADD" => two("HLLADD", &args).map(|(key, value)| Command::HllAdd { key, value })?,
        "HLLRM" => two("HLLRM", &args).map(|(key, value)| Command::HllRemove { key, value })?,
        "HLLGET" => match args.as_slice() {
            [k] => Command::HllGet { key: bytes(k) },
            _ => return Err("usage: HLLGET key".into()),
        },
        "FLUSH" => Command::Flush,
        "STATS" => Command::Stats,
        "EXIT" | "QUIT" => Command::Exit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(command))
}
