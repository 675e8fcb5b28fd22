use std::io::{self, Read, Write};

use log::{info, warn};

use keydex::error::IndexResult;
use keydex::protocol::{Command, parse_command};
use keydex::storage::btree::BPlusTree;
use keydex::storage::page::Key;

const DEFAULT_INDEX_FILE: &str = "bpt.dat";

fn main() -> IndexResult<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_INDEX_FILE.to_string());
    info!("opening index file {path}");
    let mut tree = BPlusTree::open(&path)?;

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let mut tokens = input.split_whitespace();

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    let count = match tokens.next().and_then(|t| t.parse::<usize>().ok()) {
        Some(n) => n,
        None => return Ok(()),
    };
    for _ in 0..count {
        let Some(parsed) = parse_command(&mut tokens) else {
            break;
        };
        match parsed {
            Ok(Command::Insert { key, payload }) => match Key::new(key.as_bytes()) {
                Ok(key) => tree.insert(key, payload)?,
                Err(e) => warn!("insert skipped: {e}"),
            },
            Ok(Command::Find { key }) => match Key::new(key.as_bytes()) {
                Ok(key) => {
                    let payloads = tree.find_all(&key)?;
                    if payloads.is_empty() {
                        out.write_all(b"null\n")?;
                    } else {
                        for p in payloads {
                            write!(out, "{p} ")?;
                        }
                        out.write_all(b"\n")?;
                    }
                }
                // An over-long key can never have been stored.
                Err(_) => out.write_all(b"null\n")?,
            },
            Ok(Command::Delete { key, payload }) => match Key::new(key.as_bytes()) {
                Ok(key) => tree.remove(key, payload)?,
                Err(e) => warn!("delete skipped: {e}"),
            },
            Err(e) => warn!("{e}"),
        }
    }
    out.flush()?;
    tree.close()?;
    Ok(())
}
