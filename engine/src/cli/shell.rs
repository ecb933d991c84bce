use anyhow::Result;
use rustyline::{error::ReadlineError, DefaultEditor};

use crate::db::Db;
use crate::io::file::FileIo;

const HELP: &str = "\
commands:
  append <key> <type> <text>   append a record
  get <key>                    read a record's payload
  del <key>                    mark a record deleted
  status <index> <value>       set the user status byte
  entry <index>                show an index entry
  find <key>                   exact key lookup
  locate <key>                 first key >= <key>
  scan                         list all index entries
  stats                        engine counters
  help                         this text
  exit";

/// Interactive inspector over an opened database.
pub fn run_shell<L: FileIo, I: FileIo>(mut db: Db<L, I>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("logkv shell, {} entries. Type 'help' for commands.", db.index_count());
    loop {
        match rl.readline("logkv> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                if line == "exit" || line == "quit" {
                    break;
                }
                if let Err(e) = dispatch(&mut db, line) {
                    println!("error: {e}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("error: {err:?}");
                break;
            }
        }
    }
    db.close()?;
    Ok(())
}

fn dispatch<L: FileIo, I: FileIo>(db: &mut Db<L, I>, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    match cmd {
        "help" => println!("{HELP}"),
        "append" => {
            let key: u32 = parse(parts.next())?;
            let record_type: u8 = parse(parts.next())?;
            let rest = line
                .splitn(4, char::is_whitespace)
                .nth(3)
                .unwrap_or_default();
            db.append(key, record_type, rest.as_bytes())?;
            println!("ok");
        }
        "get" => {
            let key: u32 = parse(parts.next())?;
            let mut buf = vec![0u8; u16::MAX as usize];
            let n = db.get(key, &mut buf)?;
            println!("{} bytes: {}", n, String::from_utf8_lossy(&buf[..n]));
        }
        "del" => {
            let key: u32 = parse(parts.next())?;
            db.delete_record(key)?;
            println!("ok");
        }
        "status" => {
            let index: u32 = parse(parts.next())?;
            let value: u8 = parse(parts.next())?;
            db.update_status(index, value)?;
            println!("ok");
        }
        "entry" => {
            let index: u32 = parse(parts.next())?;
            let e = db.get_index_entry(index)?;
            println!(
                "key={} offset={} status={:#04x} internal={:#04x}",
                e.key, e.offset, e.status, e.internal_status
            );
        }
        "find" => {
            let key: u32 = parse(parts.next())?;
            match db.find_key(key)? {
                Some(pos) => println!("index {pos}"),
                None => println!("not found"),
            }
        }
        "locate" => {
            let key: u32 = parse(parts.next())?;
            match db.locate_key(key)? {
                Some(pos) => {
                    let e = db.get_index_entry(pos)?;
                    println!("index {pos} (key {})", e.key);
                }
                None => println!("no key at or above"),
            }
        }
        "scan" => {
            for i in 0..db.index_count() {
                let e = db.get_index_entry(i)?;
                let mark = if e.is_deleted() { " [deleted]" } else { "" };
                println!("{i:>6}  key={} offset={} status={:#04x}{mark}", e.key, e.offset, e.status);
            }
        }
        "stats" => println!("{}", db.stats()?),
        other => println!("unknown command '{other}', try 'help'"),
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(arg: Option<&str>) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let arg = arg.ok_or_else(|| anyhow::anyhow!("missing argument"))?;
    Ok(arg.parse()?)
}
