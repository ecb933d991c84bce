use std::process;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use logkv::cli::shell::run_shell;
use logkv::db::Db;
use logkv::io::file::StdFileIo;

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 4 || args.get(1).map(|a| a == "-h" || a == "--help").unwrap_or(false) {
        eprintln!("Usage: {} [dir] [logfile] [indexfile]", args[0]);
        process::exit(1);
    }
    let dir = args.get(1).map(String::as_str).unwrap_or(".");
    let log_name = args.get(2).map(String::as_str).unwrap_or("data.log");
    let index_name = args.get(3).map(String::as_str).unwrap_or("data.idx");

    let db = Db::open(StdFileIo::new(dir), StdFileIo::new(dir), log_name, index_name)?;
    run_shell(db)
}
