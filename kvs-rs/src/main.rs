use std::io::Read;

use kvs::{NullOptions, RunContext, StdoutWindow};

/// Script runner: executes the given file (or stdin) and prints the
/// script's return value, if any.
fn main() {
    let ver = env!("CARGO_PKG_VERSION");
    let mut args = std::env::args().skip(1);

    let src = match args.next().as_deref() {
        Some("-h") | Some("--help") => {
            println!("kvs {ver} — KVS script runner");
            println!("Usage: kvs [<file.kvs>]   (reads stdin when no file is given)");
            return;
        }
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("kvs: cannot read {path}: {e}");
                std::process::exit(1);
            }
        },
        None => {
            let mut s = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut s) {
                eprintln!("kvs: cannot read stdin: {e}");
                std::process::exit(1);
            }
            s
        }
    };

    let mut ctx = RunContext::new(Box::new(StdoutWindow), Box::new(NullOptions));
    match ctx.run(&src) {
        Ok(ret) => {
            let text = ret.as_string();
            if !text.is_empty() {
                println!("{text}");
            }
        }
        Err(e) => {
            eprintln!("kvs: {e}");
            std::process::exit(1);
        }
    }
}
