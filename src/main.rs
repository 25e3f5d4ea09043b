mod db;
mod import;
mod ipc;

use std::io::{self, BufRead, Write};

fn main() {
    let workspace = match std::env::args().nth(1) {
        Some(v) => std::path::PathBuf::from(v),
        None => {
            eprintln!("usage: recuperod <workspace-dir>");
            std::process::exit(2);
        }
    };
    let conn = match db::open_db(&workspace) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("recuperod: failed to open workspace database: {}", e);
            std::process::exit(1);
        }
    };
    let mut state = ipc::AppState { conn };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id; report the parse failure as-is.
                let _ = writeln!(
                    stdout,
                    "{{\"status\":400,\"body\":{{\"error\":\"bad request json: {}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"status\":500}".to_string())
        );
        let _ = stdout.flush();
    }
}
