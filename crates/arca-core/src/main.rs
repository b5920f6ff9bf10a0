use std::path::PathBuf;

use arca_core::chat::{run_chat, run_models, ChatArgs};
use arca_core::config::Config;
use arca_core::render::DiffView;

fn print_help() {
    println!("arca - streaming assistant for character card edits");
    println!();
    println!("Usage:");
    println!("  arca chat <instruction> [--card <file>] [--write]");
    println!("      Stream one reply. With --card the model may propose edits,");
    println!("      which are shown as diffs and, with --write, saved to the file.");
    println!("  arca models");
    println!("      List the models offered by the configured endpoint.");
    println!("  arca diff <old-file> <new-file> [--split]");
    println!("      Show a folded line diff of two files.");
    println!();
    println!("Options:");
    println!("  --version         Print version");
    println!("  --help            Print this help");
    println!();
    println!("Configuration is read from $XDG_CONFIG_HOME/arca/config.toml.");
    println!("Set RUST_LOG=arca_backend=debug,arca_core=debug for diagnostics.");
}

fn parse_chat_args(args: &[String]) -> Result<ChatArgs, String> {
    let mut chat = ChatArgs::default();
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--card" => {
                let path = iter.next().ok_or("--card needs a file")?;
                chat.card = Some(PathBuf::from(path));
            }
            "--write" => chat.write = true,
            other => words.push(other.to_string()),
        }
    }
    chat.instruction = words.join(" ");
    if chat.instruction.trim().is_empty() {
        return Err("chat needs an instruction".to_string());
    }
    if chat.write && chat.card.is_none() {
        return Err("--write needs --card".to_string());
    }
    Ok(chat)
}

fn run_diff(config: &Config, args: &[String]) -> i32 {
    let split = args.iter().any(|a| a == "--split");
    let files: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let [old, new] = files.as_slice() else {
        eprintln!("[arca:diff] error: diff needs <old-file> <new-file>");
        return 2;
    };

    let read = |path: &str| {
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))
    };
    let (before, after) = match (read(old.as_str()), read(new.as_str())) {
        (Ok(before), Ok(after)) => (before, after),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("[arca:diff] error: {e}");
            return 1;
        }
    };

    let view = DiffView::build(&before, &after, &config.diff.options());
    if split {
        print!("{}", view.format_split(60));
    } else {
        print!("{}", view.format_unified());
    }
    if view.script.has_changes() {
        1
    } else {
        0
    }
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("[arca] error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("arca {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = Config::load_or_default();

    let code = match args[0].as_str() {
        "diff" => run_diff(&config, &args[1..]),
        "chat" => {
            let chat = match parse_chat_args(&args[1..]) {
                Ok(chat) => chat,
                Err(e) => {
                    eprintln!("[arca:chat] error: {e}");
                    std::process::exit(2);
                }
            };
            runtime().block_on(run_chat(&config, &chat))
        }
        "models" => runtime().block_on(run_models(&config)),
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!("hint: run arca --help");
            2
        }
    };
    std::process::exit(code);
}
