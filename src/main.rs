use clap::{Arg, Command};
use minipas::runner;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();

    let matches = Command::new("minipas")
        .about("Interpreter for a small Pascal-like language")
        .arg(
            Arg::new("file")
                .help("The program to run; reads standard input when omitted or '-'")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Parse and type-check the program without running it")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let check_only = matches.get_flag("check");
    let ok = match matches.get_one::<String>("file").map(String::as_str) {
        Some(path) if path != "-" => run_file(path, check_only),
        _ => run_stdin(check_only),
    };

    if !ok {
        process::exit(1);
    }
}

fn run_file(path: &str, check_only: bool) -> bool {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        process::exit(1);
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let name = path.to_string_lossy();
            runner::run(&source, Some(&*name), check_only)
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_stdin(check_only: bool) -> bool {
    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        eprintln!("Error reading standard input: {}", e);
        process::exit(1);
    }
    runner::run(&source, None, check_only)
}
