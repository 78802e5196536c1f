use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;

use climate_summary::{analyze, write_report, Summary};

fn main() -> ExitCode {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| String::from("climate-summary"));
    let files: Vec<String> = args.collect();

    if files.is_empty() {
        println!("Usage: {program} tdv_file1 tdv_file2 ... tdv_fileN");
        return ExitCode::FAILURE;
    }

    // One summary shared by every file, statistics aggregate across all of
    // them
    let mut summary = Summary::new();

    for path in &files {
        println!("Opening file: {path}");
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Error opening file {path}: {e}");
                continue;
            }
        };
        if let Err(e) = analyze(BufReader::new(file), &mut summary) {
            eprintln!("Error reading {path}: {e}");
        }
    }

    if let Err(e) = write_report(&summary, &mut io::stdout().lock()) {
        eprintln!("Error writing report: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
