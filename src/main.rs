extern crate yaradec;

use std::{fs::OpenOptions, path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use yaradec::parse_file;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Compiled rules file produced by yarac.
    target: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Default::default(), help="Output format")]
    format: OutputFormat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Default)]
enum OutputFormat {
    #[cfg(feature = "json")]
    JSON,

    #[default]
    TEXT,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // help and version go to stdout and exit clean; anything
            // else is a usage error
            let code = if err.use_stderr() { 1u8 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let f = match OpenOptions::new().read(true).open(&args.target) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("{}: {err}", args.target.display());
            return ExitCode::from(2);
        }
    };

    let rules = match parse_file(f).and_then(|image| image.decode_rules()) {
        Ok(rules) => rules,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match args.format {
        #[cfg(feature = "json")]
        OutputFormat::JSON => match serde_json::to_string_pretty(&rules) {
            Ok(jstr) => println!("{jstr}"),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::from(2);
            }
        },

        OutputFormat::TEXT => {
            for rule in &rules {
                println!("{rule}\n");
            }
        }
    }

    ExitCode::SUCCESS
}
