// minfst-print: Print the terms of a transducer file that match a pattern.
//
// The file is queried in place: records are decoded from disk as the search
// walks them. Each printed term is checked against an exact lookup.
//
// Usage:
//   minfst-print [-i INPUT] [-p PATTERN]
//
// Options:
//   -i, --input PATH       Transducer file (default output.fst)
//   -p, --pattern PATTERN  Wildcard pattern: * any run, ? any symbol (default *)
//       --log-filter F     env_logger filter, e.g. "debug"
//   -h, --help             Print help

use std::io::{self, BufWriter, Write};
use std::time::Instant;

use log::info;
use minfst::{FileStorage, FstError, PersistentFst, WildcardMatcher};
use minfst_cli::{SEPARATOR, Value, fatal};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if minfst_cli::wants_help(&args) {
        println!("minfst-print: Print the terms of a transducer that match a pattern.");
        println!();
        println!("Usage: minfst-print [-i INPUT] [-p PATTERN]");
        println!();
        println!("Options:");
        println!("  -i, --input PATH       Transducer file (default output.fst)");
        println!("  -p, --pattern PATTERN  Wildcard pattern: * any run, ? any symbol (default *)");
        println!("      --log-filter F     env_logger filter, e.g. \"debug\"");
        println!("  -h, --help             Print this help");
        return;
    }

    let parse = |args: &[String], long: &str, short: &str| {
        minfst_cli::parse_option(args, long, short).unwrap_or_else(|e| fatal(&e))
    };
    let (input, args) = parse(&args, "--input", "-i");
    let (pattern, args) = parse(&args, "--pattern", "-p");
    let (log_filter, args) = parse(&args, "--log-filter", "--log-filter");
    minfst_cli::reject_unknown(&args).unwrap_or_else(|e| fatal(&e));

    minfst_cli::init_logging(log_filter.as_deref());

    let input = input.unwrap_or_else(|| minfst_cli::DEFAULT_OUTPUT.to_string());
    let pattern = pattern.unwrap_or_else(|| "*".to_string());

    let timer = Instant::now();
    let fst = FileStorage::open(&input)
        .map_err(FstError::from)
        .and_then(PersistentFst::<Value, _>::open)
        .unwrap_or_else(|e| fatal(&format!("{input}: {e}")));
    info!(
        "event=fst_read path={} format={:?} elapsed={:?}",
        input,
        fst.format(),
        timer.elapsed()
    );

    let timer = Instant::now();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let terms = print_matches(&fst, &pattern, &mut out).unwrap_or_else(|e| fatal(&e.to_string()));
    if let Err(e) = out.flush() {
        fatal(&format!("failed to write output: {e}"));
    }
    info!("event=terms_printed terms={} elapsed={:?}", terms, timer.elapsed());
}

fn print_matches(
    fst: &PersistentFst<Value, FileStorage>,
    pattern: &str,
    out: &mut impl Write,
) -> Result<usize, FstError> {
    let matcher = WildcardMatcher::new(pattern, fst.header().key_length_limit());
    let mut terms = 0;
    for hit in fst.search(matcher) {
        let (term, value) = hit?;
        if fst.try_match(&term)? != Some(value) {
            return Err(FstError::Corrupt(format!(
                "search and lookup disagree on {term:?}"
            )));
        }
        writeln!(out, "{term}{SEPARATOR}{value}")?;
        terms += 1;
    }
    Ok(terms)
}
