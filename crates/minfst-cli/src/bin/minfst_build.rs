// minfst-build: Build a transducer from a term list.
//
// Reads `term->value` lines, sorts them by term, builds a minimal transducer,
// checks that every term maps back to its value and writes the result.
//
// Usage:
//   minfst-build -i INPUT [-o OUTPUT] [-f FORMAT] [--persistent] [--cache-size N]
//
// Options:
//   -i, --input PATH       Input file (UTF-8, one term->value per line)
//   -o, --output PATH      Output file (default output.fst)
//   -f, --format NAME      Default, Compressed or Dot (default Default)
//       --persistent       Stream states straight into the output file
//       --cache-size N     Bound the frozen-state cache to N entries
//       --log-filter F     env_logger filter, e.g. "debug"
//   -h, --help             Print help

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use log::info;
use minfst::builder::FstBuilder;
use minfst::{BuilderConfig, FileStorage, FstError, PersistentFst, Storage};
use minfst_cli::{OutputFormat, Value, fatal};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if minfst_cli::wants_help(&args) {
        println!("minfst-build: Build a minimal transducer from a term list.");
        println!();
        println!("Usage: minfst-build -i INPUT [-o OUTPUT] [-f FORMAT] [--persistent] [--cache-size N]");
        println!();
        println!("Options:");
        println!("  -i, --input PATH       Input file (UTF-8, one term->value per line)");
        println!("  -o, --output PATH      Output file (default output.fst)");
        println!("  -f, --format NAME      Default, Compressed or Dot (default Default)");
        println!("      --persistent       Stream states straight into the output file");
        println!("      --cache-size N     Bound the frozen-state cache to N entries");
        println!("      --log-filter F     env_logger filter, e.g. \"debug\"");
        println!("  -h, --help             Print this help");
        return;
    }

    let parse = |args: &[String], long: &str, short: &str| {
        minfst_cli::parse_option(args, long, short).unwrap_or_else(|e| fatal(&e))
    };
    let (input, args) = parse(&args, "--input", "-i");
    let (output, args) = parse(&args, "--output", "-o");
    let (format, args) = parse(&args, "--format", "-f");
    let (cache_size, args) = parse(&args, "--cache-size", "--cache-size");
    let (log_filter, args) = parse(&args, "--log-filter", "--log-filter");
    let (persistent, args) = minfst_cli::take_flag(&args, "--persistent");
    minfst_cli::reject_unknown(&args).unwrap_or_else(|e| fatal(&e));

    minfst_cli::init_logging(log_filter.as_deref());

    let input = input.unwrap_or_else(|| fatal("--input is required"));
    let output = output.unwrap_or_else(|| minfst_cli::DEFAULT_OUTPUT.to_string());
    let format = format
        .map(|name| OutputFormat::parse(&name).unwrap_or_else(|e| fatal(&e)))
        .unwrap_or(OutputFormat::Fst(minfst::Format::Default));
    let mut config = BuilderConfig::default();
    if let Some(size) = cache_size {
        let size = size
            .parse::<usize>()
            .unwrap_or_else(|e| fatal(&format!("invalid --cache-size {size:?}: {e}")));
        config = config.with_cache_size(size);
    }

    let timer = Instant::now();
    let entries = minfst_cli::read_input(Path::new(&input)).unwrap_or_else(|e| fatal(&e));
    info!(
        "event=input_read terms={} elapsed={:?}",
        entries.len(),
        timer.elapsed()
    );

    let result = match format {
        OutputFormat::Fst(format) if persistent => {
            build_persistent(&entries, &output, config.with_format(format))
        }
        OutputFormat::Dot if persistent => fatal("--persistent cannot write Dot output"),
        _ => build_in_memory(&entries, &output, format, config),
    };
    result.unwrap_or_else(|e| fatal(&e.to_string()));

    let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
    info!(
        "event=output_written path={} bytes={} elapsed={:?}",
        output,
        size,
        timer.elapsed()
    );
}

fn build_in_memory(
    entries: &[(String, Value)],
    output: &str,
    format: OutputFormat,
    config: BuilderConfig,
) -> Result<(), FstError> {
    let timer = Instant::now();
    let mut builder = FstBuilder::memory_with_config(config);
    builder.extend_iter(entries.iter().map(|(k, v)| (k.as_str(), *v)))?;
    let fst = builder.finish()?;
    info!(
        "event=fst_constructed states={} elapsed={:?}",
        fst.state_count(),
        timer.elapsed()
    );

    let timer = Instant::now();
    verify(entries, |term| Ok(fst.try_match(term)))?;
    info!("event=fst_verified elapsed={:?}", timer.elapsed());

    match format {
        OutputFormat::Fst(format) => fst.write_to(FileStorage::create(output)?, format)?.close()?,
        OutputFormat::Dot => {
            let mut out = BufWriter::new(File::create(output)?);
            fst.write_dot(&mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn build_persistent(
    entries: &[(String, Value)],
    output: &str,
    config: BuilderConfig,
) -> Result<(), FstError> {
    let timer = Instant::now();
    let mut builder = FstBuilder::with_storage(FileStorage::create(output)?, config)?;
    builder.extend_iter(entries.iter().map(|(k, v)| (k.as_str(), *v)))?;
    builder.finish()?.close()?;
    info!("event=fst_constructed elapsed={:?}", timer.elapsed());

    let timer = Instant::now();
    let fst = PersistentFst::<Value, _>::open(FileStorage::open(output)?)?;
    verify(entries, |term| fst.try_match(term))?;
    info!("event=fst_verified elapsed={:?}", timer.elapsed());
    Ok(())
}

/// Every term must map back to its own value.
fn verify(
    entries: &[(String, Value)],
    lookup: impl Fn(&str) -> Result<Option<Value>, FstError>,
) -> Result<(), FstError> {
    for (term, value) in entries {
        let found = lookup(term)?;
        if found != Some(*value) {
            return Err(FstError::Corrupt(format!(
                "verification failed for {term:?}: expected {value}, found {found:?}"
            )));
        }
    }
    Ok(())
}
