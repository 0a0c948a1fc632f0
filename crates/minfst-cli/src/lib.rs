// minfst-cli: shared utilities for the command-line tools.

use std::io::Write;
use std::path::Path;
use std::process;

use env_logger::Env;
use minfst::Format;

/// Output type of transducers built and read by the tools.
pub type Value = i64;

/// Separator between term and value in input lines and printed output.
pub const SEPARATOR: &str = "->";

pub const DEFAULT_OUTPUT: &str = "output.fst";

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable with extra log filters, applied after `RUST_LOG`.
pub const LOG_ENV: &str = "MINFST_LOG";

/// What `minfst-build` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Fst(Format),
    Dot,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Ok(OutputFormat::Fst(Format::Default)),
            "compressed" => Ok(OutputFormat::Fst(Format::Compressed)),
            "dot" => Ok(OutputFormat::Dot),
            _ => Err(format!(
                "unknown format {name:?} (expected Default, Compressed or Dot)"
            )),
        }
    }
}

/// Initialise `env_logger`: `RUST_LOG` (default `info`), then `MINFST_LOG`,
/// then the `--log-filter` value.
pub fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Ok(filter) = std::env::var(LOG_ENV) {
        builder.parse_filters(&filter);
    }
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format(|buf, record| writeln!(buf, "[{:<5}] {}", record.level(), record.args()));
    let _ = builder.try_init();
}

/// Take the value of `--long=VALUE`, `--long VALUE` or `-s VALUE` out of
/// `args`. The last occurrence wins.
///
/// Returns `(value, remaining_args)`.
pub fn parse_option(
    args: &[String],
    long: &str,
    short: &str,
) -> Result<(Option<String>, Vec<String>), String> {
    let mut value = None;
    let mut remaining = Vec::new();
    let prefix = format!("{long}=");
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if let Some(val) = arg.strip_prefix(&prefix) {
            value = Some(val.to_string());
        } else if arg == long || arg == short {
            match iter.next() {
                Some(val) => value = Some(val.clone()),
                None => return Err(format!("{arg} requires a value")),
            }
        } else {
            remaining.push(arg.clone());
        }
    }

    Ok((value, remaining))
}

/// Remove every occurrence of `flag` from `args`.
///
/// Returns `(present, remaining_args)`.
pub fn take_flag(args: &[String], flag: &str) -> (bool, Vec<String>) {
    let remaining: Vec<String> = args.iter().filter(|a| *a != flag).cloned().collect();
    (remaining.len() != args.len(), remaining)
}

/// Fail on arguments no option consumed.
pub fn reject_unknown(args: &[String]) -> Result<(), String> {
    match args.first() {
        Some(arg) => Err(format!("unexpected argument {arg:?}")),
        None => Ok(()),
    }
}

/// Parse one `term->value` line. The value follows the last separator, so
/// terms may contain the separator themselves.
pub fn parse_line(line: &str) -> Result<(String, Value), String> {
    let (term, value) = line
        .rsplit_once(SEPARATOR)
        .ok_or_else(|| format!("missing {SEPARATOR:?} separator"))?;
    let value = value
        .trim()
        .parse::<Value>()
        .map_err(|e| format!("invalid value {value:?}: {e}"))?;
    Ok((term.to_string(), value))
}

/// Read `term->value` lines (UTF-8) and sort them by term in ordinal order.
/// Empty lines are skipped.
pub fn read_input(path: &Path) -> Result<Vec<(String, Value)>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut entries = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            parse_line(line).map_err(|e| format!("{}:{}: {}", path.display(), i + 1, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Print an error message and exit with code 1.
pub fn fatal(msg: &str) -> ! {
    eprintln!("error: {msg}");
    process::exit(1);
}

/// Check if `--help` or `-h` is in the args.
pub fn wants_help(args: &[String]) -> bool {
    args.iter().any(|a| a == "--help" || a == "-h")
}
