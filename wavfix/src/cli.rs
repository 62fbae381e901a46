use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};
use wavfix_core::ChunkOrder;

/// Parse a timeout such as `90`, `45s`, `1m30s` or `500ms`.
///
/// A bare number is read as seconds. Units are `ms`, `s`, `m` and `h`; they
/// may be chained, largest first or not. The total must be non-zero.
pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let input = value.trim();
    if input.is_empty() {
        return Err("timeout cannot be empty".into());
    }
    if let Ok(seconds) = input.parse::<u64>() {
        return match seconds {
            0 => Err("timeout must be greater than zero".into()),
            s => Ok(Duration::from_secs(s)),
        };
    }

    let invalid = || format!("invalid timeout '{value}' (expected e.g. 90s, 2m, 1m30s)");
    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid());
        }
        let amount: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let (unit, step) = if let Some(tail) = rest.strip_prefix("ms") {
            (Duration::from_millis(amount), tail)
        } else if let Some(tail) = rest.strip_prefix('s') {
            (Duration::from_secs(amount), tail)
        } else if let Some(tail) = rest.strip_prefix('m') {
            (Duration::from_secs(amount.saturating_mul(60)), tail)
        } else if let Some(tail) = rest.strip_prefix('h') {
            (Duration::from_secs(amount.saturating_mul(3_600)), tail)
        } else {
            return Err(invalid());
        };
        total = total
            .checked_add(unit)
            .ok_or_else(|| "timeout is too large".to_owned())?;
        rest = step;
    }

    if total.is_zero() {
        return Err("timeout must be greater than zero".into());
    }
    Ok(total)
}

/// Expand directories to the `.wav` files they contain (not recursive).
///
/// The result is sorted and free of duplicates.
pub fn expand_inputs(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for input in inputs {
        if input.is_dir() {
            for entry in fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && is_wav(&path) {
                    files.insert(path);
                }
            }
        } else if input.is_file() {
            files.insert(input.clone());
        } else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("input does not exist: {}", input.display()),
            ));
        }
    }
    Ok(files.into_iter().collect())
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Repair WAV files for legacy broadcast importers")
        .long_about(
            "Transcodes each input to PCM, rewrites the format chunk to canonical PCM and \
             adds bext and cart records after the audio data.",
        )
        .version(env!("CARGO_PKG_VERSION"))
        .args_conflicts_with_subcommands(true)
        .subcommand_negates_reqs(true)
        .subcommand(
            Command::new("inspect")
                .about("Print the chunk layout and metadata records of a WAV file")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .arg(
            Arg::new("in-place")
                .long("in-place")
                .help("Replace the original files instead of writing copies")
                .action(ArgAction::SetTrue)
                .conflicts_with("output"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Write copies under OUTPUT_DIR/<folder>/<file> instead of a 'fixed' subfolder")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .help("Number of files processed in parallel [default: CPU count]")
                .value_parser(value_parser!(NonZeroUsize)),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Replace existing copies instead of skipping them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("List what would be written without touching any file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("DURATION")
                .help("Abort a transcode that runs longer than this (e.g. 90s, 5m)")
                .value_parser(ValueParser::new(parse_timeout)),
        )
        .arg(
            Arg::new("chunk-order")
                .long("chunk-order")
                .value_name("ORDER")
                .help("Place metadata after ('audio-first') or before ('metadata-first') the audio")
                .default_value("audio-first")
                .value_parser(value_parser!(ChunkOrder)),
        )
        .arg(
            Arg::new("bit-depth")
                .long("bit-depth")
                .value_name("BITS")
                .help("PCM sample width requested from the transcoder")
                .default_value("24")
                .value_parser(["16", "24", "32"]),
        )
        .arg(
            Arg::new("ffmpeg")
                .long("ffmpeg")
                .value_name("PATH")
                .help("Transcoder program")
                .default_value("ffmpeg")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("ffprobe")
                .long("ffprobe")
                .value_name("PATH")
                .help("Metadata prober program")
                .default_value("ffprobe")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("genre")
                .long("genre")
                .value_name("GENRE")
                .help("Genre used when a file has none")
                .default_value(wavfix_core::metadata::DEFAULT_GENRE),
        )
        .arg(
            Arg::new("inputs")
                .value_name("INPUT")
                .help("WAV files, or folders whose .wav files are processed")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
}
