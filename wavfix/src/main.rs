mod cli;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use wavfix_core::{
    inspect, plan, run_batch, BatchReporter, CancelToken, ChunkOrder, Config, FileReport, Pipeline,
    PlannedAction, Stage,
};

use crate::cli::{build_cli, expand_inputs};

/// Drives the progress bar from batch events.
struct BarReporter {
    bar: ProgressBar,
}

impl BatchReporter for BarReporter {
    fn batch_started(&mut self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn stage_started(&mut self, input: &Path, stage: Stage) {
        self.bar.set_message(format!("{stage} {}", file_label(input)));
    }

    fn file_finished(&mut self, report: &FileReport) {
        if let Some(failure) = report.failure() {
            log::warn!("{}: {failure}", report.input.display());
        }
        self.bar.inc(1);
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Spawn `program -version` to make sure the tool is installed.
fn check_tool(program: &Path) -> anyhow::Result<()> {
    let status = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("cannot run '{}'; is it installed?", program.display()))?;
    if !status.success() {
        return Err(anyhow!(
            "'{} -version' exited with {status}",
            program.display()
        ));
    }
    debug!("found {}", program.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    if let Some(("inspect", sub)) = matches.subcommand() {
        let file = sub.get_one::<PathBuf>("file").expect("required argument");
        let report =
            inspect(file).with_context(|| format!("failed to inspect '{}'", file.display()))?;
        print!("{report}");
        return Ok(());
    }

    let raw_inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("inputs")
        .expect("required argument")
        .cloned()
        .collect();
    let inputs = expand_inputs(&raw_inputs)?;

    let ffmpeg = matches
        .get_one::<PathBuf>("ffmpeg")
        .expect("defaulted argument");
    let ffprobe = matches
        .get_one::<PathBuf>("ffprobe")
        .expect("defaulted argument");
    let bit_depth: u16 = matches
        .get_one::<String>("bit-depth")
        .expect("defaulted argument")
        .parse()
        .context("invalid bit depth")?;

    let mut builder = Config::builder()
        .in_place(matches.get_flag("in-place"))
        .overwrite(matches.get_flag("overwrite"))
        .chunk_order(
            *matches
                .get_one::<ChunkOrder>("chunk-order")
                .expect("defaulted argument"),
        )
        .bit_depth(bit_depth)
        .ffmpeg(ffmpeg)
        .ffprobe(ffprobe)
        .default_genre(
            matches
                .get_one::<String>("genre")
                .expect("defaulted argument"),
        );
    if let Some(root) = matches.get_one::<PathBuf>("output") {
        builder = builder.output_root(root);
    }
    if let Some(&jobs) = matches.get_one::<NonZeroUsize>("jobs") {
        builder = builder.jobs(jobs);
    }
    if let Some(&timeout) = matches.get_one::<Duration>("timeout") {
        builder = builder.transcode_timeout(timeout);
    }
    let config = builder
        .build()
        .context("failed to create configuration")?;

    if matches.get_flag("dry-run") {
        let planned = plan(&config, &inputs).context("failed to plan the run")?;
        if planned.is_empty() {
            println!("Dry run: no WAV files found.");
        } else {
            println!("Dry run: would process {} file(s):", planned.len());
            for file in planned {
                let action = match file.action {
                    PlannedAction::Create => "create",
                    PlannedAction::Replace => "replace",
                    PlannedAction::Skip => "skip",
                };
                println!("  {action:<7} {}", file.destination.display());
            }
        }
        return Ok(());
    }

    if inputs.is_empty() {
        println!("No WAV files found.");
        return Ok(());
    }

    check_tool(&config.ffmpeg)?;
    check_tool(&config.ffprobe)?;

    let pipeline = Pipeline::new(config);

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.enable_steady_tick(Duration::from_millis(100));

    let mut reporter = BarReporter {
        bar: progress.clone(),
    };
    let result = run_batch(&pipeline, &inputs, &CancelToken::new(), &mut reporter);
    progress.finish_and_clear();
    let summary = result.context("failed to start the worker pool")?;

    println!(
        "{} fixed, {} skipped, {} failed",
        summary.fixed(),
        summary.skipped(),
        summary.failed()
    );
    for (input, failure) in summary.failures() {
        println!("  {}: {failure}", input.display());
    }

    if !summary.is_success() {
        return Err(anyhow!("{} file(s) could not be fixed", summary.failed()));
    }
    Ok(())
}
