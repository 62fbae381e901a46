#[path = "common/mod.rs"]
mod common;

use std::error::Error;
use std::fs;
use std::path::Path;

use common::*;
use tempfile::tempdir;
use wavfix_core::transcode::BitDepth;
use wavfix_core::{
    CancelToken, ChunkOrder, Config, ErrorKind, FallbackProber, FileFailure, FileOutcome,
    Pipeline, Stage, SubFormat,
};

type Tags = Option<Vec<(&'static str, &'static str)>>;

fn pipeline(config: Config, transcoded: Vec<u8>, tags: Tags) -> Pipeline {
    Pipeline::with_tools(
        config,
        Box::new(StubProber(tags)),
        Box::new(StubTranscoder::new(transcoded)),
    )
}

fn run_one(pipeline: &Pipeline, input: &Path) -> Result<FileOutcome, FileFailure> {
    pipeline.process(input, &CancelToken::new(), &mut |_| {})
}

fn fixed(outcome: FileOutcome) -> (std::path::PathBuf, wavfix_core::RewriteReport) {
    match outcome {
        FileOutcome::Fixed {
            destination,
            report,
        } => (destination, report),
        other => panic!("expected a fixed file, got {other:?}"),
    }
}

fn pcm_container(audio: &[u8]) -> Vec<u8> {
    let fmt = pcm_fmt(1, 8_000, 16);
    riff(&[(b"fmt ", &fmt[..]), (b"data", audio)])
}

#[test]
fn extensible_pcm_with_unicode_title_becomes_canonical() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("song.wav");
    write_test_tone(&input, 800)?;
    let original = fs::read(&input)?;

    let audio = tone(800);
    let fmt = extensible_fmt(1, 8_000, 16, SubFormat::PCM);
    assert_eq!(fmt.len(), 40);
    let transcoded = riff(&[(b"fmt ", &fmt[..]), (b"data", &audio[..])]);
    let pipeline = pipeline(
        Config::builder().build()?,
        transcoded,
        Some(vec![("title", "测试"), ("track", "1")]),
    );

    let (destination, report) = fixed(run_one(&pipeline, &input)?);
    assert_eq!(destination, dir.path().join("fixed").join("song.wav"));
    assert!(report.coerced);

    let bytes = fs::read(&destination)?;
    assert_eq!(chunk_ids(&bytes), ["fmt ", "data", "bext", "cart"]);
    let fmt_out = payload(&bytes, b"fmt ").unwrap();
    assert_eq!(fmt_out.len(), 16);
    assert_eq!(&fmt_out[0..2], &[1, 0]);
    assert_eq!(payload(&bytes, b"data").unwrap(), &audio[..]);

    let bext = payload(&bytes, b"bext").unwrap();
    let cart = payload(&bytes, b"cart").unwrap();
    assert!(printable_or_nul(bext));
    assert!(printable_or_nul(cart));
    assert!(bext.starts_with(b"??\0"));
    assert!(cart[4..68].starts_with(b"??\0"));

    assert_eq!(fs::read(&input)?, original, "input must stay untouched");
    let leftovers: Vec<_> = fs::read_dir(dir.path().join("fixed"))?.collect();
    assert_eq!(leftovers.len(), 1, "only the committed file remains");
    Ok(())
}

#[test]
fn pcm_input_gains_metadata_after_audio() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("jingle.wav");
    write_test_tone(&input, 100)?;

    let audio = tone(401);
    let transcoded = pcm_container(&audio);
    let stub = StubTranscoder::new(transcoded);
    let jobs = stub.jobs.clone();
    let pipeline = Pipeline::with_tools(
        Config::builder().build()?,
        Box::new(StubProber(None)),
        Box::new(stub),
    );

    let (destination, report) = fixed(run_one(&pipeline, &input)?);
    assert!(!report.coerced);

    let bytes = fs::read(&destination)?;
    assert_eq!(chunk_ids(&bytes), ["fmt ", "data", "bext", "cart"]);
    assert_eq!(payload(&bytes, b"fmt ").unwrap(), &pcm_fmt(1, 8_000, 16)[..]);
    assert_eq!(payload(&bytes, b"data").unwrap(), &audio[..]);

    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let summed: usize = 4 + chunks(&bytes)
        .iter()
        .map(|(_, payload)| 8 + payload.len() + payload.len() % 2)
        .sum::<usize>();
    assert_eq!(declared as usize, summed);
    assert_eq!(declared as usize, bytes.len() - 8);

    // Probe failure falls back to the file stem and default artist.
    let cart = payload(&bytes, b"cart").unwrap();
    assert!(cart[4..68].starts_with(b"jingle\0"));
    assert!(cart[68..132].starts_with(b"Unknown Artist\0"));

    let jobs = jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].bit_depth, BitDepth::TwentyFour);
    assert!(jobs[0]
        .tags
        .contains(&("title".to_owned(), "jingle".to_owned())));
    Ok(())
}

#[test]
fn truncated_container_leaves_no_output() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("short.wav");
    write_test_tone(&input, 100)?;

    let mut transcoded = pcm_container(&tone(400));
    transcoded.truncate(transcoded.len() - 100);
    let pipeline = pipeline(Config::builder().build()?, transcoded, None);

    let failure = run_one(&pipeline, &input).unwrap_err();
    assert_eq!(failure.stage, Stage::Rewriting);
    assert_eq!(failure.kind(), ErrorKind::TruncatedContainer);

    assert!(
        !dir.path().join("fixed").exists(),
        "a failed file leaves no output folder behind"
    );
    Ok(())
}

#[test]
fn float_subformat_is_rejected_without_output() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("float.wav");
    write_test_tone(&input, 100)?;

    let fmt = extensible_fmt(2, 48_000, 32, SubFormat::IEEE_FLOAT);
    let audio = vec![0u8; 64];
    let transcoded = riff(&[(b"fmt ", &fmt[..]), (b"data", &audio[..])]);
    let pipeline = pipeline(Config::builder().build()?, transcoded, None);

    let failure = run_one(&pipeline, &input).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::UnsupportedSubformat);
    assert!(!dir.path().join("fixed").exists());
    Ok(())
}

#[test]
fn large_audio_is_copied_in_bounded_blocks() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("long.wav");
    write_test_tone(&input, 100)?;

    let audio = tone(128 * 1024);
    let config = Config::builder()
        .materialize_threshold(4096)
        .block_size(4096)
        .build()?;
    let pipeline = pipeline(config, pcm_container(&audio), None);

    let (destination, report) = fixed(run_one(&pipeline, &input)?);
    assert_eq!(report.stats.peak_block, 4096);
    let bytes = fs::read(&destination)?;
    assert_eq!(payload(&bytes, b"data").unwrap(), &audio[..]);
    Ok(())
}

#[test]
fn rerunning_on_output_keeps_format_chunk() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("again.wav");
    write_test_tone(&input, 100)?;

    let fmt = extensible_fmt(1, 8_000, 16, SubFormat::PCM);
    let audio = tone(300);
    let first = pipeline(
        Config::builder().build()?,
        riff(&[(b"fmt ", &fmt[..]), (b"data", &audio[..])]),
        None,
    );
    let (destination, _) = fixed(run_one(&first, &input)?);
    let once = fs::read(&destination)?;

    let second = pipeline(
        Config::builder().overwrite(true).build()?,
        once.clone(),
        None,
    );
    let (destination, report) = fixed(run_one(&second, &input)?);
    let twice = fs::read(&destination)?;

    assert!(!report.coerced);
    assert_eq!(payload(&once, b"fmt "), payload(&twice, b"fmt "));
    assert_eq!(chunk_ids(&twice), ["fmt ", "data", "bext", "cart"]);
    Ok(())
}

#[test]
fn metadata_first_order_is_available() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("legacy.wav");
    write_test_tone(&input, 100)?;

    let config = Config::builder()
        .chunk_order(ChunkOrder::MetadataFirst)
        .build()?;
    let pipeline = pipeline(config, pcm_container(&tone(10)), None);
    let (destination, _) = fixed(run_one(&pipeline, &input)?);
    assert_eq!(
        chunk_ids(&fs::read(destination)?),
        ["fmt ", "bext", "cart", "data"]
    );
    Ok(())
}

#[test]
fn info_list_passes_through_last() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("tagged.wav");
    write_test_tone(&input, 100)?;

    let mut info = b"INFO".to_vec();
    let title = "测试\0".as_bytes();
    info.extend_from_slice(b"INAM");
    info.extend_from_slice(&(title.len() as u32).to_le_bytes());
    info.extend_from_slice(title);
    if title.len() % 2 == 1 {
        info.push(0);
    }
    let fmt = pcm_fmt(1, 8_000, 16);
    let audio = tone(10);
    let transcoded = riff(&[
        (b"LIST", &info[..]),
        (b"fmt ", &fmt[..]),
        (b"junk", &[0u8; 3][..]),
        (b"data", &audio[..]),
    ]);
    let pipeline = pipeline(Config::builder().build()?, transcoded, None);

    let (destination, report) = fixed(run_one(&pipeline, &input)?);
    let bytes = fs::read(destination)?;
    assert_eq!(chunk_ids(&bytes), ["fmt ", "data", "bext", "cart", "LIST"]);
    assert_eq!(payload(&bytes, b"LIST").unwrap(), &info[..]);
    assert_eq!(report.dropped.len(), 1);
    Ok(())
}

#[test]
fn existing_destination_is_skipped_unless_overwriting() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("done.wav");
    write_test_tone(&input, 100)?;
    let out_dir = dir.path().join("fixed");
    fs::create_dir(&out_dir)?;
    fs::write(out_dir.join("done.wav"), b"previous run")?;

    let stub = StubTranscoder::new(pcm_container(&tone(10)));
    let jobs = stub.jobs.clone();
    let skipping = Pipeline::with_tools(
        Config::builder().build()?,
        Box::new(StubProber(None)),
        Box::new(stub),
    );
    let outcome = run_one(&skipping, &input)?;
    assert_eq!(
        outcome,
        FileOutcome::Skipped {
            destination: out_dir.join("done.wav")
        }
    );
    assert_eq!(fs::read(out_dir.join("done.wav"))?, b"previous run");
    assert!(jobs.lock().unwrap().is_empty(), "skipped files are not transcoded");

    let overwriting = pipeline(
        Config::builder().overwrite(true).build()?,
        pcm_container(&tone(10)),
        None,
    );
    fixed(run_one(&overwriting, &input)?);
    assert!(fs::read(out_dir.join("done.wav"))?.starts_with(b"RIFF"));
    Ok(())
}

#[test]
fn in_place_mode_replaces_the_input() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("inplace.wav");
    write_test_tone(&input, 100)?;

    let pipeline = pipeline(
        Config::builder().in_place(true).build()?,
        pcm_container(&tone(50)),
        None,
    );
    let (destination, _) = fixed(run_one(&pipeline, &input)?);
    assert_eq!(destination, input);
    assert_eq!(
        chunk_ids(&fs::read(&input)?),
        ["fmt ", "data", "bext", "cart"]
    );
    assert_eq!(fs::read_dir(dir.path())?.count(), 1, "no temporary files remain");
    Ok(())
}

#[test]
fn output_root_mirrors_parent_folder() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let show = dir.path().join("show");
    fs::create_dir(&show)?;
    let input = show.join("ep1.wav");
    write_test_tone(&input, 100)?;
    let out_root = dir.path().join("out");

    let pipeline = pipeline(
        Config::builder().output_root(&out_root).build()?,
        pcm_container(&tone(10)),
        None,
    );
    let (destination, _) = fixed(run_one(&pipeline, &input)?);
    assert_eq!(destination, out_root.join("show").join("ep1.wav"));
    assert!(destination.exists());
    Ok(())
}

#[test]
fn stages_run_in_order() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("order.wav");
    write_test_tone(&input, 100)?;
    let pipeline = pipeline(Config::builder().build()?, pcm_container(&tone(10)), None);

    let mut seen = Vec::new();
    pipeline.process(&input, &CancelToken::new(), &mut |stage| seen.push(stage))?;
    assert_eq!(
        seen,
        [
            Stage::Probing,
            Stage::Transcoding,
            Stage::Rewriting,
            Stage::Committing,
            Stage::Done
        ]
    );
    Ok(())
}

#[test]
fn cancellation_is_honored_between_steps() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("cancel.wav");
    write_test_tone(&input, 100)?;
    let pipeline = pipeline(Config::builder().build()?, pcm_container(&tone(10)), None);

    let token = CancelToken::new();
    token.cancel();
    let failure = pipeline.process(&input, &token, &mut |_| {}).unwrap_err();
    assert_eq!(failure.stage, Stage::Probing);
    assert_eq!(failure.kind(), ErrorKind::Cancelled);

    let token = CancelToken::new();
    let failure = pipeline
        .process(&input, &token, &mut |stage| {
            if stage == Stage::Transcoding {
                token.cancel();
            }
        })
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Rewriting);
    assert!(!dir.path().join("fixed").exists());
    Ok(())
}

#[test]
fn transcode_failure_keeps_input() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("fail.wav");
    write_test_tone(&input, 100)?;
    let original = fs::read(&input)?;

    let pipeline = pipeline(
        Config::builder().in_place(true).build()?,
        pcm_container(&tone(10)),
        None,
    );
    let failure = run_one(&pipeline, &input).unwrap_err();
    assert_eq!(failure.stage, Stage::Transcoding);
    assert_eq!(failure.kind(), ErrorKind::TranscodeFailed);
    assert_eq!(fs::read(&input)?, original);
    Ok(())
}

#[test]
fn failure_keeps_an_existing_output_folder() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("broken.wav");
    write_test_tone(&input, 100)?;
    let out_dir = dir.path().join("fixed");
    fs::create_dir(&out_dir)?;
    fs::write(out_dir.join("other.wav"), b"earlier result")?;

    let mut transcoded = pcm_container(&tone(400));
    transcoded.truncate(transcoded.len() - 100);
    let pipeline = pipeline(Config::builder().build()?, transcoded, None);
    run_one(&pipeline, &input).unwrap_err();

    let names: Vec<_> = fs::read_dir(&out_dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<Result<_, _>>()?;
    assert_eq!(names, ["other.wav"]);
    Ok(())
}

#[test]
fn destination_created_during_commit_is_not_clobbered() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("race.wav");
    write_test_tone(&input, 100)?;
    let original = fs::read(&input)?;
    let destination = dir.path().join("fixed").join("race.wav");

    let pipeline = pipeline(Config::builder().build()?, pcm_container(&tone(10)), None);
    let failure = pipeline
        .process(&input, &CancelToken::new(), &mut |stage| {
            if stage == Stage::Committing {
                fs::write(&destination, b"another writer").unwrap();
            }
        })
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Committing);
    assert_eq!(failure.kind(), ErrorKind::CommitFailed);
    assert_eq!(fs::read(&destination)?, b"another writer");
    assert_eq!(fs::read(&input)?, original, "input must stay untouched");
    assert_eq!(
        fs::read_dir(dir.path().join("fixed"))?.count(),
        1,
        "the temporary file is removed"
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn copies_get_default_permissions() -> Result<(), Box<dyn Error>> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let input = dir.path().join("perm.wav");
    write_test_tone(&input, 100)?;
    fs::set_permissions(&input, fs::Permissions::from_mode(0o644))?;

    let pipeline = pipeline(Config::builder().build()?, pcm_container(&tone(10)), None);
    let (destination, _) = fixed(run_one(&pipeline, &input)?);

    // A plain new file shows the mode the current umask allows.
    let reference = dir.path().join("reference");
    fs::write(&reference, b"")?;
    let expected = fs::metadata(&reference)?.permissions().mode() & 0o777;
    let actual = fs::metadata(&destination)?.permissions().mode() & 0o777;
    assert_eq!(actual, expected, "got {actual:o}, expected {expected:o}");
    Ok(())
}

#[cfg(unix)]
#[test]
fn in_place_keeps_the_original_permissions() -> Result<(), Box<dyn Error>> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let input = dir.path().join("shared.wav");
    write_test_tone(&input, 100)?;
    fs::set_permissions(&input, fs::Permissions::from_mode(0o640))?;

    let pipeline = pipeline(
        Config::builder().in_place(true).build()?,
        pcm_container(&tone(10)),
        None,
    );
    fixed(run_one(&pipeline, &input)?);
    let mode = fs::metadata(&input)?.permissions().mode() & 0o777;
    assert_eq!(mode, 0o640, "got {mode:o}");
    Ok(())
}

#[test]
fn fallback_tags_reach_the_transcoder_clean() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("tagged.wav");
    let mut info = b"INFO".to_vec();
    for (id, value) in [(b"INAM", &b"Title\0"[..]), (b"IART", &b"Band\0\0"[..])] {
        info.extend_from_slice(id);
        info.extend_from_slice(&(value.len() as u32).to_le_bytes());
        info.extend_from_slice(value);
    }
    let fmt = pcm_fmt(1, 8_000, 16);
    let audio = tone(100);
    fs::write(
        &input,
        riff(&[(b"fmt ", &fmt[..]), (b"LIST", &info[..]), (b"data", &audio[..])]),
    )?;

    let stub = StubTranscoder::new(pcm_container(&tone(10)));
    let jobs = stub.jobs.clone();
    let pipeline = Pipeline::with_tools(
        Config::builder().build()?,
        Box::new(FallbackProber::ffprobe_then_symphonia(
            dir.path().join("no-such-ffprobe"),
        )),
        Box::new(stub),
    );
    fixed(run_one(&pipeline, &input)?);

    let jobs = jobs.lock().unwrap();
    let tags = &jobs[0].tags;
    assert!(tags.contains(&("title".to_owned(), "Title".to_owned())));
    assert!(tags.contains(&("artist".to_owned(), "Band".to_owned())));
    assert!(tags.iter().all(|(key, value)| !key.contains('\0') && !value.contains('\0')));
    Ok(())
}
