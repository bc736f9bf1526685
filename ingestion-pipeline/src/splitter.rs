use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use common::error::AppError;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub total_lines: usize,
    pub lines_per_shard: usize,
    pub shards: Vec<PathBuf>,
}

/// Path of shard `index` inside `out_dir`.
pub fn shard_path(out_dir: &Path, prefix: &str, index: usize) -> PathBuf {
    out_dir.join(format!("{prefix}{index}.jsonl"))
}

fn open_input(input: &Path) -> Result<BufReader<File>, AppError> {
    let file = File::open(input).map_err(|err| {
        AppError::Io(std::io::Error::new(
            err.kind(),
            format!("opening {}: {err}", input.display()),
        ))
    })?;
    Ok(BufReader::new(file))
}

fn count_lines(input: &Path) -> Result<usize, AppError> {
    let mut reader = open_input(input)?;
    let mut buf = Vec::new();
    let mut lines = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(lines);
        }
        lines += 1;
    }
}

/// Splits `input` into `shards` contiguous files named `{prefix}{i}.jsonl`.
///
/// Each shard receives `ceil(total / shards)` lines except the last ones,
/// which take what remains and may be empty. Lines are copied byte for byte,
/// so concatenating the shards in index order reproduces the input. The
/// input is streamed twice and never held in memory.
pub fn split_jsonl(
    input: &Path,
    shards: usize,
    out_dir: &Path,
    prefix: &str,
) -> Result<SplitOutcome, AppError> {
    if shards == 0 {
        return Err(AppError::Validation(
            "shard count must be at least 1".to_string(),
        ));
    }

    let total_lines = count_lines(input)?;
    let lines_per_shard = total_lines.div_ceil(shards);
    debug!(input = %input.display(), total_lines, lines_per_shard, shards, "splitting input");

    std::fs::create_dir_all(out_dir)?;
    let mut reader = open_input(input)?;
    let mut buf = Vec::new();
    let mut paths = Vec::with_capacity(shards);

    for index in 0..shards {
        let path = shard_path(out_dir, prefix, index);
        let mut writer = BufWriter::new(File::create(&path)?);
        for _ in 0..lines_per_shard {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            writer.write_all(&buf)?;
        }
        writer.flush()?;
        paths.push(path);
    }

    info!(
        input = %input.display(),
        total_lines,
        lines_per_shard,
        shards,
        "input split into shards"
    );

    Ok(SplitOutcome {
        total_lines,
        lines_per_shard,
        shards: paths,
    })
}
