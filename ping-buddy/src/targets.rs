use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnet::{AddrParseError, IpNet};
use itertools::Itertools;
use log::debug;
use thiserror::Error;

/// Prefixes with more host bits than this are refused.
const MAX_HOST_BITS: u8 = 16;

#[derive(Error, Debug)]
pub enum TargetReadError {
    #[error("target file does not exist: `{0}`")]
    NoSuchFile(PathBuf),

    #[error("failed to open target file `{path}`")]
    FailedOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read a line from target file")]
    FailedRead { source: std::io::Error },

    #[error("neither an address nor a prefix: `{input}`")]
    TargetSyntax {
        input: String,
        source: AddrParseError,
    },

    #[error("prefix `{0}` is too large to expand (more than 65536 hosts)")]
    PrefixTooLarge(IpNet),
}

pub type TargetReadResult = Result<Vec<IpAddr>, TargetReadError>;

/// Parses a single target. Bare addresses stand for themselves, prefixes for their hosts.
pub fn expand(input: &str) -> TargetReadResult {
    use TargetReadError as E;

    let input = input.trim();
    if let Ok(addr) = input.parse::<IpAddr>() {
        return Ok(vec![addr]);
    }
    let net = input.parse::<IpNet>().map_err(|source| E::TargetSyntax {
        input: input.to_string(),
        source,
    })?;
    if net.max_prefix_len() - net.prefix_len() > MAX_HOST_BITS {
        return Err(E::PrefixTooLarge(net));
    }
    Ok(net.hosts().collect())
}

/// Expands every target and drops repeated addresses, keeping the first occurrence.
pub fn expand_all<S: AsRef<str>>(inputs: &[S]) -> TargetReadResult {
    let mut expanded = vec![];
    for input in inputs {
        expanded.extend(expand(input.as_ref())?);
    }
    Ok(dedup(expanded))
}

pub fn read_from(path: &Path) -> TargetReadResult {
    use TargetReadError as E;

    if !path.is_file() {
        return Err(E::NoSuchFile(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|source| E::FailedOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let lines = BufReader::new(file)
        .lines()
        .map_ok(|line| line.trim().to_string())
        .filter_ok(|line| !line.starts_with('#') && !line.is_empty());

    let mut inputs = vec![];
    for line_res in lines {
        match line_res {
            Err(source) => return Err(E::FailedRead { source }),
            Ok(line) => inputs.push(line),
        }
    }
    expand_all(&inputs)
}

fn dedup(expanded: Vec<IpAddr>) -> Vec<IpAddr> {
    let before = expanded.len();
    let unique = expanded.into_iter().unique().collect_vec();
    if unique.len() < before {
        debug!("Dropped {} repeated targets", before - unique.len());
    }
    unique
}
