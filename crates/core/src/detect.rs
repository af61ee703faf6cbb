use std::io::Read;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use flate2::read::MultiGzDecoder;

use crate::error::{LeadNavError, Result};

/// Size of the byte sample the detector looks at.
pub const SAMPLE_BYTES: usize = 64 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Candidate separators, in tie-break priority order.
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

const MAX_SNIFF_LINES: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct SniffedFormat {
    pub encoding: &'static Encoding,
    pub delimiter: u8,
    pub gzip: bool,
    /// Set when no encoding in the priority list decoded the sample cleanly
    /// and a lossy decode was used instead ("encoding-uncertain").
    pub lossy: bool,
}

impl SniffedFormat {
    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Sniff encoding, field separator and compression from the first bytes of
/// an upload. A declared-gzip stream that yields no bytes is fatal; an
/// undecodable sample degrades to a lossy decode instead of aborting.
pub fn sniff_format(sample: &[u8]) -> Result<SniffedFormat> {
    if sample.is_empty() {
        return Err(LeadNavError::EmptyInput);
    }
    let gzip = sample.starts_with(&GZIP_MAGIC);
    let inflated;
    let raw: &[u8] = if gzip {
        inflated = inflate_sample(sample)?;
        &inflated
    } else {
        sample
    };

    let (encoding, text, lossy) = decode_sample(raw);
    let delimiter = sniff_delimiter(&text);
    Ok(SniffedFormat {
        encoding,
        delimiter,
        gzip,
        lossy,
    })
}

/// Decompress up to SAMPLE_BYTES from a gzip sample. The sample usually
/// truncates the member mid-stream, so a short read after some output is
/// fine; zero output means the stream is corrupt.
fn inflate_sample(sample: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(sample);
    let mut buf = vec![0u8; SAMPLE_BYTES];
    let mut filled = 0usize;
    loop {
        match decoder.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if filled == buf.len() {
                    break;
                }
            }
            Err(err) => {
                if filled > 0 {
                    break;
                }
                return Err(LeadNavError::Gzip(err.to_string()));
            }
        }
    }
    if filled == 0 {
        return Err(LeadNavError::Gzip("stream produced no bytes".to_string()));
    }
    buf.truncate(filled);
    Ok(buf)
}

fn decode_sample(raw: &[u8]) -> (&'static Encoding, String, bool) {
    if let Some((encoding, _)) = Encoding::for_bom(raw) {
        let (text, _) = encoding.decode_with_bom_removal(raw);
        return (encoding, text.into_owned(), false);
    }
    match std::str::from_utf8(raw) {
        Ok(text) => return (UTF_8, text.to_string(), false),
        // The sample boundary can land inside a multi-byte sequence; a
        // truncated tail is still UTF-8, not a reason to fall through to
        // windows-1252.
        Err(err) if err.error_len().is_none() => {
            let text = String::from_utf8_lossy(&raw[..err.valid_up_to()]).into_owned();
            return (UTF_8, text, false);
        }
        Err(_) => {}
    }
    for candidate in [WINDOWS_1252, UTF_16LE, UTF_16BE] {
        let (text, _, had_errors) = candidate.decode(raw);
        if !had_errors {
            return (candidate, text.into_owned(), false);
        }
    }
    let (text, _) = UTF_8.decode_with_bom_removal(raw);
    (UTF_8, text.into_owned(), true)
}

/// Pick the separator whose per-line occurrence count is most consistent:
/// nonzero mean, lowest variance, ties broken by DELIMITERS order.
fn sniff_delimiter(text: &str) -> u8 {
    let mut lines: Vec<&str> = text.lines().take(MAX_SNIFF_LINES + 1).collect();
    // The sample usually cuts the last line short; ignore it.
    if lines.len() > 1 {
        lines.pop();
    }
    if lines.is_empty() {
        return b',';
    }

    let mut best: Option<(u8, f64)> = None;
    for &delim in DELIMITERS.iter() {
        let counts: Vec<f64> = lines
            .iter()
            .map(|line| count_unquoted(line, delim) as f64)
            .collect();
        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        if mean < 1.0 {
            continue;
        }
        let variance =
            counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
        match best {
            Some((_, best_var)) if variance >= best_var => {}
            _ => best = Some((delim, variance)),
        }
    }
    best.map(|(d, _)| d).unwrap_or(b',')
}

fn count_unquoted(line: &str, delim: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0usize;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delim && !in_quotes {
            count += 1;
        }
    }
    count
}
