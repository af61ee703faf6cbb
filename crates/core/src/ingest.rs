use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use encoding_rs::{CoderResult, Decoder};
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};

use crate::detect::{sniff_format, SniffedFormat, SAMPLE_BYTES};
use crate::error::{LeadNavError, Result};
use crate::session::CancelToken;

/// Hard cap on rows kept in memory per upload.
pub const ROW_CAP: usize = 16_000;

/// Files above this size must be read in chunks. Smaller files go through
/// the same streaming path; the flag is recorded for the caller's audit log.
pub const CHUNK_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

const CHUNK_ROWS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub row_cap: usize,
    pub chunk_rows: usize,
    pub cancel: Option<CancelToken>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            row_cap: ROW_CAP,
            chunk_rows: CHUNK_ROWS,
            cancel: None,
        }
    }
}

/// Parsed but not yet normalized rows. Ephemeral: handed straight to the
/// normalizer.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Ingest outcome reported to the caller for audit logging. Truncation and
/// skipped rows are conditions, not errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStats {
    /// Data rows consumed from the source (kept + skipped).
    pub rows_read: u64,
    /// Malformed rows dropped, counted among consumed rows only.
    pub rows_skipped: u64,
    pub truncated: bool,
    /// Exact-duplicate rows removed; filled in by the normalizer.
    pub deduped: u64,
    pub encoding: String,
    pub delimiter: char,
    pub gzip: bool,
    pub encoding_uncertain: bool,
    pub chunked: bool,
}

/// Sniff and ingest an uploaded byte buffer.
pub fn ingest_bytes(bytes: &[u8], opts: &IngestOptions) -> Result<(RawTable, IngestStats)> {
    let sample_len = bytes.len().min(SAMPLE_BYTES);
    let format = sniff_format(&bytes[..sample_len])?;
    if format.gzip {
        let reader = MultiGzDecoder::new(bytes);
        ingest_reader(reader, &format, bytes.len() as u64, opts)
    } else {
        ingest_reader(bytes, &format, bytes.len() as u64, opts)
    }
}

/// Sniff and ingest a file from disk. Only a SAMPLE_BYTES prefix is read
/// up front; the rest streams through `ingest_reader`, so large uploads
/// never sit in memory whole.
pub fn ingest_path(path: impl AsRef<Path>, opts: &IngestOptions) -> Result<(RawTable, IngestStats)> {
    let mut file = File::open(path.as_ref())?;
    let source_bytes = file.metadata()?.len();
    let mut sample = vec![0u8; SAMPLE_BYTES];
    let mut filled = 0usize;
    while filled < sample.len() {
        let n = file.read(&mut sample[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    sample.truncate(filled);
    let format = sniff_format(&sample)?;
    file.seek(SeekFrom::Start(0))?;
    let reader = BufReader::new(file);
    if format.gzip {
        ingest_reader(MultiGzDecoder::new(reader), &format, source_bytes, opts)
    } else {
        ingest_reader(reader, &format, source_bytes, opts)
    }
}

/// Stream a decompressed source through the csv parser in bounded chunks.
/// Never buffers the whole source: rows are consumed one record at a time
/// and kept rows are capped at `opts.row_cap`.
pub fn ingest_reader<R: Read>(
    reader: R,
    format: &SniffedFormat,
    source_bytes: u64,
    opts: &IngestOptions,
) -> Result<(RawTable, IngestStats)> {
    let decoded = DecodeReader::new(reader, format);
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .flexible(false)
        .from_reader(decoded);

    let headers: Vec<String> = match csv_reader.byte_headers() {
        Ok(h) if !h.is_empty() => h
            .iter()
            .map(|f| String::from_utf8_lossy(f).trim().to_string())
            .collect(),
        Ok(_) => return Err(LeadNavError::EmptyInput),
        Err(err) => {
            if source_bytes == 0 {
                return Err(LeadNavError::EmptyInput);
            }
            return Err(err.into());
        }
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(LeadNavError::EmptyInput);
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut rows_read = 0u64;
    let mut rows_skipped = 0u64;
    let mut truncated = false;

    let mut records = csv_reader.into_byte_records();
    loop {
        if let Some(cancel) = &opts.cancel {
            if cancel.is_cancelled() {
                return Err(LeadNavError::Cancelled);
            }
        }
        let mut consumed_in_chunk = 0usize;
        let mut done = false;
        while consumed_in_chunk < opts.chunk_rows {
            match records.next() {
                Some(item) => {
                    rows_read += 1;
                    consumed_in_chunk += 1;
                    if rows.len() >= opts.row_cap {
                        // Content exists beyond the cap, valid or not; report
                        // and stop reading instead of draining to EOF.
                        truncated = true;
                        done = true;
                        break;
                    }
                    match item {
                        Ok(record) => rows.push(
                            record
                                .iter()
                                .map(|f| String::from_utf8_lossy(f).to_string())
                                .collect(),
                        ),
                        Err(err) => {
                            // Wrong column count or an unescaped delimiter
                            // mangling the record. Skip the row, not the
                            // ingest.
                            tracing::debug!(error = %err, "skipping malformed row");
                            rows_skipped += 1;
                        }
                    }
                }
                None => {
                    done = true;
                    break;
                }
            }
        }
        if done {
            break;
        }
    }

    let stats = IngestStats {
        rows_read,
        rows_skipped,
        truncated,
        deduped: 0,
        encoding: format.encoding_name().to_string(),
        delimiter: format.delimiter as char,
        gzip: format.gzip,
        encoding_uncertain: format.lossy,
        chunked: source_bytes > CHUNK_THRESHOLD_BYTES,
    };
    Ok((RawTable { headers, rows }, stats))
}

/// Adapter that transcodes an arbitrary-encoding byte stream to UTF-8 for
/// the csv parser, using encoding_rs's incremental decoder so multi-byte
/// sequences split across read boundaries survive.
struct DecodeReader<R: Read> {
    inner: R,
    decoder: Decoder,
    src: [u8; 8192],
    out: Vec<u8>,
    out_pos: usize,
    source_eof: bool,
    finished: bool,
}

impl<R: Read> DecodeReader<R> {
    fn new(inner: R, format: &SniffedFormat) -> Self {
        Self {
            inner,
            decoder: format.encoding.new_decoder(),
            src: [0u8; 8192],
            out: Vec::new(),
            out_pos: 0,
            source_eof: false,
            finished: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        self.out.clear();
        self.out_pos = 0;
        while self.out.is_empty() && !self.finished {
            let n = if self.source_eof {
                0
            } else {
                self.inner.read(&mut self.src)?
            };
            if n == 0 {
                self.source_eof = true;
            }
            let mut consumed = 0usize;
            loop {
                let mut dst = [0u8; 16384];
                let (result, read, written, _) =
                    self.decoder
                        .decode_to_utf8(&self.src[consumed..n], &mut dst, self.source_eof);
                consumed += read;
                self.out.extend_from_slice(&dst[..written]);
                match result {
                    CoderResult::InputEmpty => break,
                    CoderResult::OutputFull => continue,
                }
            }
            if self.source_eof {
                self.finished = true;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.out_pos >= self.out.len() {
            self.refill()?;
            if self.out.is_empty() {
                return Ok(0);
            }
        }
        let available = &self.out[self.out_pos..];
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.out_pos += len;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_bytes(rows: usize) -> Vec<u8> {
        let mut out = String::from("email,amount\n");
        for i in 0..rows {
            out.push_str(&format!("user{i}@example.com,{}\n", i % 50));
        }
        out.into_bytes()
    }

    #[test]
    fn small_file_is_not_truncated() {
        let bytes = csv_bytes(100);
        let (table, stats) = ingest_bytes(&bytes, &IngestOptions::default()).unwrap();
        assert_eq!(table.rows.len(), 100);
        assert_eq!(stats.rows_read, 100);
        assert!(!stats.truncated);
        assert_eq!(stats.rows_skipped, 0);
    }

    #[test]
    fn cap_is_enforced_and_reported() {
        let bytes = csv_bytes(ROW_CAP + 500);
        let (table, stats) = ingest_bytes(&bytes, &IngestOptions::default()).unwrap();
        assert_eq!(table.rows.len(), ROW_CAP);
        assert!(stats.truncated);
    }

    #[test]
    fn file_exactly_at_cap_is_not_truncated() {
        let bytes = csv_bytes(ROW_CAP);
        let (table, stats) = ingest_bytes(&bytes, &IngestOptions::default()).unwrap();
        assert_eq!(table.rows.len(), ROW_CAP);
        assert!(!stats.truncated);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let mut text = String::from("a,b,c\n");
        text.push_str("1,2,3\n");
        text.push_str("4,5\n"); // wrong column count
        text.push_str("6,7,8\n");
        let (table, stats) = ingest_bytes(text.as_bytes(), &IngestOptions::default()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.rows_read, 3);
    }

    #[test]
    fn malformed_tail_past_cap_is_not_consumed() {
        let mut text = String::from("a,b\n");
        for i in 0..5 {
            text.push_str(&format!("{i},{i}\n"));
        }
        for _ in 0..10 {
            text.push_str("x,y,z\n"); // wrong column count
        }
        let opts = IngestOptions {
            row_cap: 5,
            ..IngestOptions::default()
        };
        let (table, stats) = ingest_bytes(text.as_bytes(), &opts).unwrap();
        assert_eq!(table.rows.len(), 5);
        assert!(stats.truncated);
        // One record past the cap is consumed to detect truncation; the
        // rest of the malformed tail is left unread.
        assert_eq!(stats.rows_read, 6);
        assert_eq!(stats.rows_skipped, 0);
    }

    #[test]
    fn utf8_file_larger_than_sample_keeps_utf8() {
        // An "é" straddles the sample boundary, so the raw sample alone is
        // not valid UTF-8.
        let mut text = String::from("name,amount\n");
        while text.len() < SAMPLE_BYTES - 12 {
            text.push_str("abcd,1\n");
        }
        text.push_str("ren");
        while text.len() < SAMPLE_BYTES - 1 {
            text.push('e');
        }
        text.push_str("\u{e9},2\n");
        text.push_str("Ren\u{e9},3\n");
        assert!(text.len() > SAMPLE_BYTES);
        assert!(std::str::from_utf8(&text.as_bytes()[..SAMPLE_BYTES]).is_err());

        let (table, stats) = ingest_bytes(text.as_bytes(), &IngestOptions::default()).unwrap();
        assert_eq!(stats.encoding, "UTF-8");
        assert!(!stats.encoding_uncertain);
        let last = table.rows.last().unwrap();
        assert_eq!(last[0], "Ren\u{e9}");
    }

    #[test]
    fn cancellation_aborts_between_chunks() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let opts = IngestOptions {
            cancel: Some(cancel),
            ..IngestOptions::default()
        };
        let bytes = csv_bytes(10);
        assert!(matches!(
            ingest_bytes(&bytes, &opts),
            Err(LeadNavError::Cancelled)
        ));
    }

    #[test]
    fn path_ingest_streams_from_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&csv_bytes(200)).unwrap();
        let (table, stats) = ingest_path(file.path(), &IngestOptions::default()).unwrap();
        assert_eq!(table.rows.len(), 200);
        assert_eq!(table.rows[0][0], "user0@example.com");
        assert!(!stats.gzip);
    }

    #[test]
    fn path_ingest_inflates_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&csv_bytes(50)).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();
        let (table, stats) = ingest_path(file.path(), &IngestOptions::default()).unwrap();
        assert!(stats.gzip);
        assert_eq!(table.rows.len(), 50);
    }

    #[test]
    fn empty_file_is_fatal() {
        assert!(ingest_bytes(b"", &IngestOptions::default()).is_err());
    }

    #[test]
    fn windows_1252_bytes_decode_cleanly() {
        let bytes = b"name;city\nRen\xe9;Qu\xe9bec\n".to_vec();
        let (table, stats) = ingest_bytes(&bytes, &IngestOptions::default()).unwrap();
        assert_eq!(stats.encoding, "windows-1252");
        assert_eq!(table.rows[0][0], "Ren\u{e9}");
    }
}
