use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};

use leadnav_core::{
    ingest_path, normalize_table, ColumnMapping, Dataset, DatasetKind, FilterSpec, IngestOptions,
    IngestStats,
};

use crate::logging;

pub struct LoadedDataset {
    pub dataset: Dataset,
    pub stats: IngestStats,
}

/// Read, sniff, ingest and normalize one uploaded file.
pub fn load_dataset(input: &str, kind: &str, mapping: Option<&str>) -> Result<LoadedDataset> {
    let kind = DatasetKind::from_str(kind)?;
    let mapping = mapping.map(read_mapping).transpose()?;
    logging::stage("ingest", format!("loading {input}"));
    // Streamed, not slurped: only the sniff sample is read up front.
    let (table, mut stats) = ingest_path(input, &IngestOptions::default())
        .with_context(|| format!("failed to ingest {input}"))?;
    logging::verbose(format!(
        "detected {} encoding, '{}' delimiter",
        stats.encoding, stats.delimiter
    ));
    let (dataset, report) = normalize_table(table, kind, mapping.as_ref());
    stats.deduped = report.deduped;
    if stats.truncated {
        logging::info(format!(
            "file exceeds the row cap, keeping the first {} rows",
            dataset.len()
        ));
    }
    Ok(LoadedDataset { dataset, stats })
}

fn read_mapping(path: &str) -> Result<ColumnMapping> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let pairs: BTreeMap<String, String> =
        serde_json::from_str(&raw).with_context(|| format!("invalid mapping file {path}"))?;
    Ok(ColumnMapping::from_pairs(pairs))
}

pub fn read_filter(path: Option<&str>) -> Result<FilterSpec> {
    match path {
        Some(path) => {
            let raw =
                fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("invalid filter file {path}"))
        }
        None => Ok(FilterSpec::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_and_normalizes_a_csv_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Email,Revenue\na@x.com,100\nb@x.com,200\n")
            .unwrap();
        let loaded = load_dataset(file.path().to_str().unwrap(), "buyers", None).unwrap();
        assert_eq!(loaded.dataset.len(), 2);
        assert_eq!(loaded.stats.rows_read, 2);
    }

    #[test]
    fn mapping_file_renames_headers() {
        let mut data = NamedTempFile::new().unwrap();
        data.write_all(b"E-Mail,Rev\na@x.com,100\n").unwrap();
        let mut mapping = NamedTempFile::new().unwrap();
        mapping
            .write_all(br#"{"e-mail": "email", "rev": "revenue"}"#)
            .unwrap();
        let loaded = load_dataset(
            data.path().to_str().unwrap(),
            "buyers",
            Some(mapping.path().to_str().unwrap()),
        )
        .unwrap();
        let names: Vec<&str> = loaded
            .dataset
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["email", "revenue"]);
    }

    #[test]
    fn missing_filter_file_means_no_filter() {
        let spec = read_filter(None).unwrap();
        assert!(spec.is_empty());
    }
}
