mod columns;
mod dataset;
mod detect;
mod error;
mod filter;
mod ingest;
mod metrics;
mod normalize;
mod ranges;
mod session;

pub use columns::{find_categorical_fallback, find_column, ColumnRole};
pub use dataset::{Column, Dataset, DatasetKind, Record, Value, ValueKind};
pub use detect::{sniff_format, SniffedFormat, SAMPLE_BYTES};
pub use error::{LeadNavError, Result};
pub use filter::{apply_filter, CustomFilter, FilterSpec, FilterWarning, FilteredView};
pub use ingest::{
    ingest_bytes, ingest_path, ingest_reader, IngestOptions, IngestStats, RawTable,
    CHUNK_THRESHOLD_BYTES, ROW_CAP,
};
pub use metrics::{
    compute_metrics, ChartPoint, ChartSeries, IdentityKey, MetricValue, MetricsInput,
    MetricsResult,
};
pub use normalize::{normalize_header, normalize_table, ColumnMapping, NormalizeReport};
pub use ranges::parse_range_or_number;
pub use session::{CancelToken, SessionSlot};
