//! Parquet encoding of warehouse rows.
//!
//! Rows are assembled into a single Arrow record batch and written with
//! ZSTD compression. One batch per day is plenty at the intended scale.

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::Result;
use crate::events_job::EventSummaryRow;
use crate::metrics_job::MetricsRow;

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

fn write_batch(schema: Arc<Schema>, batch: RecordBatch) -> Result<Bytes> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(Bytes::from(buf))
}

/// Encode per-minute request metrics rows.
pub fn encode_metrics(rows: &[MetricsRow]) -> Result<Bytes> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("bucket_start", DataType::Utf8, false),
        Field::new("service", DataType::Utf8, false),
        Field::new("method", DataType::Utf8, false),
        Field::new("path_template", DataType::Utf8, false),
        Field::new("request_count", DataType::Int64, false),
        Field::new("error_count", DataType::Int64, false),
        Field::new("error_rate", DataType::Float64, false),
        Field::new("p50_latency_ms", DataType::Float64, false),
        Field::new("p95_latency_ms", DataType::Float64, false),
        Field::new("p99_latency_ms", DataType::Float64, false),
        Field::new("event_day", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.bucket_start.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.service.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.method.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.path_template.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.request_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.error_count),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.error_rate),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.p50_latency_ms),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.p95_latency_ms),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.p99_latency_ms),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.event_day.as_str()),
            )),
        ],
    )?;

    write_batch(schema, batch)
}

/// Encode daily service-event summary rows.
pub fn encode_events(rows: &[EventSummaryRow]) -> Result<Bytes> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("event_day", DataType::Utf8, false),
        Field::new("service", DataType::Utf8, false),
        Field::new("event_type", DataType::Utf8, false),
        Field::new("event_count", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.event_day.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.service.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.event_type.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.event_count),
            )),
        ],
    )?;

    write_batch(schema, batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_to_valid_parquet() {
        let rows = vec![MetricsRow {
            bucket_start: "2025-01-15 10:30:00".to_string(),
            service: "api-service".to_string(),
            method: "GET".to_string(),
            path_template: "/users".to_string(),
            request_count: 3,
            error_count: 1,
            error_rate: 1.0 / 3.0,
            p50_latency_ms: 20.0,
            p95_latency_ms: 29.0,
            p99_latency_ms: 29.8,
            event_day: "2025-01-15".to_string(),
        }];
        let data = encode_metrics(&rows).unwrap();
        assert_eq!(&data[0..4], b"PAR1");
    }

    #[test]
    fn events_encode_to_valid_parquet() {
        let rows = vec![EventSummaryRow {
            event_day: "2025-01-15".to_string(),
            service: "deploy-service".to_string(),
            event_type: "deploy_started".to_string(),
            event_count: 2,
        }];
        let data = encode_events(&rows).unwrap();
        assert_eq!(&data[0..4], b"PAR1");
    }

    #[test]
    fn empty_row_set_still_encodes() {
        let data = encode_metrics(&[]).unwrap();
        assert_eq!(&data[0..4], b"PAR1");
    }
}
