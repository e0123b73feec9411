//! Columnar (Parquet) payload decoding.
//!
//! Decoding runs in two phases, both cancellable: a metadata pass that
//! surfaces the schema and per-column-chunk min/max statistics, then row
//! materialization. The statistics ride back with the rows so the domain
//! engine never has to re-scan row data for a range it already knows.

use crate::{DecodeResult, DecodedTile, Row};
use crate::row::ColumnStats;
use bytes::Bytes;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::statistics::Statistics;
use parquet::record::Field;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Rows to materialize between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Schema-level information from the metadata pass.
#[derive(Debug, Clone, Default)]
pub struct ColumnarMetadata {
    /// Total row count across row groups.
    pub num_rows: i64,
    /// Union of per-column-chunk min/max statistics, by column name.
    pub stats: BTreeMap<String, ColumnStats>,
}

/// A decoder for one columnar format.
///
/// Implementations are obtained through the runtime's memoized loader so a
/// failed load is retried on the next tile rather than sticking forever.
pub trait ColumnarReader: Send + Sync {
    /// Phase one: schema and embedded statistics, without touching row data.
    fn read_metadata(&self, data: &Bytes) -> DecodeResult<ColumnarMetadata>;

    /// Phase two: materialize rows. Returns `Ok(None)` promptly when the
    /// token is cancelled.
    fn read_rows(
        &self,
        data: &Bytes,
        metadata: &ColumnarMetadata,
        token: &CancellationToken,
    ) -> DecodeResult<Option<Vec<Row>>>;
}

/// The Parquet-backed [`ColumnarReader`].
#[derive(Debug, Default)]
pub struct ParquetReader;

impl ColumnarReader for ParquetReader {
    fn read_metadata(&self, data: &Bytes) -> DecodeResult<ColumnarMetadata> {
        let reader = SerializedFileReader::new(data.clone())?;
        let metadata = reader.metadata();

        let mut stats: BTreeMap<String, ColumnStats> = BTreeMap::new();
        for row_group in metadata.row_groups() {
            for column in row_group.columns() {
                let Some(range) = column.statistics().and_then(stats_range) else {
                    continue;
                };
                let name = column.column_path().string();
                stats
                    .entry(name)
                    .and_modify(|existing| *existing = existing.union(&range))
                    .or_insert(range);
            }
        }

        Ok(ColumnarMetadata {
            num_rows: metadata.file_metadata().num_rows(),
            stats,
        })
    }

    fn read_rows(
        &self,
        data: &Bytes,
        _metadata: &ColumnarMetadata,
        token: &CancellationToken,
    ) -> DecodeResult<Option<Vec<Row>>> {
        let reader = SerializedFileReader::new(data.clone())?;
        let mut rows = Vec::new();
        for (i, record) in reader.get_row_iter(None)?.enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && token.is_cancelled() {
                return Ok(None);
            }
            let record = record?;
            let mut bag = Map::new();
            for (name, field) in record.get_column_iter() {
                if let Some(value) = field_to_value(field) {
                    bag.insert(name.clone(), value);
                }
            }
            if let Some(row) = Row::from_bag(bag) {
                rows.push(row);
            }
        }
        Ok(Some(rows))
    }
}

/// Decode a columnar payload through both phases.
///
/// `wanted_attrs` narrows the returned statistics to the attributes the
/// caller colors by; an empty list keeps every numeric column.
pub fn decode_columnar(
    reader: &dyn ColumnarReader,
    data: &Bytes,
    wanted_attrs: &[String],
    token: &CancellationToken,
) -> DecodeResult<Option<DecodedTile>> {
    if token.is_cancelled() {
        return Ok(None);
    }
    let metadata = reader.read_metadata(data)?;

    if token.is_cancelled() {
        return Ok(None);
    }
    let Some(rows) = reader.read_rows(data, &metadata, token)? else {
        return Ok(None);
    };

    let column_stats = if wanted_attrs.is_empty() {
        metadata.stats
    } else {
        metadata
            .stats
            .into_iter()
            .filter(|(name, _)| wanted_attrs.iter().any(|a| a == name))
            .collect()
    };

    Ok(Some(DecodedTile { rows, column_stats }))
}

/// Extract a finite numeric range from column chunk statistics.
fn stats_range(stats: &Statistics) -> Option<ColumnStats> {
    let (min, max) = match stats {
        Statistics::Int32(s) => (*s.min_opt()? as f64, *s.max_opt()? as f64),
        Statistics::Int64(s) => (*s.min_opt()? as f64, *s.max_opt()? as f64),
        Statistics::Float(s) => (*s.min_opt()? as f64, *s.max_opt()? as f64),
        Statistics::Double(s) => (*s.min_opt()?, *s.max_opt()?),
        _ => return None,
    };
    if min.is_finite() && max.is_finite() {
        Some(ColumnStats { min, max })
    } else {
        None
    }
}

/// Map a Parquet field to a JSON value.
///
/// Binary columns (geometry blobs) and nested groups carry nothing the
/// color pipeline can use and are skipped.
fn field_to_value(field: &Field) -> Option<Value> {
    Some(match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(v) => Value::Number((*v as i64).into()),
        Field::Short(v) => Value::Number((*v as i64).into()),
        Field::Int(v) => Value::Number((*v as i64).into()),
        Field::Long(v) => Value::Number((*v).into()),
        Field::UByte(v) => Value::Number((*v as u64).into()),
        Field::UShort(v) => Value::Number((*v as u64).into()),
        Field::UInt(v) => Value::Number((*v as u64).into()),
        Field::ULong(v) => Value::Number((*v).into()),
        Field::Float(v) => float_value(*v as f64),
        Field::Double(v) => float_value(*v),
        Field::Str(s) => Value::String(s.clone()),
        Field::Date(v) => Value::Number((*v as i64).into()),
        Field::TimestampMillis(v) => Value::Number((*v).into()),
        Field::TimestampMicros(v) => Value::Number((*v).into()),
        _ => return None,
    })
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
