//! Simple packing: values as scaled integers relative to a reference.
//!
//! A value `v` is stored as the unsigned offset `round(v * 10^D) - R`, where
//! `D` is the column's decimal scale and `R` its reference (the smallest
//! scaled value). Precision after a round trip:
//! - integers, booleans: exact
//! - floats: ±0.5·10^-D
//! - timestamps: 1 ms (packed as unix milliseconds)

use chrono::DateTime;

use crate::codec::bits::bits_needed;
use crate::error_handling::CodecError;
use crate::table::{ColumnType, Value};

/// Widest packed field, in bits.
pub const MAX_WIDTH: u8 = 62;

/// Smallest decimal scale tried for floats before giving up.
const MIN_FLOAT_SCALE: i16 = -30;

/// Scaled magnitudes must stay below this.
const SCALED_LIMIT: f64 = (1u64 << 62) as f64;

/// One column converted to scaled integers.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledColumn {
    pub column_type: ColumnType,
    /// Decimal scale `D`.
    pub scale: i16,
    /// `None` is a missing value.
    pub values: Vec<Option<i64>>,
}

impl ScaledColumn {
    pub fn min(&self) -> Option<i64> {
        self.values.iter().flatten().copied().min()
    }

    pub fn max(&self) -> Option<i64> {
        self.values.iter().flatten().copied().max()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Offsets from `reference` and the width they need.
    ///
    /// With `reserve_missing` one extra code (all ones) is kept free for nulls.
    pub fn offsets(
        &self,
        format: &'static str,
        column: &str,
        reference: i64,
        reserve_missing: bool,
    ) -> Result<(u8, Vec<Option<u64>>), CodecError> {
        let span = match self.max() {
            Some(max) => (i128::from(max) - i128::from(reference)) as u128,
            None => 0,
        };
        let needed = if reserve_missing { span + 1 } else { span };
        let width = if needed > u128::from(u64::MAX) {
            u8::MAX
        } else {
            bits_needed(needed as u64)
        };
        let width = if reserve_missing { width.max(1) } else { width };
        if width > MAX_WIDTH {
            return Err(CodecError::ValueOutOfRange {
                format,
                column: column.to_string(),
                reason: format!("value range needs {} bits (limit {})", width, MAX_WIDTH),
            });
        }
        let offsets = self
            .values
            .iter()
            .map(|v| v.map(|v| (i128::from(v) - i128::from(reference)) as u64))
            .collect();
        Ok((width, offsets))
    }
}

fn unsupported(format: &'static str, column: &str, column_type: ColumnType) -> CodecError {
    CodecError::UnsupportedFieldType {
        format,
        column: column.to_string(),
        column_type,
    }
}

/// Scales a float column at decimal scale `d`, or `None` if it does not fit.
fn scale_floats(values: &[Option<f64>], d: i16) -> Option<Vec<Option<i64>>> {
    let factor = 10f64.powi(i32::from(d));
    let mut scaled = Vec::with_capacity(values.len());
    let mut lo = i64::MAX;
    let mut hi = i64::MIN;
    for v in values {
        match v {
            Some(v) => {
                let s = (v * factor).round();
                if !s.is_finite() || s.abs() >= SCALED_LIMIT {
                    return None;
                }
                let s = s as i64;
                lo = lo.min(s);
                hi = hi.max(s);
                scaled.push(Some(s));
            }
            None => scaled.push(None),
        }
    }
    if lo <= hi && bits_needed((i128::from(hi) - i128::from(lo) + 1) as u64) > MAX_WIDTH {
        return None;
    }
    Some(scaled)
}

/// Converts a column to scaled integers.
///
/// Text and decimal columns are rejected with `UnsupportedFieldType`;
/// non-finite floats become missing values.
pub fn scale_column<'a>(
    format: &'static str,
    column: &str,
    column_type: ColumnType,
    values: impl Iterator<Item = &'a Value>,
    float_precision: u8,
) -> Result<ScaledColumn, CodecError> {
    if !column_type.is_packable() {
        return Err(unsupported(format, column, column_type));
    }

    if column_type == ColumnType::Float {
        let floats: Vec<Option<f64>> = values
            .map(|v| v.as_f64().filter(|f| f.is_finite()))
            .collect();
        let start = i16::from(float_precision);
        for d in (MIN_FLOAT_SCALE..=start).rev() {
            if let Some(scaled) = scale_floats(&floats, d) {
                return Ok(ScaledColumn {
                    column_type,
                    scale: d,
                    values: scaled,
                });
            }
        }
        return Err(CodecError::ValueOutOfRange {
            format,
            column: column.to_string(),
            reason: "float magnitudes too large to pack at any decimal scale".to_string(),
        });
    }

    let scaled = values
        .map(|v| match v {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(i64::from(*b))),
            Value::Integer(i) => Ok(Some(*i)),
            Value::Timestamp(ts) => Ok(Some(ts.timestamp_millis())),
            other => Err(unsupported(
                format,
                column,
                other.column_type().unwrap_or(column_type),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ScaledColumn {
        column_type,
        scale: 0,
        values: scaled,
    })
}

/// Rebuilds a value from its scaled integer.
pub fn unscale(
    format: &'static str,
    column_type: ColumnType,
    scale: i16,
    scaled: i64,
) -> Result<Value, CodecError> {
    match column_type {
        ColumnType::Boolean => Ok(Value::Boolean(scaled != 0)),
        ColumnType::Integer => Ok(Value::Integer(scaled)),
        ColumnType::Float => {
            let value = if scale >= 0 {
                scaled as f64 / 10f64.powi(i32::from(scale))
            } else {
                scaled as f64 * 10f64.powi(-i32::from(scale))
            };
            Ok(Value::Float(value))
        }
        ColumnType::Timestamp => DateTime::from_timestamp_millis(scaled)
            .map(Value::Timestamp)
            .ok_or_else(|| {
                CodecError::malformed(format, format!("timestamp {} ms out of range", scaled))
            }),
        other => Err(CodecError::malformed(
            format,
            format!("column kind {} cannot be unpacked", other),
        )),
    }
}
