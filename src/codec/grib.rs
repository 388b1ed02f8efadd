//! GRIB edition 2 codec.
//!
//! Each column becomes one message (field) on an `Ni = rows`, `Nj = 1`
//! regular latitude/longitude grid:
//! - Section 0: `GRIB`, discipline, edition 2, total length (u64)
//! - Section 1: reference time = first timestamp of the table
//! - Section 2: column index and count plus the column's manifest entry
//! - Section 3: template 3.0, first grid point from `latitude`/`longitude`
//! - Section 4: template 4.0 with the parameter category and number
//! - Section 5: template 5.0 simple packing (IEEE reference, E = 0, D)
//! - Section 6: bitmap when the column has nulls
//! - Section 7: packed values of the non-null points
//! - Section 8: `7777`

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use log::debug;

use crate::codec::bits::{BitReader, BitWriter, ByteReader, ByteWriter};
use crate::codec::descriptors::{grib_parameters, lookup, unit_for, GribParameter};
use crate::codec::manifest::ManifestEntry;
use crate::codec::packing::{scale_column, unscale};
use crate::codec::{first_timestamp, CodecOptions, ScientificFormat};
use crate::error_handling::CodecError;
use crate::table::{CanonicalTable, Column, ColumnType, Value};

const FORMAT: &str = "GRIB";
const EDITION: u8 = 2;

const MASTER_TABLE_VERSION: u8 = 31;
const LOCAL_TABLE_VERSION: u8 = 1;
const MISSING_CENTRE: u16 = 0xFFFF;
/// Code table 1.2: start of observation.
const SIGNIFICANCE_OBSERVATION: u8 = 3;
/// Code table 3.2: earth assumed spherical with radius 6,371,229 m.
const EARTH_SHAPE: u8 = 6;
/// Code table 4.3: observation.
const GENERATING_PROCESS_OBSERVATION: u8 = 8;
/// Code table 4.5: ground or water surface.
const SURFACE_GROUND: u8 = 1;
const MISSING_U32: u32 = 0xFFFF_FFFF;
/// Code table 6.0.
const BITMAP_PRESENT: u8 = 0;
const BITMAP_ABSENT: u8 = 255;

/// GRIB edition 2 encoder/decoder.
#[derive(Debug, Clone, Default)]
pub struct GribCodec {
    options: CodecOptions,
}

impl GribCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }
}

/// One decoded field.
#[derive(Debug, Clone, PartialEq)]
pub struct GribField {
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub reference_time: Option<DateTime<Utc>>,
    /// First grid point in degrees (latitude, longitude).
    pub first_point: (f64, f64),
    pub column_index: u16,
    pub column_count: u16,
    pub entry: ManifestEntry,
    pub values: Vec<Value>,
}

/// Largest integral `f32` not above `value`.
fn floor_reference(value: i64) -> f32 {
    let mut reference = (value as f32).floor();
    while reference as i64 > value {
        reference = next_down(reference).floor();
    }
    reference
}

fn next_down(x: f32) -> f32 {
    if x == 0.0 {
        -f32::from_bits(1)
    } else if x > 0.0 {
        f32::from_bits(x.to_bits() - 1)
    } else {
        f32::from_bits(x.to_bits() + 1)
    }
}

/// First finite value of the column named like `field`, in degrees.
fn coordinate(table: &CanonicalTable, field: &str, limit: f64) -> f64 {
    table
        .columns()
        .iter()
        .position(|c| lookup(&c.name).is_some_and(|f| f.name == field))
        .and_then(|index| {
            table
                .column_values(index)
                .filter_map(Value::as_f64)
                .find(|v| v.is_finite() && v.abs() <= limit)
        })
        .unwrap_or(0.0)
}

fn micro_degrees(degrees: f64) -> i32 {
    (degrees * 1e6).round() as i32
}

fn section1(time: DateTime<Utc>) -> ByteWriter {
    let mut s = ByteWriter::new();
    s.u32(21)
        .u8(1)
        .u16(MISSING_CENTRE)
        .u16(0)
        .u8(MASTER_TABLE_VERSION)
        .u8(LOCAL_TABLE_VERSION)
        .u8(SIGNIFICANCE_OBSERVATION)
        .u16(u16::try_from(time.year()).unwrap_or(0))
        .u8(time.month() as u8)
        .u8(time.day() as u8)
        .u8(time.hour() as u8)
        .u8(time.minute() as u8)
        .u8(time.second() as u8)
        .u8(255)
        .u8(255);
    s
}

fn section3(points: u32, lat: i32, lon: i32) -> ByteWriter {
    let mut s = ByteWriter::new();
    s.u32(72)
        .u8(3)
        .u8(0)
        .u32(points)
        .u8(0)
        .u8(0)
        .u16(0)
        .u8(EARTH_SHAPE)
        .u8(0)
        .u32(0)
        .u8(0)
        .u32(0)
        .u8(0)
        .u32(0)
        .u32(points)
        .u32(1)
        .u32(0)
        .u32(MISSING_U32)
        .sm32(lat)
        .sm32(lon)
        .u8(0)
        .sm32(lat)
        .sm32(lon)
        .u32(MISSING_U32)
        .u32(MISSING_U32)
        .u8(0);
    s
}

fn section4(parameter: &GribParameter) -> ByteWriter {
    let mut s = ByteWriter::new();
    s.u32(34)
        .u8(4)
        .u16(0)
        .u16(0)
        .u8(parameter.category)
        .u8(parameter.number)
        .u8(GENERATING_PROCESS_OBSERVATION)
        .u8(255)
        .u8(255)
        .u16(0)
        .u8(0)
        .u8(1)
        .u32(0)
        .u8(SURFACE_GROUND)
        .u8(0)
        .u32(0)
        .u8(255)
        .u8(0)
        .u32(0);
    s
}

fn section_len(format: &'static str, len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::limit(format, "section longer than 4 GiB"))
}

impl ScientificFormat for GribCodec {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn encode(&self, table: &CanonicalTable) -> Result<Vec<u8>, CodecError> {
        let parameters = grib_parameters(table.column_names())?;
        let points = u32::try_from(table.row_count())
            .map_err(|_| CodecError::limit(FORMAT, "more than 2^32 rows"))?;
        let count = u16::try_from(table.column_count())
            .map_err(|_| CodecError::limit(FORMAT, "more than 65535 columns"))?;
        let time = first_timestamp(table, 0..table.row_count());
        let lat = micro_degrees(coordinate(table, "latitude", 90.0));
        let lon = coordinate(table, "longitude", 360.0);
        let lon = micro_degrees(if lon < 0.0 { lon + 360.0 } else { lon });

        let mut out = Vec::new();
        for (index, (column, parameter)) in table.columns().iter().zip(&parameters).enumerate() {
            let scaled = scale_column(
                FORMAT,
                &column.name,
                column.column_type,
                table.column_values(index),
                self.options.float_precision,
            )?;
            let reference = floor_reference(scaled.min().unwrap_or(0));
            let (width, offsets) =
                scaled.offsets(FORMAT, &column.name, reference as i64, false)?;
            let entry = ManifestEntry {
                name: column.name.clone(),
                column_type: column.column_type,
                unit: unit_for(&column.name, column.column_type).to_string(),
                scale: scaled.scale,
                reference: reference as i64,
                width,
            };

            let mut s2_body = ByteWriter::new();
            s2_body.u16(index as u16).u16(count);
            entry.write(FORMAT, &mut s2_body)?;
            let s2_body = s2_body.into_bytes();
            let mut s2 = ByteWriter::new();
            s2.u32(section_len(FORMAT, 5 + s2_body.len())?)
                .u8(2)
                .bytes(&s2_body);

            let present = offsets.iter().filter(|o| o.is_some()).count();
            let mut s5 = ByteWriter::new();
            s5.u32(21)
                .u8(5)
                .u32(present as u32)
                .u16(0)
                .f32(reference)
                .sm16(0)
                .sm16(scaled.scale)
                .u8(width)
                .u8(if column.column_type == ColumnType::Float { 0 } else { 1 });

            let mut s6 = ByteWriter::new();
            if present == offsets.len() {
                s6.u32(6).u8(6).u8(BITMAP_ABSENT);
            } else {
                let mut bitmap = BitWriter::new();
                for offset in &offsets {
                    bitmap.write(u64::from(offset.is_some()), 1);
                }
                let bitmap = bitmap.finish();
                s6.u32(section_len(FORMAT, 6 + bitmap.len())?)
                    .u8(6)
                    .u8(BITMAP_PRESENT)
                    .bytes(&bitmap);
            }

            let mut data = BitWriter::new();
            for offset in offsets.iter().flatten() {
                data.write(*offset, width);
            }
            let data = data.finish();
            let mut s7 = ByteWriter::new();
            s7.u32(section_len(FORMAT, 5 + data.len())?).u8(7).bytes(&data);

            let s1 = section1(time);
            let s3 = section3(points, lat, lon);
            let s4 = section4(parameter);
            let total = 16
                + s1.len()
                + s2.len()
                + s3.len()
                + s4.len()
                + s5.len()
                + s6.len()
                + s7.len()
                + 4;

            let mut message = ByteWriter::new();
            message
                .bytes(b"GRIB")
                .u16(0)
                .u8(parameter.discipline)
                .u8(EDITION)
                .u64(total as u64);
            for section in [s1, s2, s3, s4, s5, s6, s7] {
                message.bytes(&section.into_bytes());
            }
            message.bytes(b"7777");
            out.extend(message.into_bytes());
        }

        debug!(
            "Encoded {} rows x {} columns as {} GRIB byte(s)",
            table.row_count(),
            table.column_count(),
            out.len()
        );
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<CanonicalTable, CodecError> {
        let fields = read_fields(bytes)?;
        let Some(first) = fields.first() else {
            return Ok(CanonicalTable::empty(Vec::new())?);
        };
        let count = usize::from(first.column_count);
        let rows = first.values.len();

        let mut slots: Vec<Option<GribField>> = vec![None; count];
        for field in fields {
            let index = usize::from(field.column_index);
            if usize::from(field.column_count) != count || index >= count {
                return Err(CodecError::malformed(FORMAT, "inconsistent column numbering"));
            }
            if field.values.len() != rows {
                return Err(CodecError::malformed(
                    FORMAT,
                    format!(
                        "field '{}' has {} points, expected {}",
                        field.entry.name,
                        field.values.len(),
                        rows
                    ),
                ));
            }
            if slots[index].is_some() {
                return Err(CodecError::malformed(
                    FORMAT,
                    format!("column {} appears twice", index),
                ));
            }
            slots[index] = Some(field);
        }

        let fields: Vec<GribField> = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| CodecError::malformed(FORMAT, format!("column {} missing", i)))
            })
            .collect::<Result<_, _>>()?;

        let columns = fields
            .iter()
            .map(|f| Column::new(f.entry.name.clone(), f.entry.column_type))
            .collect();
        let table_rows = (0..rows)
            .map(|r| fields.iter().map(|f| f.values[r].clone()).collect())
            .collect();
        Ok(CanonicalTable::try_new(columns, table_rows)?)
    }
}

#[derive(Default)]
struct Sections<'a> {
    reference_time: Option<DateTime<Utc>>,
    manifest: Option<(u16, u16, ManifestEntry)>,
    grid: Option<(usize, (f64, f64))>,
    parameter: Option<(u8, u8)>,
    packing: Option<(usize, f32, i16, i16, u8)>,
    bitmap: Option<&'a [u8]>,
    data: Option<&'a [u8]>,
}

fn read_field(input: &mut ByteReader<'_>) -> Result<GribField, CodecError> {
    let start = input.position();
    input.expect_tag(b"GRIB", "section 0")?;
    input.u16("section 0 reserved")?;
    let discipline = input.u8("discipline")?;
    let edition = input.u8("edition")?;
    if edition != EDITION {
        return Err(CodecError::malformed(
            FORMAT,
            format!("edition {} is not supported", edition),
        ));
    }
    let total = input.u64("message length")? as usize;

    let mut sections = Sections::default();
    loop {
        if input.peek(4) == Some(b"7777".as_slice()) {
            input.take(4, "section 8")?;
            break;
        }
        let len = input.u32("section length")? as usize;
        let number = input.u8("section number")?;
        let body_len = len
            .checked_sub(5)
            .ok_or_else(|| CodecError::malformed(FORMAT, format!("section {} too short", number)))?;
        let body = input.take(body_len, "section body")?;
        let mut s = ByteReader::new(FORMAT, body);
        match number {
            1 => {
                s.take(7, "section 1 originator")?;
                let year = s.u16("year")?;
                let (month, day) = (s.u8("month")?, s.u8("day")?);
                let (hour, minute, second) = (s.u8("hour")?, s.u8("minute")?, s.u8("second")?);
                sections.reference_time =
                    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                        .and_then(|d| {
                            d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
                        })
                        .map(|t| t.and_utc());
            }
            2 => {
                let index = s.u16("column index")?;
                let count = s.u16("column count")?;
                let entry = ManifestEntry::read(FORMAT, &mut s)?;
                sections.manifest = Some((index, count, entry));
            }
            3 => {
                s.take(1, "grid source")?;
                let points = s.u32("number of points")? as usize;
                s.take(4, "grid header")?;
                s.take(16, "earth shape")?;
                s.take(16, "grid size")?;
                let lat = s.sm32("La1")?;
                let lon = s.sm32("Lo1")?;
                sections.grid = Some((
                    points,
                    (f64::from(lat) / 1e6, f64::from(lon) / 1e6),
                ));
            }
            4 => {
                s.take(4, "product header")?;
                let category = s.u8("parameter category")?;
                let number = s.u8("parameter number")?;
                sections.parameter = Some((category, number));
            }
            5 => {
                let present = s.u32("number of values")? as usize;
                let template = s.u16("representation template")?;
                if template != 0 {
                    return Err(CodecError::malformed(
                        FORMAT,
                        format!("data representation template 5.{} is not supported", template),
                    ));
                }
                let reference = s.f32("reference value")?;
                let binary_scale = s.sm16("binary scale")?;
                let decimal_scale = s.sm16("decimal scale")?;
                let width = s.u8("bits per value")?;
                sections.packing = Some((present, reference, binary_scale, decimal_scale, width));
            }
            6 => match s.u8("bitmap indicator")? {
                BITMAP_PRESENT => sections.bitmap = Some(&body[1..]),
                BITMAP_ABSENT => {}
                other => {
                    return Err(CodecError::malformed(
                        FORMAT,
                        format!("bitmap indicator {} is not supported", other),
                    ))
                }
            },
            7 => sections.data = Some(body),
            other => {
                return Err(CodecError::malformed(
                    FORMAT,
                    format!("unexpected section {}", other),
                ))
            }
        }
    }
    if input.position() - start != total {
        return Err(CodecError::malformed(
            FORMAT,
            format!("declared length {} but sections span {}", total, input.position() - start),
        ));
    }

    let missing = |what: &str| CodecError::malformed(FORMAT, format!("section {} missing", what));
    let (column_index, column_count, entry) = sections.manifest.ok_or_else(|| missing("2"))?;
    let (points, first_point) = sections.grid.ok_or_else(|| missing("3"))?;
    let (category, number) = sections.parameter.ok_or_else(|| missing("4"))?;
    let (present, reference, binary_scale, decimal_scale, width) =
        sections.packing.ok_or_else(|| missing("5"))?;
    let data = sections.data.ok_or_else(|| missing("7"))?;

    let mut bitmap = sections.bitmap.map(BitReader::new);
    let mut packed = BitReader::new(data);
    let integral = binary_scale == 0 && reference.fract() == 0.0;
    let mut values = Vec::with_capacity(points);
    let mut seen = 0usize;
    for _ in 0..points {
        let is_present = match bitmap.as_mut() {
            Some(bits) => {
                bits.read(1)
                    .ok_or_else(|| CodecError::truncated(FORMAT, "bitmap"))?
                    == 1
            }
            None => true,
        };
        if !is_present {
            values.push(Value::Null);
            continue;
        }
        seen += 1;
        let x = packed
            .read(width)
            .ok_or_else(|| CodecError::truncated(FORMAT, "section 7 data"))?;
        let value = if integral {
            let scaled = i64::try_from(i128::from(reference as i64) + i128::from(x))
                .map_err(|_| CodecError::malformed(FORMAT, "packed value overflows"))?;
            unscale(FORMAT, entry.column_type, decimal_scale, scaled)?
        } else if entry.column_type == ColumnType::Float {
            let y = f64::from(reference) + x as f64 * 2f64.powi(i32::from(binary_scale));
            Value::Float(y * 10f64.powi(-i32::from(decimal_scale)))
        } else {
            return Err(CodecError::malformed(
                FORMAT,
                format!("column '{}' needs an integral reference", entry.name),
            ));
        };
        values.push(value);
    }
    if seen != present {
        return Err(CodecError::malformed(
            FORMAT,
            format!("{} values declared but {} present", present, seen),
        ));
    }

    Ok(GribField {
        discipline,
        category,
        number,
        reference_time: sections.reference_time,
        first_point,
        column_index,
        column_count,
        entry,
        values,
    })
}

/// Decodes every field in `bytes`.
pub fn read_fields(bytes: &[u8]) -> Result<Vec<GribField>, CodecError> {
    let mut input = ByteReader::new(FORMAT, bytes);
    let mut fields = Vec::new();
    while input.remaining() > 0 {
        fields.push(read_field(&mut input)?);
    }
    Ok(fields)
}
