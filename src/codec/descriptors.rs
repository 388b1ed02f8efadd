//! Descriptor catalogue for well-known sensor fields.
//!
//! Maps sensor column names onto WMO BUFR Table B element descriptors and
//! GRIB2 (discipline, category, number) parameters. Columns without a
//! standard identifier receive local-use ones: BUFR class 48..=63, entry
//! 192..=255; GRIB2 category and number 192..=254.

use std::fmt;

use crate::error_handling::CodecError;
use crate::table::ColumnType;

/// A BUFR descriptor: F (2 bits), X (6 bits), Y (8 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fxy {
    pub f: u8,
    pub x: u8,
    pub y: u8,
}

impl Fxy {
    pub const fn new(f: u8, x: u8, y: u8) -> Self {
        Self { f, x, y }
    }

    pub fn to_u16(self) -> u16 {
        (u16::from(self.f & 0b11) << 14) | (u16::from(self.x & 0b11_1111) << 8) | u16::from(self.y)
    }

    pub fn from_u16(raw: u16) -> Self {
        Self {
            f: (raw >> 14) as u8,
            x: ((raw >> 8) & 0b11_1111) as u8,
            y: (raw & 0xFF) as u8,
        }
    }

    /// Whether X/Y fall in the local-use ranges.
    pub fn is_local(self) -> bool {
        self.x >= 48 || self.y >= 192
    }
}

impl fmt::Display for Fxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:03}", self.f, self.x, self.y)
    }
}

/// A GRIB2 parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GribParameter {
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub abbreviation: &'static str,
}

/// A sensor field with standard identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownField {
    pub name: &'static str,
    /// BUFR element descriptor and its Table B mnemonic.
    pub bufr: Option<(Fxy, &'static str)>,
    pub grib: Option<GribParameter>,
    pub unit: &'static str,
}

const fn grib(category: u8, number: u8, abbreviation: &'static str) -> Option<GribParameter> {
    Some(GribParameter {
        discipline: 0,
        category,
        number,
        abbreviation,
    })
}

pub const KNOWN_FIELDS: &[KnownField] = &[
    KnownField {
        name: "temperature",
        bufr: Some((Fxy::new(0, 12, 101), "airTemperature")),
        grib: grib(0, 0, "TMP"),
        unit: "K",
    },
    KnownField {
        name: "pressure",
        bufr: Some((Fxy::new(0, 10, 4), "pressure")),
        grib: grib(3, 0, "PRES"),
        unit: "Pa",
    },
    KnownField {
        name: "humidity",
        bufr: Some((Fxy::new(0, 13, 3), "relativeHumidity")),
        grib: grib(1, 1, "RH"),
        unit: "%",
    },
    KnownField {
        name: "wind_direction",
        bufr: Some((Fxy::new(0, 11, 1), "windDirection")),
        grib: grib(2, 0, "WDIR"),
        unit: "degree true",
    },
    KnownField {
        name: "wind_speed",
        bufr: Some((Fxy::new(0, 11, 2), "windSpeed")),
        grib: grib(2, 1, "WIND"),
        unit: "m s-1",
    },
    KnownField {
        name: "solar_radiation",
        bufr: Some((Fxy::new(0, 14, 21), "solarRadiation")),
        grib: grib(4, 1, "NSWRT"),
        unit: "J m-2",
    },
    KnownField {
        name: "latitude",
        bufr: Some((Fxy::new(0, 5, 1), "latitude")),
        grib: grib(191, 192, "NLAT"),
        unit: "deg",
    },
    KnownField {
        name: "longitude",
        bufr: Some((Fxy::new(0, 6, 1), "longitude")),
        grib: grib(191, 193, "ELON"),
        unit: "deg",
    },
    KnownField {
        name: "altitude",
        bufr: Some((Fxy::new(0, 7, 2), "height")),
        grib: None,
        unit: "m",
    },
    KnownField {
        name: "visibility",
        bufr: Some((Fxy::new(0, 20, 1), "visibility")),
        grib: grib(19, 0, "VIS"),
        unit: "m",
    },
    KnownField {
        name: "aerosol_concentration",
        bufr: None,
        grib: grib(20, 59, "ANCON"),
        unit: "m-3",
    },
    KnownField {
        name: "mass_density",
        bufr: None,
        grib: grib(20, 0, "MASSDEN"),
        unit: "kg m-3",
    },
];

/// Looks a column up by exact name, then by its longest known `{field}_` prefix
/// (merged columns are named `{source}_{column}`).
pub fn lookup(column: &str) -> Option<&'static KnownField> {
    KNOWN_FIELDS
        .iter()
        .find(|f| f.name == column)
        .or_else(|| {
            KNOWN_FIELDS
                .iter()
                .filter(|f| {
                    column
                        .strip_prefix(f.name)
                        .is_some_and(|rest| rest.starts_with('_'))
                })
                .max_by_key(|f| f.name.len())
        })
}

/// Unit recorded in the manifest for a column.
pub fn unit_for(column: &str, column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Timestamp => "ms since 1970-01-01T00:00:00Z",
        ColumnType::Boolean => "flag",
        _ => lookup(column).map_or("", |f| f.unit),
    }
}

/// Assigns BUFR descriptors to columns, handing out local ones in order.
pub fn bufr_descriptors<'a>(
    columns: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Fxy>, CodecError> {
    let mut next_local = 0usize;
    columns
        .into_iter()
        .map(|name| match lookup(name).and_then(|f| f.bufr) {
            Some((fxy, _)) => Ok(fxy),
            None => {
                let slot = next_local;
                next_local += 1;
                let x = 48 + slot / 64;
                if x > 63 {
                    return Err(CodecError::limit(
                        "BUFR",
                        "more than 1024 columns without a standard descriptor",
                    ));
                }
                Ok(Fxy::new(0, x as u8, 192 + (slot % 64) as u8))
            }
        })
        .collect()
}

/// Assigns GRIB2 parameters to columns, handing out local ones in order.
pub fn grib_parameters<'a>(
    columns: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<GribParameter>, CodecError> {
    let mut next_local = 0usize;
    columns
        .into_iter()
        .map(|name| match lookup(name).and_then(|f| f.grib) {
            Some(p) => Ok(p),
            None => {
                let slot = next_local;
                next_local += 1;
                let category = 192 + slot / 63;
                if category > 254 {
                    return Err(CodecError::limit(
                        "GRIB",
                        "too many columns without a standard parameter",
                    ));
                }
                Ok(GribParameter {
                    discipline: 0,
                    category: category as u8,
                    number: 192 + (slot % 63) as u8,
                    abbreviation: "LOCAL",
                })
            }
        })
        .collect()
}
