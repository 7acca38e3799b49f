// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute value grammar shared by the XML and JSON documents
//!
//! Index documents encode numbers as space separated lists inside attributes
//! (`bbox="0 0 0 1 1 1"`, `xform="1 0 0 0 ..."`, `shell="sh1 sh2"`). This
//! module turns those strings into typed values with [nom] and
//! [fast-float](https://docs.rs/fast-float).

use nom::{
    bytes::complete::take_while1,
    character::complete::multispace1,
    combinator::{all_consuming, map_res},
    multi::separated_list1,
    IResult,
};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Parse a single finite float token
#[inline]
fn parse_finite(token: &str) -> Result<f64> {
    match fast_float::parse::<f64, _>(token) {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(Error::InvalidNumber(token.to_string())),
    }
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(take_while1(|c: char| !c.is_ascii_whitespace()), parse_finite)(input)
}

fn number_list(input: &str) -> IResult<&str, Vec<f64>> {
    all_consuming(separated_list1(multispace1, number))(input)
}

/// Parse a whitespace separated list of finite floats
///
/// When `count` is given the list must contain exactly that many values.
pub fn parse_float_vec(input: &str, count: Option<usize>) -> Result<Vec<f64>> {
    let trimmed = input.trim();
    let values = if trimmed.is_empty() {
        Vec::new()
    } else {
        match number_list(trimmed) {
            Ok((_, values)) => values,
            Err(_) => {
                let bad = trimmed
                    .split_ascii_whitespace()
                    .find(|token| parse_finite(token).is_err())
                    .unwrap_or(trimmed);
                return Err(Error::InvalidNumber(bad.to_string()));
            }
        }
    };

    match count {
        Some(expected) if values.len() != expected => Err(Error::ValueCount {
            expected,
            found: values.len(),
        }),
        _ => Ok(values),
    }
}

/// Split an id list attribute (`shape="a b c"`); missing or blank yields nothing
pub fn parse_id_list(input: Option<&str>) -> Vec<String> {
    input
        .map(|s| s.split_ascii_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Element order of a flat 16 value matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixOrder {
    RowMajor,
    ColumnMajor,
}

/// A 4x4 transform stored row-major
///
/// Documents may encode matrices in either order; the conversion happens
/// once when the value is parsed and everything downstream reads rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    rows: [f64; 16],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        rows: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Build from 16 values in the given order
    pub fn from_values(values: &[f64], order: MatrixOrder) -> Result<Self> {
        if values.len() != 16 {
            return Err(Error::InvalidTransform(format!(
                "expected 16 values, found {}",
                values.len()
            )));
        }
        let mut rows = [0.0; 16];
        match order {
            MatrixOrder::RowMajor => rows.copy_from_slice(values),
            MatrixOrder::ColumnMajor => {
                for row in 0..4 {
                    for col in 0..4 {
                        rows[row * 4 + col] = values[col * 4 + row];
                    }
                }
            }
        }
        Ok(Self { rows })
    }

    /// Parse a transform attribute; the literal `I` is the identity
    pub fn parse(input: &str, order: MatrixOrder) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed == "I" {
            return Ok(Self::IDENTITY);
        }
        let values = parse_float_vec(trimmed, None)
            .map_err(|e| Error::InvalidTransform(e.to_string()))?;
        Self::from_values(&values, order)
    }

    /// Row-major element access
    #[inline]
    pub fn row_major(&self) -> &[f64; 16] {
        &self.rows
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Transform as it appears in JSON: either the compressed string form or a
/// plain array of 16 numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransformValue {
    Text(String),
    Values(Vec<f64>),
}

impl TransformValue {
    pub fn resolve(&self, order: MatrixOrder) -> Result<Transform> {
        match self {
            TransformValue::Text(text) => Transform::parse(text, order),
            TransformValue::Values(values) => Transform::from_values(values, order),
        }
    }
}

/// Axis aligned extent read from a `bbox` value (min xyz, then max xyz)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Extent {
    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.len() != 6 {
            return Err(Error::ValueCount {
                expected: 6,
                found: values.len(),
            });
        }
        Ok(Self {
            min: [values[0], values[1], values[2]],
            max: [values[3], values[4], values[5]],
        })
    }

    pub fn parse(input: &str) -> Result<Self> {
        Self::from_values(&parse_float_vec(input, Some(6))?)
    }

    /// An extent whose min exceeds its max on any axis holds no points
    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }
}

/// Extent as it appears in JSON: a string or an array of six numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtentValue {
    Text(String),
    Values(Vec<f64>),
}

impl ExtentValue {
    pub fn resolve(&self) -> Result<Extent> {
        match self {
            ExtentValue::Text(text) => Extent::parse(text),
            ExtentValue::Values(values) => Extent::from_values(values),
        }
    }
}
