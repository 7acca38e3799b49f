// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Length units attached to shapes
//!
//! Shapes carry a unit string of the form `"<name> <factor>"`, e.g.
//! `"mm 0.001"`. Only millimeter assemblies are fully supported; any other
//! unit is reported but its factor is still honored.

use nom::{
    bytes::complete::take_while1,
    character::complete::{multispace0, multispace1},
    combinator::{all_consuming, map_res},
    sequence::{delimited, separated_pair},
    IResult,
};

use crate::error::{Error, Result};

/// Unit assumed for JSON shapes that do not declare one
pub const DEFAULT_JSON_UNIT: &str = "unit 0.01";

/// A named length unit and its scale factor
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub factor: f64,
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_ascii_whitespace())(input)
}

fn unit_spec(input: &str) -> IResult<&str, (&str, f64)> {
    all_consuming(delimited(
        multispace0,
        separated_pair(
            token,
            multispace1,
            map_res(token, |s: &str| fast_float::parse::<f64, _>(s)),
        ),
        multispace0,
    ))(input)
}

impl Unit {
    /// Parse `"<name> <factor>"`, warning when the unit is not millimeters
    pub fn parse(input: &str) -> Result<Self> {
        let (_, (name, factor)) =
            unit_spec(input).map_err(|_| Error::InvalidUnit(input.to_string()))?;
        let unit = Self {
            name: name.to_string(),
            factor,
        };
        if !unit.is_millimeter() {
            tracing::warn!(unit = %unit.name, factor, "Found non-MM unit");
        }
        Ok(unit)
    }

    #[inline]
    pub fn is_millimeter(&self) -> bool {
        self.name == "mm"
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self {
            name: "mm".to_string(),
            factor: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_millimeter() {
        let unit = Unit::parse("mm 0.001").unwrap();
        assert_eq!(unit.name, "mm");
        assert_eq!(unit.factor, 0.001);
        assert!(unit.is_millimeter());
    }

    #[test]
    fn test_non_millimeter_keeps_factor() {
        let unit = Unit::parse(DEFAULT_JSON_UNIT).unwrap();
        assert_eq!(unit.name, "unit");
        assert_eq!(unit.factor, 0.01);
        assert!(!unit.is_millimeter());
    }

    #[test]
    fn test_invalid_unit() {
        assert!(Unit::parse("mm").is_err());
        assert!(Unit::parse("mm abc").is_err());
        assert!(Unit::parse("").is_err());
    }
}
