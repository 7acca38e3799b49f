// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 24-bit hex colors normalized to 0..1 RGB

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Color given to every shell before its payload arrives
pub const DEFAULT_SHELL_COLOR: &str = "7d7d7d";

/// Color of XML facet groups without a `color` attribute
pub const DEFAULT_FACET_COLOR: &str = "d8d8d8";

/// Normalized RGB color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Decode `rrggbb` (an optional leading `#` or `0x` is accepted)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let trimmed = hex.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 6 {
            return Err(Error::InvalidColor(hex.to_string()));
        }
        let value =
            u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidColor(hex.to_string()))?;
        Ok(Self::from_u24(value))
    }

    pub fn from_u24(value: u32) -> Self {
        Self {
            r: ((value >> 16) & 0xff) as f32 / 255.0,
            g: ((value >> 8) & 0xff) as f32 / 255.0,
            b: (value & 0xff) as f32 / 255.0,
        }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn default_shell() -> Self {
        Self::from_u24(0x7d7d7d)
    }

    pub fn default_facet() -> Self {
        Self::from_u24(0xd8d8d8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_hex() {
        let c = Rgb::from_hex("ff8000").unwrap();
        assert_relative_eq!(c.r, 1.0);
        assert_relative_eq!(c.g, 128.0 / 255.0);
        assert_relative_eq!(c.b, 0.0);

        assert_eq!(Rgb::from_hex("#0000ff").unwrap(), Rgb::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_defaults_match_hex() {
        assert_eq!(Rgb::from_hex(DEFAULT_SHELL_COLOR).unwrap(), Rgb::default_shell());
        assert_eq!(Rgb::from_hex(DEFAULT_FACET_COLOR).unwrap(), Rgb::default_facet());
    }

    #[test]
    fn test_invalid_hex() {
        assert!(Rgb::from_hex("zzzzzz").is_err());
        assert!(Rgb::from_hex("").is_err());
        assert!(Rgb::from_hex("1234567").is_err());
    }
}
