//! Spatial tiling used to narrow down proximity candidates.
//!
//! Positions are bucketed into Web Mercator map tiles (the quadkey scheme used by Bing
//! Maps). At level `L` the map is split into `2^L x 2^L` tiles; each tile is named by a
//! quadkey of `L` base-4 digits, so a key's prefix is the key of its parent tile.
//!
//! Tiles are only a filter. Two positions a hair apart on either side of a tile edge get
//! different keys, so a matcher that only compares within shared tiles can miss pairs that
//! straddle a boundary.
use std::f64::consts::PI;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde_json::{json, Map, Value};

use crate::agents::Position;
use crate::error::GeospreadError;

pub const MIN_LATITUDE: f64 = -85.051_128_78;
pub const MAX_LATITUDE: f64 = 85.051_128_78;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

pub const MIN_TILE_LEVEL: u8 = 1;
pub const MAX_TILE_LEVEL: u8 = 23;

const TILE_SIZE: u64 = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    level: u8,
    x: u32,
    y: u32,
}

fn map_size(level: u8) -> u64 {
    TILE_SIZE << level
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn position_to_pixel(position: Position, level: u8) -> (u64, u64) {
    let latitude = position.latitude.clamp(MIN_LATITUDE, MAX_LATITUDE);
    let longitude = position.longitude.clamp(MIN_LONGITUDE, MAX_LONGITUDE);

    let x = (longitude + 180.0) / 360.0;
    let sin_latitude = (latitude * PI / 180.0).sin();
    let y = 0.5 - ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln() / (4.0 * PI);

    let size = map_size(level) as f64;
    let pixel_x = (x * size + 0.5).clamp(0.0, size - 1.0);
    let pixel_y = (y * size + 0.5).clamp(0.0, size - 1.0);
    (pixel_x as u64, pixel_y as u64)
}

#[allow(clippy::cast_precision_loss)]
fn pixel_to_position(pixel_x: u64, pixel_y: u64, level: u8) -> Position {
    let size = map_size(level) as f64;
    let x = (pixel_x as f64).clamp(0.0, size - 1.0) / size - 0.5;
    let y = 0.5 - (pixel_y as f64).clamp(0.0, size - 1.0) / size;
    Position::new(
        90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI,
        360.0 * x,
    )
}

/// Returns the key of the tile containing `position` at `level`.
///
/// Latitudes beyond the Mercator limit (about ±85.05°) fall into the first or last row.
/// `level` is clamped to `MIN_TILE_LEVEL..=MAX_TILE_LEVEL`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn tile_key(position: Position, level: u8) -> TileKey {
    let level = level.clamp(MIN_TILE_LEVEL, MAX_TILE_LEVEL);
    let (pixel_x, pixel_y) = position_to_pixel(position, level);
    TileKey {
        level,
        x: (pixel_x / TILE_SIZE) as u32,
        y: (pixel_y / TILE_SIZE) as u32,
    }
}

/// Corners of a tile in degrees, as used for drawing it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TileBounds {
    pub top_left: Position,
    pub bottom_right: Position,
}

impl TileKey {
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `level` is outside `MIN_TILE_LEVEL..=MAX_TILE_LEVEL`
    /// or the tile coordinates do not exist at that level.
    pub fn new(level: u8, x: u32, y: u32) -> Result<TileKey, GeospreadError> {
        if !(MIN_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&level) {
            return Err(GeospreadError::ConfigurationError(format!(
                "tile level {level} is outside {MIN_TILE_LEVEL}..={MAX_TILE_LEVEL}"
            )));
        }
        let tiles = 1_u32 << level;
        if x >= tiles || y >= tiles {
            return Err(GeospreadError::ConfigurationError(format!(
                "tile ({x}, {y}) does not exist at level {level}"
            )));
        }
        Ok(TileKey { level, x, y })
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[must_use]
    pub fn x(&self) -> u32 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> u32 {
        self.y
    }

    fn corner(level: u8, x: u32, y: u32) -> Position {
        pixel_to_position(u64::from(x) * TILE_SIZE, u64::from(y) * TILE_SIZE, level)
    }

    /// The tile's corners. The bottom-right corner is the top-left corner of the diagonal
    /// neighbor, which wraps around for the last row and column; the wrapped coordinates
    /// are mirrored back so the box stays on the tile's own side of the map.
    #[must_use]
    pub fn bounds(&self) -> TileBounds {
        let tiles = 1_u32 << self.level;
        let top_left = TileKey::corner(self.level, self.x, self.y);
        let mut bottom_right =
            TileKey::corner(self.level, (self.x + 1) % tiles, (self.y + 1) % tiles);

        if top_left.latitude < bottom_right.latitude {
            bottom_right.latitude = -bottom_right.latitude;
        }
        if top_left.longitude > bottom_right.longitude {
            bottom_right.longitude = -bottom_right.longitude;
        }
        TileBounds {
            top_left,
            bottom_right,
        }
    }

    /// The tile outline as a closed ring of `[longitude, latitude]` pairs, clockwise from
    /// the top-left corner.
    #[must_use]
    pub fn polygon(&self) -> [[f64; 2]; 5] {
        let TileBounds {
            top_left,
            bottom_right,
        } = self.bounds();
        [
            [top_left.longitude, top_left.latitude],
            [bottom_right.longitude, top_left.latitude],
            [bottom_right.longitude, bottom_right.latitude],
            [top_left.longitude, bottom_right.latitude],
            [top_left.longitude, top_left.latitude],
        ]
    }

    /// A GeoJSON `Feature` with the tile outline as its `Polygon` geometry.
    #[must_use]
    pub fn to_feature(&self, properties: Option<Map<String, Value>>) -> Value {
        json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [self.polygon()],
            },
            "properties": properties.unwrap_or_default(),
        })
    }
}

impl Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for i in (1..=self.level).rev() {
            let mask = 1_u32 << (i - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            write!(f, "{}", char::from(digit))?;
        }
        Ok(())
    }
}

impl FromStr for TileKey {
    type Err = GeospreadError;

    fn from_str(quadkey: &str) -> Result<Self, Self::Err> {
        let invalid = || GeospreadError::ConfigurationError(format!("invalid quadkey {quadkey:?}"));
        if quadkey.len() > usize::from(MAX_TILE_LEVEL) {
            return Err(invalid());
        }
        let level = u8::try_from(quadkey.len()).map_err(|_| invalid())?;
        let mut x = 0_u32;
        let mut y = 0_u32;
        for (i, digit) in quadkey.bytes().enumerate() {
            let mask = 1_u32 << (quadkey.len() - 1 - i);
            match digit {
                b'0' => {}
                b'1' => x |= mask,
                b'2' => y |= mask,
                b'3' => {
                    x |= mask;
                    y |= mask;
                }
                _ => return Err(invalid()),
            }
        }
        TileKey::new(level, x, y)
    }
}
