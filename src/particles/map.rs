//! Occupancy payload carried by a particle.
//!
//! The coordinator never looks inside a map: it only clones the `Arc`,
//! encodes it once per migrating source index and decodes it on the
//! receiving task. Matchers mutate it through [`Particle::map_mut`], which
//! copies on write when the map is still shared with another index.
//!
//! [`Particle::map_mut`]: super::Particle::map_mut

use prost::Message;
use thiserror::Error;

/// Largest grid accepted from config or from a peer.
pub const MAX_CELLS: u64 = 1 << 26;

/// Map payload that could not be rebuilt.
#[derive(Error, Debug)]
pub enum MapError {
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),

    #[error("grid {width}x{height} does not match {cells} cells")]
    Dimensions { width: u32, height: u32, cells: usize },

    #[error("grid {width}x{height} exceeds {} cells", MAX_CELLS)]
    TooLarge { width: u32, height: u32 },
}

/// Cell count of a `width_m` × `height_m` grid at `resolution`.
pub fn grid_cells(width_m: f32, height_m: f32, resolution: f32) -> u64 {
    let (width, height) = grid_dimensions(width_m, height_m, resolution);
    u64::from(width) * u64::from(height)
}

fn grid_dimensions(width_m: f32, height_m: f32, resolution: f32) -> (u32, u32) {
    let width = (width_m / resolution).ceil().max(1.0) as u32;
    let height = (height_m / resolution).ceil().max(1.0) as u32;
    (width, height)
}

/// Hit-count grid in a fixed world window.
#[derive(Clone, PartialEq, Message)]
pub struct ParticleMap {
    /// Width in cells
    #[prost(uint32, tag = "1")]
    pub width: u32,
    /// Height in cells
    #[prost(uint32, tag = "2")]
    pub height: u32,
    /// Cell size in meters
    #[prost(float, tag = "3")]
    pub resolution: f32,
    /// World X of cell (0, 0)
    #[prost(float, tag = "4")]
    pub origin_x: f32,
    /// World Y of cell (0, 0)
    #[prost(float, tag = "5")]
    pub origin_y: f32,
    /// Row-major hit counts, saturating at 255
    #[prost(bytes = "vec", tag = "6")]
    pub cells: Vec<u8>,
}

impl ParticleMap {
    /// Create an empty grid of `width_m` × `height_m` meters centered on the origin.
    ///
    /// Grids above [`MAX_CELLS`] are allocated without cells; every hit then
    /// falls outside.
    pub fn centered(width_m: f32, height_m: f32, resolution: f32) -> Self {
        let (width, height) = grid_dimensions(width_m, height_m, resolution);
        let len = (width as usize)
            .checked_mul(height as usize)
            .filter(|&n| n as u64 <= MAX_CELLS)
            .unwrap_or(0);
        Self {
            width,
            height,
            resolution,
            origin_x: -(width as f32 * resolution) / 2.0,
            origin_y: -(height as f32 * resolution) / 2.0,
            cells: vec![0; len],
        }
    }

    /// Convert world coordinates to a cell, if inside the grid.
    pub fn world_to_cell(&self, x: f32, y: f32) -> Option<(u32, u32)> {
        if self.resolution <= 0.0 {
            return None;
        }
        let cx = ((x - self.origin_x) / self.resolution).floor();
        let cy = ((y - self.origin_y) / self.resolution).floor();
        if cx < 0.0 || cy < 0.0 || cx >= self.width as f32 || cy >= self.height as f32 {
            return None;
        }
        Some((cx as u32, cy as u32))
    }

    /// Hit count of a cell.
    pub fn cell(&self, cx: u32, cy: u32) -> Option<u8> {
        if cx >= self.width || cy >= self.height {
            return None;
        }
        self.cells.get(self.index(cx, cy)).copied()
    }

    /// Register a hit at world coordinates. Returns false when outside the grid.
    pub fn mark_hit(&mut self, x: f32, y: f32) -> bool {
        let Some((cx, cy)) = self.world_to_cell(x, y) else {
            return false;
        };
        let idx = self.index(cx, cy);
        match self.cells.get_mut(idx) {
            Some(cell) => {
                *cell = cell.saturating_add(1);
                true
            }
            None => false,
        }
    }

    fn index(&self, cx: u32, cy: u32) -> usize {
        cy as usize * self.width as usize + cx as usize
    }

    /// Number of cells with at least one hit.
    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|&&c| c > 0).count()
    }

    /// Serialize for transfer to another task.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Rebuild a map received from another task.
    ///
    /// Rejects grids whose dimensions disagree with the cell payload or
    /// exceed [`MAX_CELLS`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MapError> {
        let map = Self::decode(bytes)?;
        let expected = u64::from(map.width) * u64::from(map.height);
        if expected > MAX_CELLS {
            return Err(MapError::TooLarge {
                width: map.width,
                height: map.height,
            });
        }
        if map.cells.len() as u64 != expected {
            return Err(MapError::Dimensions {
                width: map.width,
                height: map.height,
                cells: map.cells.len(),
            });
        }
        Ok(map)
    }
}
