// src/processing/grid.rs
use std::fmt;
use std::str::FromStr;

use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// Block size used when the inputs do not report a usable native block size.
pub const FALLBACK_BLOCK_SIZE: BlockSize = BlockSize {
    width: 1024,
    height: 1024,
};

/// A rectangular pixel window: offset `(x, y)` and size `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The window covering a whole raster.
    pub fn full((width, height): (usize, usize)) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn offset(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Block dimensions, written `WIDTHxHEIGHT` on the command line and in batch
/// files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockSize {
    pub width: usize,
    pub height: usize,
}

impl BlockSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for BlockSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid block dimension '{v}' in '{s}'"))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

impl TryFrom<String> for BlockSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlockSize> for String {
    fn from(value: BlockSize) -> Self {
        value.to_string()
    }
}

/// Partition of a raster into blocks, visited row-major with the last row and
/// column clipped to the raster edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    raster: (usize, usize),
    block: (usize, usize),
}

impl BlockGrid {
    /// Blocks larger than the raster are shrunk to it; zero dimensions become 1.
    pub fn new(raster: (usize, usize), block: BlockSize) -> Self {
        let block = (
            block.width.clamp(1, raster.0.max(1)),
            block.height.clamp(1, raster.1.max(1)),
        );
        Self { raster, block }
    }

    pub fn raster_size(&self) -> (usize, usize) {
        self.raster
    }

    pub fn block_size(&self) -> (usize, usize) {
        self.block
    }

    /// Number of block columns and rows.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.raster.0.div_ceil(self.block.0),
            self.raster.1.div_ceil(self.block.1),
        )
    }

    pub fn len(&self) -> usize {
        let (cols, rows) = self.counts();
        cols * rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        let (cols, rows) = self.counts();
        iproduct!(0..rows, 0..cols).map(move |(row, col)| {
            let x = col * self.block.0;
            let y = row * self.block.1;
            Window::new(
                x,
                y,
                self.block.0.min(self.raster.0 - x),
                self.block.1.min(self.raster.1 - y),
            )
        })
    }
}

/// Pick the streaming block size.
///
/// An explicit override always wins. Otherwise the native block size is used
/// when both inputs agree on a non-zero size; inputs resampled or retiled by
/// earlier steps often disagree, and those fall back to
/// [`FALLBACK_BLOCK_SIZE`].
pub fn choose_block_size(
    native1: (usize, usize),
    native2: (usize, usize),
    requested: Option<BlockSize>,
) -> BlockSize {
    if let Some(size) = requested {
        return size;
    }
    if native1 == native2 && native1.0 > 0 && native1.1 > 0 {
        BlockSize::new(native1.0, native1.1)
    } else {
        FALLBACK_BLOCK_SIZE
    }
}
