//! Raster errors

/// Error while playing back into a caller-owned buffer or decoding an image
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("unsupported pixel format")]
    UnsupportedFormat,

    #[error("stride {stride} is smaller than a row of {row_bytes} bytes")]
    InvalidStride { stride: usize, row_bytes: usize },

    #[error("buffer holds {actual} bytes, {required} required")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("raster target is empty")]
    EmptyTarget,

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("failed to allocate a {width}x{height} pixmap")]
    PixmapAllocation { width: u32, height: u32 },
}

/// Error while editing a tiling set
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TilingError {
    #[error("a tiling with scale {0} already exists")]
    DuplicateScale(f32),

    #[error("invalid contents scale {0}")]
    InvalidScale(f32),
}
