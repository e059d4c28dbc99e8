use crate::video::VideoSource;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Mirrored RGBA snapshot of one video frame. Cloning shares the pixels.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    pub fn from_rgba(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        if data.len() != width.checked_mul(height)?.checked_mul(4)? {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::from(data),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Unweighted channel mean, `0.0..=255.0`, of the pixel at row-major index `i`.
    #[inline]
    pub fn luminance(&self, i: usize) -> f32 {
        let o = i * 4;
        (self.data[o] as f32 + self.data[o + 1] as f32 + self.data[o + 2] as f32) / 3.0
    }

    /// True when both handles share the same capture.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("video source has no active stream")]
    SourceUnavailable,
    #[error("video resolution changed from {}x{} to {}x{}", expected.0, expected.1, actual.0, actual.1)]
    ResolutionChanged {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Captures frames from a [`VideoSource`] and keeps the last one for reuse.
#[derive(Debug, Default)]
pub struct FrameSampler {
    surface: Vec<u8>,
    cache: Option<PixelBuffer>,
    locked: Option<(usize, usize)>,
    captures: u64,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(
        &mut self,
        source: &mut dyn VideoSource,
        use_cache: bool,
    ) -> Result<PixelBuffer, SampleError> {
        let (w, h) = match source.dimensions() {
            Some((w, h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(SampleError::SourceUnavailable),
        };
        if let Some(expected) = self.locked {
            if expected != (w, h) {
                return Err(SampleError::ResolutionChanged {
                    expected,
                    actual: (w, h),
                });
            }
        }

        if use_cache {
            if let Some(cached) = &self.cache {
                return Ok(cached.clone());
            }
        }

        let row = w * 4;
        self.surface.resize(row * h, 0);
        source.draw(&mut self.surface, w, h);

        let mut mirrored = vec![0u8; row * h];
        for (src_row, dst_row) in self
            .surface
            .chunks_exact(row)
            .zip(mirrored.chunks_exact_mut(row))
        {
            for (s, d) in src_row.chunks_exact(4).rev().zip(dst_row.chunks_exact_mut(4)) {
                d.copy_from_slice(s);
            }
        }

        let buffer = PixelBuffer {
            width: w,
            height: h,
            data: Arc::from(mirrored),
        };
        self.locked = Some((w, h));
        self.cache = Some(buffer.clone());
        self.captures += 1;
        Ok(buffer)
    }

    pub fn cached(&self) -> Option<&PixelBuffer> {
        self.cache.as_ref()
    }

    pub fn resolution(&self) -> Option<(usize, usize)> {
        self.locked
    }

    /// Number of real captures performed so far.
    pub fn captures(&self) -> u64 {
        self.captures
    }
}

/// Whether the cached frame may be reused at `elapsed`. Alternates every
/// `bucket_ms`, starting with a reuse bucket.
pub fn cache_bucket(elapsed: Duration, bucket_ms: u64) -> bool {
    let bucket = elapsed.as_millis() / u128::from(bucket_ms.max(1));
    bucket % 2 == 0
}
