use crate::config::FieldConfig;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("cannot build a particle field for an empty {0}x{1} frame")]
    EmptyFrame(usize, usize),
}

/// One particle per source pixel, stored as flat vertex attribute buffers.
///
/// Particle `i` is fixed to pixel `(i % width, i / width)` for the lifetime of
/// the field. `positions` and `colors` hold three floats per particle, `sizes`
/// one. The dirty flags tell a renderer which buffers changed since it last
/// consumed them.
#[derive(Debug, Clone)]
pub struct ParticleField {
    width: usize,
    height: usize,
    positions: Vec<f32>,
    colors: Vec<f32>,
    sizes: Vec<f32>,
    base_color: [f32; 3],
    pub positions_dirty: bool,
    pub colors_dirty: bool,
}

impl ParticleField {
    pub fn new(width: usize, height: usize, cfg: &FieldConfig) -> Result<Self, FieldError> {
        if width == 0 || height == 0 {
            return Err(FieldError::EmptyFrame(width, height));
        }
        let n = width * height;
        let half_w = width as f32 / 2.0;
        let top = height as f32 / cfg.centering;

        let mut positions = Vec::with_capacity(n * 3);
        for y in 0..height {
            for x in 0..width {
                positions.push(x as f32 - half_w);
                positions.push(-(y as f32) + top);
                positions.push(0.0);
            }
        }

        let mut colors = Vec::with_capacity(n * 3);
        for _ in 0..n {
            colors.extend_from_slice(&cfg.base_color);
        }

        Ok(Self {
            width,
            height,
            positions,
            colors,
            sizes: vec![cfg.particle_size; n],
            base_color: cfg.base_color,
            positions_dirty: true,
            colors_dirty: true,
        })
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn index_of(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn cell_of(&self, i: usize) -> (usize, usize) {
        (i % self.width, i / self.width)
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn base_color(&self) -> [f32; 3] {
        self.base_color
    }

    pub fn position(&self, i: usize) -> [f32; 3] {
        let o = i * 3;
        [self.positions[o], self.positions[o + 1], self.positions[o + 2]]
    }

    pub fn color(&self, i: usize) -> [f32; 3] {
        let o = i * 3;
        [self.colors[o], self.colors[o + 1], self.colors[o + 2]]
    }

    #[inline]
    pub fn set_z(&mut self, i: usize, z: f32) {
        self.positions[i * 3 + 2] = z;
    }

    #[inline]
    pub fn set_color(&mut self, i: usize, rgb: [f32; 3]) {
        let o = i * 3;
        self.colors[o..o + 3].copy_from_slice(&rgb);
    }

    /// Resets every particle to the baseline color.
    pub fn reset_colors(&mut self) {
        let base = self.base_color;
        for c in self.colors.chunks_exact_mut(3) {
            c.copy_from_slice(&base);
        }
        self.colors_dirty = true;
    }

    pub fn mark_dirty(&mut self, positions: bool, colors: bool) {
        self.positions_dirty |= positions;
        self.colors_dirty |= colors;
    }

    pub fn clear_dirty(&mut self) {
        self.positions_dirty = false;
        self.colors_dirty = false;
    }
}
