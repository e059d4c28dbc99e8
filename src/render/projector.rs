use crate::field::ParticleField;

/// Rasterizes particle buffers into an RGBA image through a fixed perspective
/// camera on the +z axis looking at the origin.
///
/// The camera distance is chosen so the field's height fills the vertical
/// field of view (with `fit` margin). Points nearer than `near` or farther than
/// `far` from the camera are culled, which is what makes the offscreen
/// sentinel invisible.
pub struct PointProjector {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    depth: Vec<f32>,
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub fit: f32,
    /// Screen pixels per unit of particle size at the `z = 0` plane.
    pub point_scale: f32,
    pub background: [u8; 3],
    drawn: usize,
    stale: bool,
}

impl PointProjector {
    pub fn new(width: usize, height: usize) -> Self {
        let mut p = Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            depth: Vec::new(),
            fov_deg: 45.0,
            near: 0.1,
            far: 10_000.0,
            fit: 1.1,
            point_scale: 0.05,
            background: [0x11, 0x11, 0x11],
            drawn: 0,
            stale: true,
        };
        p.resize(width, height);
        p
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        if (width, height) == (self.width, self.height) && !self.pixels.is_empty() {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels.resize(width * height * 4, 0);
        self.depth.resize(width * height, f32::INFINITY);
        self.stale = true;
        self.clear();
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Points that survived culling in the last projection.
    pub fn drawn(&self) -> usize {
        self.drawn
    }

    pub fn clear(&mut self) {
        let [r, g, b] = self.background;
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[r, g, b, 255]);
        }
        self.depth.fill(f32::INFINITY);
        self.drawn = 0;
    }

    /// Distance from the camera to the `z = 0` plane for `field`.
    pub fn camera_distance(&self, field: &ParticleField) -> f32 {
        let half_fov = (self.fov_deg.to_radians() / 2.0).max(1e-3);
        (field.height() as f32 / 2.0) / half_fov.tan() * self.fit
    }

    /// Redraws when the field changed (or the raster was resized) and returns
    /// the image.
    pub fn project(&mut self, field: &ParticleField) -> &[u8] {
        if !self.stale && !field.positions_dirty && !field.colors_dirty {
            return &self.pixels;
        }
        self.stale = false;
        self.clear();
        if self.width == 0 || self.height == 0 {
            return &self.pixels;
        }

        let half_fov = (self.fov_deg.to_radians() / 2.0).max(1e-3);
        let focal = (self.height as f32 / 2.0) / half_fov.tan();
        let cam = self.camera_distance(field);
        let (cx, cy) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        let (w, h) = (self.width as i64, self.height as i64);
        let max_side = self.width.max(self.height) as f32;

        let positions = field.positions();
        let colors = field.colors();
        let sizes = field.sizes();
        let mut drawn = 0usize;

        for i in 0..field.len() {
            let p = &positions[i * 3..i * 3 + 3];
            let d = cam - p[2];
            if !(d >= self.near && d <= self.far) {
                continue;
            }
            let sx = cx + p[0] * focal / d;
            let sy = cy - p[1] * focal / d;
            // Sized for the z = 0 plane, attenuated with depth.
            let side = (sizes[i] * self.point_scale * cam / d)
                .round()
                .clamp(1.0, max_side) as i64;
            let x0 = sx.floor() as i64 - side / 2;
            let y0 = sy.floor() as i64 - side / 2;
            if x0 + side <= 0 || y0 + side <= 0 || x0 >= w || y0 >= h {
                continue;
            }

            let c = &colors[i * 3..i * 3 + 3];
            let rgb = [to_u8(c[0]), to_u8(c[1]), to_u8(c[2])];
            let mut hit = false;
            for y in y0.max(0)..(y0 + side).min(h) {
                for x in x0.max(0)..(x0 + side).min(w) {
                    let k = (y * w + x) as usize;
                    if d < self.depth[k] {
                        self.depth[k] = d;
                        self.pixels[k * 4..k * 4 + 3].copy_from_slice(&rgb);
                        hit = true;
                    }
                }
            }
            drawn += usize::from(hit);
        }

        self.drawn = drawn;
        &self.pixels
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
