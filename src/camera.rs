/// Hard cap on zoom: one cell never exceeds this many pixels.
pub const MAX_SCALE: f32 = 128.0;

/// Multiplier applied per zoom step.
pub const ZOOM_FACTOR: f32 = 1.15;

/// Camera state mapping world cell-space to screen pixels.
///
/// `scale` is pixels per cell; `offset_x`/`offset_y` are the world cell
/// coordinates of the top-left screen corner. Offsets are working values and
/// may drift outside the grid; they are wrapped modulo the grid dimensions
/// wherever they meet the toroidal grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Lower zoom bound for interactive zooming.
    pub min_scale: f32,
}

/// Uniform data sent to the GPU. Field order matches the WGSL struct.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub canvas: [f32; 2],
    pub grid: [f32; 2],
    pub offset: [f32; 2],
    pub scale: f32,
    pub _pad0: f32,
}

impl Camera {
    /// Reset view: the grid covers the whole viewport (clipping the longer
    /// axis), anchored at the world origin.
    pub fn fit_cover(viewport_w: f32, viewport_h: f32, cols: u32, rows: u32) -> Self {
        let min_scale = (viewport_w / cols as f32).max(viewport_h / rows as f32);
        Self {
            scale: min_scale,
            offset_x: 0.0,
            offset_y: 0.0,
            min_scale,
        }
    }

    /// The largest scale at which the whole grid is still visible. Used as
    /// the lower zoom bound after interactive resizes, not for resets.
    pub fn contain_scale(viewport_w: f32, viewport_h: f32, cols: u32, rows: u32) -> f32 {
        (viewport_w / cols as f32).min(viewport_h / rows as f32)
    }

    /// Recompute the zoom bounds for a new viewport, keeping the current
    /// view (which may now clip).
    pub fn update_bounds(&mut self, viewport_w: f32, viewport_h: f32, cols: u32, rows: u32) {
        self.min_scale = Self::contain_scale(viewport_w, viewport_h, cols, rows);
        self.scale = self.scale.clamp(self.min_scale, MAX_SCALE);
    }

    /// Zoom by one step (positive = in), keeping the world point under the
    /// pivot screen coordinate visually fixed.
    pub fn zoom(&mut self, direction: i32, pivot_x: f32, pivot_y: f32) {
        let world_x = pivot_x / self.scale + self.offset_x;
        let world_y = pivot_y / self.scale + self.offset_y;

        let factor = if direction > 0 {
            ZOOM_FACTOR
        } else {
            1.0 / ZOOM_FACTOR
        };
        self.scale = (self.scale * factor).clamp(self.min_scale, MAX_SCALE);

        self.offset_x = world_x - pivot_x / self.scale;
        self.offset_y = world_y - pivot_y / self.scale;
    }

    /// Pan by a screen-pixel delta, wrapping toroidally so panning never
    /// runs out of world.
    pub fn pan(&mut self, dx_px: f32, dy_px: f32, cols: u32, rows: u32) {
        self.offset_x = (self.offset_x + dx_px / self.scale).rem_euclid(cols as f32);
        self.offset_y = (self.offset_y + dy_px / self.scale).rem_euclid(rows as f32);
    }

    /// Screen pixel to world cell coordinate (fractional, unwrapped).
    pub fn screen_to_world(&self, px: f32, py: f32) -> (f32, f32) {
        (
            px / self.scale + self.offset_x,
            py / self.scale + self.offset_y,
        )
    }

    /// Build the GPU uniform for the current camera and surface size.
    pub fn uniform(&self, canvas_w: f32, canvas_h: f32, cols: u32, rows: u32) -> CameraUniform {
        CameraUniform {
            canvas: [canvas_w, canvas_h],
            grid: [cols as f32, rows as f32],
            offset: [self.offset_x, self.offset_y],
            scale: self.scale,
            _pad0: 0.0,
        }
    }
}
