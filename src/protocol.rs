use crate::rules::Ruleset;

/// Host → engine messages, processed strictly in arrival order at the start
/// of each engine tick. Fire-and-forget: the engine never replies directly.
#[derive(Debug, Clone)]
pub enum Command {
    /// Render surface was resized. Camera and grid are untouched; the view
    /// may clip until the host sends a new camera.
    Resize { width: u32, height: u32 },
    /// Overwrite camera state verbatim with host-computed values.
    Camera {
        scale: f32,
        offset_x: f32,
        offset_y: f32,
    },
    SetRunning { running: bool },
    /// Steps per second; negative means uncapped (one step per render tick).
    SetSpeed { speed: f64 },
    /// Install a replacement ruleset. Resets the grid and generation; the
    /// camera resets only if the grid dimensions changed.
    SetRuleset { ruleset: Ruleset },
    /// Paint cells directly, bypassing rule evaluation. Unknown tribe ids
    /// drop the whole command.
    Draw {
        tribe: String,
        cells: Vec<(i32, i32)>,
    },
}

/// Engine → host metrics, emitted every 15th generation while running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub generation: u64,
    /// Steps per second implied by the cost of the most recent step alone,
    /// not a smoothed average.
    pub sim_fps: f64,
}
