use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

use rayon::prelude::*;

use crate::camera::Camera;
use crate::grid::Grid;
use crate::interp::CompiledRuleset;
use crate::protocol::{Command, Metrics};
use crate::rules::{Ruleset, RulesetError};

/// Generations between metrics messages.
const METRICS_INTERVAL: u64 = 15;

/// The whole simulation session: compiled rules, grid, camera, and cadence
/// state, owned by one thread of control and driven by `tick` once per
/// render frame. Replaces any notion of module-level globals; dropping the
/// engine tears the session down completely.
pub struct Engine {
    ruleset: CompiledRuleset,
    grid: Grid,
    /// Recycled next-generation buffer; swapped with the grid each step so
    /// stepping allocates nothing.
    scratch: Vec<u8>,
    generation: u64,
    camera: Camera,
    running: bool,
    /// Milliseconds between steps; 0 means step every tick.
    target_step_interval: f64,
    last_step: Instant,
    sim_fps: f64,
    viewport: (f32, f32),
    /// Set when a ruleset install changed the grid dimensions, so the
    /// renderer knows to rebuild its per-cell buffers.
    layout_changed: bool,
    commands: Receiver<Command>,
    metrics: Sender<Metrics>,
}

impl Engine {
    /// Install the initial ruleset and camera. Fails fast on an invalid
    /// ruleset so the host learns about it before the loop starts.
    pub fn new(
        ruleset: &Ruleset,
        viewport: (u32, u32),
        speed: f64,
        running: bool,
        commands: Receiver<Command>,
        metrics: Sender<Metrics>,
    ) -> Result<Self, RulesetError> {
        let compiled = CompiledRuleset::compile(ruleset)?;
        let viewport = (viewport.0 as f32, viewport.1 as f32);
        let camera = Camera::fit_cover(viewport.0, viewport.1, compiled.cols, compiled.rows);
        let grid = Grid::new(compiled.cols, compiled.rows, compiled.dead);
        let scratch = grid.cells.clone();

        Ok(Self {
            ruleset: compiled,
            grid,
            scratch,
            generation: 0,
            camera,
            running,
            target_step_interval: step_interval(speed),
            last_step: Instant::now(),
            sim_fps: 0.0,
            viewport,
            layout_changed: false,
            commands,
            metrics,
        })
    }

    /// One cooperative loop iteration: drain pending commands in arrival
    /// order, then perform at most one simulation step if it is due.
    /// Rendering happens outside, every tick, regardless of stepping.
    pub fn tick(&mut self, now: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            self.process(command);
        }

        if !self.running {
            return;
        }
        let elapsed_ms = now.duration_since(self.last_step).as_secs_f64() * 1000.0;
        if self.target_step_interval <= 0.0 || elapsed_ms >= self.target_step_interval {
            let start = Instant::now();
            self.step();
            let cost_ms = start.elapsed().as_secs_f64() * 1000.0;
            // Clamp so a clock-quantized 0ms step cannot report infinity.
            self.sim_fps = 1000.0 / cost_ms.max(0.001);
            self.last_step = now;

            if self.generation % METRICS_INTERVAL == 0 {
                let _ = self.metrics.send(Metrics {
                    generation: self.generation,
                    sim_fps: self.sim_fps,
                });
            }
        }
    }

    /// Advance one generation: evaluate every cell against the current grid
    /// into the scratch buffer, then swap. Cells only ever see pre-step
    /// neighbors, and rows are independent, so they are evaluated in
    /// parallel.
    pub fn step(&mut self) {
        let ruleset = &self.ruleset;
        let grid = &self.grid;
        let cols = grid.cols as usize;

        self.scratch
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = ruleset.apply(grid, x as i32, y as i32);
                }
            });

        std::mem::swap(&mut self.grid.cells, &mut self.scratch);
        self.generation += 1;
    }

    fn process(&mut self, command: Command) {
        match command {
            Command::Resize { width, height } => {
                self.viewport = (width as f32, height as f32);
            }
            Command::Camera {
                scale,
                offset_x,
                offset_y,
            } => {
                self.camera.scale = scale;
                self.camera.offset_x = offset_x;
                self.camera.offset_y = offset_y;
            }
            Command::SetRunning { running } => {
                self.running = running;
            }
            Command::SetSpeed { speed } => {
                self.target_step_interval = step_interval(speed);
            }
            Command::SetRuleset { ruleset } => match CompiledRuleset::compile(&ruleset) {
                Ok(compiled) => self.install(compiled),
                Err(err) => log::warn!("replacement ruleset rejected: {err}"),
            },
            Command::Draw { tribe, cells } => self.paint(&tribe, &cells),
        }
    }

    /// Swap in a freshly compiled ruleset: new dead-filled grid, generation
    /// 0, camera reset only when the dimensions changed.
    fn install(&mut self, compiled: CompiledRuleset) {
        let dims_changed =
            compiled.cols != self.ruleset.cols || compiled.rows != self.ruleset.rows;

        self.grid = Grid::new(compiled.cols, compiled.rows, compiled.dead);
        self.scratch = self.grid.cells.clone();
        self.generation = 0;
        self.ruleset = compiled;

        if dims_changed {
            self.camera = Camera::fit_cover(
                self.viewport.0,
                self.viewport.1,
                self.ruleset.cols,
                self.ruleset.rows,
            );
            self.layout_changed = true;
        }
    }

    /// Direct cell overwrites, not gated by rule evaluation. An id the
    /// current install does not know drops the whole command; the host may
    /// legitimately race a ruleset swap.
    fn paint(&mut self, tribe: &str, cells: &[(i32, i32)]) {
        let Some(index) = self.ruleset.tribe_index(tribe) else {
            log::debug!("draw command dropped: unknown tribe '{tribe}'");
            return;
        };
        for &(x, y) in cells {
            self.grid.set(x, y, index);
        }
    }

    /// True once after an install changed the grid dimensions.
    pub fn take_layout_changed(&mut self) -> bool {
        std::mem::take(&mut self.layout_changed)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn ruleset(&self) -> &CompiledRuleset {
        &self.ruleset
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn running(&self) -> bool {
        self.running
    }
}

/// Target milliseconds between steps; negative speed means uncapped.
fn step_interval(speed: f64) -> f64 {
    if speed < 0.0 {
        0.0
    } else {
        1000.0 / speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Clause, Rule, Tribe};
    use std::sync::mpsc;
    use std::time::Duration;

    fn spawn_engine(
        ruleset: Ruleset,
        speed: f64,
        running: bool,
    ) -> (Engine, mpsc::Sender<Command>, mpsc::Receiver<Metrics>) {
        let (command_tx, command_rx) = mpsc::channel();
        let (metrics_tx, metrics_rx) = mpsc::channel();
        let engine = Engine::new(&ruleset, (800, 600), speed, running, command_rx, metrics_tx)
            .expect("valid ruleset");
        (engine, command_tx, metrics_rx)
    }

    fn small_conway(cols: u32, rows: u32) -> Ruleset {
        let mut rs = Ruleset::conway();
        rs.cols = cols;
        rs.rows = rows;
        rs
    }

    #[test]
    fn test_blinker_transition() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(5, 5), -1.0, false);
        tx.send(Command::Draw {
            tribe: "classic".to_string(),
            cells: vec![(1, 2), (2, 2), (3, 2)],
        })
        .unwrap();
        engine.tick(Instant::now());
        engine.step();

        // Ends die (1 neighbor), center survives (2), cells above and below
        // the center are born (3).
        assert_eq!(engine.grid().get(1, 2), 0);
        assert_eq!(engine.grid().get(3, 2), 0);
        assert_eq!(engine.grid().get(2, 2), 1);
        assert_eq!(engine.grid().get(2, 1), 1);
        assert_eq!(engine.grid().get(2, 3), 1);
        assert_eq!(engine.grid().population(0), 3);

        // And back again: a blinker has period two.
        engine.step();
        assert_eq!(engine.grid().get(1, 2), 1);
        assert_eq!(engine.grid().get(2, 2), 1);
        assert_eq!(engine.grid().get(3, 2), 1);
        assert_eq!(engine.grid().population(0), 3);
    }

    #[test]
    fn test_parallel_step_matches_sequential() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(16, 12), -1.0, false);
        let cells: Vec<(i32, i32)> = (0..16 * 12)
            .filter(|i| i % 3 == 0 || i % 7 == 0)
            .map(|i| (i % 16, i / 16))
            .collect();
        tx.send(Command::Draw {
            tribe: "classic".to_string(),
            cells,
        })
        .unwrap();
        engine.tick(Instant::now());

        let before = engine.grid().clone();
        let mut expected = before.clone();
        for y in 0..before.rows as i32 {
            for x in 0..before.cols as i32 {
                expected.set(x, y, engine.ruleset().apply(&before, x, y));
            }
        }

        engine.step();
        assert_eq!(engine.grid().cells, expected.cells);
    }

    #[test]
    fn test_paint_is_idempotent() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        tx.send(Command::Draw {
            tribe: "classic".to_string(),
            cells: vec![(3, 3)],
        })
        .unwrap();
        engine.tick(Instant::now());
        let once = engine.grid().clone();

        tx.send(Command::Draw {
            tribe: "classic".to_string(),
            cells: vec![(3, 3)],
        })
        .unwrap();
        engine.tick(Instant::now());
        assert_eq!(engine.grid(), &once);
    }

    #[test]
    fn test_paint_wraps_coordinates() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        tx.send(Command::Draw {
            tribe: "classic".to_string(),
            cells: vec![(-1, -1), (8, 8)],
        })
        .unwrap();
        engine.tick(Instant::now());
        assert_eq!(engine.grid().get(7, 7), 1);
        assert_eq!(engine.grid().get(0, 0), 1);
    }

    #[test]
    fn test_unknown_tribe_draw_is_dropped() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        tx.send(Command::Draw {
            tribe: "ghost".to_string(),
            cells: vec![(1, 1)],
        })
        .unwrap();
        engine.tick(Instant::now());
        assert_eq!(engine.grid().population(0), 0);
    }

    #[test]
    fn test_uncapped_speed_steps_every_tick() {
        let (mut engine, _tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, true);
        let base = Instant::now();
        engine.tick(base);
        engine.tick(base + Duration::from_micros(1));
        assert_eq!(engine.generation(), 2);
    }

    #[test]
    fn test_capped_speed_waits_for_interval() {
        // 10 steps/sec = 100ms between steps.
        let (mut engine, _tx, _rx) = spawn_engine(small_conway(8, 8), 10.0, true);
        let base = Instant::now();
        engine.last_step = base;

        engine.tick(base + Duration::from_millis(50));
        assert_eq!(engine.generation(), 0);
        engine.tick(base + Duration::from_millis(150));
        assert_eq!(engine.generation(), 1);
        engine.tick(base + Duration::from_millis(160));
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_paused_engine_never_steps() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        let base = Instant::now();
        engine.tick(base + Duration::from_secs(10));
        assert_eq!(engine.generation(), 0);

        tx.send(Command::SetRunning { running: true }).unwrap();
        engine.tick(base + Duration::from_secs(11));
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_set_speed_uncapped_resets_interval() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), 10.0, true);
        tx.send(Command::SetSpeed { speed: -1.0 }).unwrap();
        let base = Instant::now();
        engine.last_step = base;
        // Would be far too early at 10 steps/sec, but uncapped steps anyway.
        engine.tick(base + Duration::from_micros(1));
        assert_eq!(engine.target_step_interval, 0.0);
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_metrics_every_fifteen_generations() {
        let (mut engine, _tx, rx) = spawn_engine(small_conway(8, 8), -1.0, true);
        let base = Instant::now();
        for i in 0..30 {
            engine.tick(base + Duration::from_micros(i));
        }
        let metrics: Vec<Metrics> = rx.try_iter().collect();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].generation, 15);
        assert_eq!(metrics[1].generation, 30);
        assert!(metrics[0].sim_fps > 0.0);
    }

    #[test]
    fn test_set_ruleset_same_dims_preserves_camera() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        tx.send(Command::Camera {
            scale: 42.0,
            offset_x: 3.5,
            offset_y: 1.5,
        })
        .unwrap();
        tx.send(Command::SetRuleset {
            ruleset: small_conway(8, 8),
        })
        .unwrap();
        engine.tick(Instant::now());

        assert_eq!(engine.camera().scale, 42.0);
        assert_eq!(engine.camera().offset_x, 3.5);
        assert!(!engine.take_layout_changed());
        assert_eq!(engine.generation(), 0);
    }

    #[test]
    fn test_set_ruleset_new_dims_resets_camera() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        tx.send(Command::Camera {
            scale: 42.0,
            offset_x: 3.5,
            offset_y: 1.5,
        })
        .unwrap();
        tx.send(Command::SetRuleset {
            ruleset: small_conway(16, 8),
        })
        .unwrap();
        engine.tick(Instant::now());

        let expected = Camera::fit_cover(800.0, 600.0, 16, 8);
        assert_eq!(engine.camera(), &expected);
        assert!(engine.take_layout_changed());
        assert!(!engine.take_layout_changed());
    }

    #[test]
    fn test_set_ruleset_clears_grid_and_generation() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, true);
        let base = Instant::now();
        engine.tick(base);
        assert_eq!(engine.generation(), 1);

        tx.send(Command::SetRuleset {
            ruleset: small_conway(8, 8),
        })
        .unwrap();
        engine.tick(base + Duration::from_micros(1));

        // Tick processed the install first, then stepped the fresh grid.
        assert_eq!(engine.generation(), 1);
        assert_eq!(engine.grid().population(0), 0);
    }

    #[test]
    fn test_invalid_replacement_ruleset_is_dropped() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        let bad = Ruleset {
            cols: 8,
            rows: 8,
            tribes: vec![Tribe::dead()],
            rules: vec![Rule::new(Clause::is(&["ghost"]), "dead")],
        };
        tx.send(Command::SetRuleset { ruleset: bad }).unwrap();
        engine.tick(Instant::now());
        // Old install survives.
        assert_eq!(engine.ruleset().tribe_index("classic"), Some(1));
    }

    #[test]
    fn test_resize_keeps_camera_and_grid() {
        let (mut engine, tx, _rx) = spawn_engine(small_conway(8, 8), -1.0, false);
        tx.send(Command::Draw {
            tribe: "classic".to_string(),
            cells: vec![(0, 0)],
        })
        .unwrap();
        let before = engine.camera().clone();
        tx.send(Command::Resize {
            width: 400,
            height: 300,
        })
        .unwrap();
        engine.tick(Instant::now());

        assert_eq!(engine.camera(), &before);
        assert_eq!(engine.grid().population(0), 1);

        // But a later dimension-changing install fits the new viewport.
        tx.send(Command::SetRuleset {
            ruleset: small_conway(16, 8),
        })
        .unwrap();
        engine.tick(Instant::now());
        assert_eq!(engine.camera(), &Camera::fit_cover(400.0, 300.0, 16, 8));
    }

    #[test]
    fn test_init_rejects_invalid_ruleset() {
        let (_tx, command_rx) = mpsc::channel::<Command>();
        let (metrics_tx, _rx) = mpsc::channel();
        let bad = Ruleset {
            cols: 8,
            rows: 8,
            tribes: vec![],
            rules: vec![],
        };
        assert!(Engine::new(&bad, (800, 600), -1.0, false, command_rx, metrics_tx).is_err());
    }

    #[test]
    fn test_immigration_majority_birth() {
        let (mut engine, tx, _rx) = spawn_engine(Ruleset::immigration(), -1.0, false);
        // Two orange parents and one blue around (2, 2).
        tx.send(Command::Draw {
            tribe: "orange".to_string(),
            cells: vec![(1, 1), (3, 1)],
        })
        .unwrap();
        tx.send(Command::Draw {
            tribe: "blue".to_string(),
            cells: vec![(2, 3)],
        })
        .unwrap();
        engine.tick(Instant::now());
        engine.step();

        let orange = engine.ruleset().tribe_index("orange").unwrap();
        assert_eq!(engine.grid().get(2, 2), orange);
    }
}
