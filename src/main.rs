mod app;
mod camera;
mod engine;
mod grid;
mod interp;
mod protocol;
mod renderer;
mod rules;

use winit::event_loop::EventLoop;

fn main() {
    env_logger::init();

    log::info!("tribelife - multi-tribe cellular automaton");
    log::info!("Controls:");
    log::info!("  Space       - Pause / Resume");
    log::info!("  Up/Down     - Speed up / slow down");
    log::info!("  M           - Toggle uncapped speed");
    log::info!("  Left Drag   - Paint cells");
    log::info!("  Right Drag  - Pan");
    log::info!("  Scroll      - Zoom to cursor");
    log::info!("  0-9         - Select paint tribe (0 = dead)");
    log::info!("  N           - Next ruleset");
    log::info!("  R           - Randomize grid");
    log::info!("  C           - Clear grid");
    log::info!("  H           - Reset camera");
    log::info!("  Escape      - Quit");

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = app::App::new();
    event_loop.run_app(&mut app).expect("Event loop error");
}
