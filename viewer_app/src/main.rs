//! Model viewer demo
//!
//! Loads one textured OBJ model and renders it in a resizable window.

use glfw::{Action, Key, WindowEvent};
use vk_renderer::{Renderer, RendererConfig, Window};

const CONFIG_PATH: &str = "renderer.toml";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RendererConfig::load_or_default(CONFIG_PATH)?;

    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;

    let mut renderer = Renderer::new(&mut window, config.clone())?;
    renderer.load_model(&config.model_path, &config.texture_path)?;

    log::info!("Entering main loop");
    while !window.should_close() {
        window.poll_events();

        for event in window.flush_events() {
            match event {
                WindowEvent::FramebufferSize(_, _) => renderer.mark_resized(),
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                    window.set_should_close(true);
                }
                _ => {}
            }
        }

        renderer.draw_frame(&mut window)?;
    }

    // Let in-flight frames finish before anything is destroyed
    renderer.wait_idle()?;
    Ok(())
}
