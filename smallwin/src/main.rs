use clap::Parser;
use tracing::{info, warn};
use x11_windowing::backend::{
    input::KeyState,
    x11::{CursorMode, CursorShape, Key, WindowBuilder, X11Backend, X11Event},
};

/// A single window showing what the X11 backend reports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Title of the window
    #[arg(short, long, default_value = "smallwin")]
    title: String,
    #[arg(long, default_value_t = 800)]
    width: i32,
    #[arg(long, default_value_t = 600)]
    height: i32,
    /// Start fullscreen on the primary monitor
    #[arg(short, long)]
    fullscreen: bool,
    /// Print every event
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().init();
    }
    let cli = Cli::parse();

    let mut backend = X11Backend::new()?;
    backend.set_error_callback(|kind, description| warn!(%kind, "{}", description));

    for monitor in backend.monitors() {
        info!(
            name = backend.monitor_name(monitor)?,
            mode = ?backend.video_mode(monitor)?,
            "Monitor"
        );
    }

    let mut builder = WindowBuilder::new().title(&cli.title).size(cli.width, cli.height);
    if cli.fullscreen {
        if let Some(monitor) = backend.primary_monitor() {
            builder = builder.fullscreen(monitor, true);
        }
    }
    let window = backend.create_window(builder)?;
    let hand = backend.create_standard_cursor(CursorShape::Pointer)?;
    backend.set_cursor(window, Some(hand))?;

    info!("Escape quits, F11 toggles fullscreen, D toggles the disabled cursor, C and V use the clipboard");

    let mut running = true;
    while running {
        let mut events = Vec::new();
        backend.wait_events(None, |event| events.push(event))?;

        for event in events {
            if cli.verbose {
                info!(?event, "Event");
            }
            match event {
                X11Event::CloseRequested { .. } => running = false,
                X11Event::FileDrop { paths, .. } => {
                    for path in paths {
                        info!(path = %path.display(), "Dropped");
                    }
                }
                X11Event::Key {
                    key: Some(key),
                    state: KeyState::Pressed,
                    ..
                } => match key {
                    Key::Escape => running = false,
                    Key::F11 => {
                        let monitor = match backend.fullscreen_monitor(window)? {
                            Some(_) => None,
                            None => backend.primary_monitor(),
                        };
                        backend.set_fullscreen(window, monitor, true)?;
                    }
                    Key::D => {
                        let mode = match backend.cursor_mode(window)? {
                            CursorMode::Disabled => CursorMode::Normal,
                            _ => CursorMode::Disabled,
                        };
                        backend.set_cursor_mode(window, mode)?;
                    }
                    Key::C => backend.set_clipboard(&cli.title)?,
                    Key::V => match backend.clipboard() {
                        Ok(text) => info!(%text, "Clipboard"),
                        Err(err) => warn!("No clipboard contents: {}", err),
                    },
                    _ => {}
                },
                _ => {}
            }
        }
    }

    backend.destroy_window(window)?;
    backend.shutdown();
    Ok(())
}
