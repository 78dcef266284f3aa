//! Tests against a running X server.
//!
//! They are ignored by default; run them with `cargo test -- --ignored` under Xvfb or a nested
//! server.

use std::{
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use x11_windowing::backend::x11::{
    BackendConfig, WindowBuilder, WindowState, X11Backend, X11Event, INCR_CHUNK_SIZE,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Processes events until `done` holds or a second passes.
fn pump(backend: &mut X11Backend, mut done: impl FnMut(&mut X11Backend) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        backend
            .wait_events(Some(Duration::from_millis(20)), |_| {})
            .unwrap();
        if done(backend) {
            return;
        }
    }
}

/// Owns the clipboard from a second connection until told to stop.
fn serve_clipboard(text: String) -> (mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut owner = X11Backend::new().unwrap();
        owner.set_clipboard(&text).unwrap();
        ready_tx.send(()).unwrap();

        while stop_rx.try_recv().is_err() {
            owner
                .wait_events(Some(Duration::from_millis(10)), |_| {})
                .unwrap();
        }
    });
    ready_rx.recv().unwrap();
    (stop_tx, handle)
}

fn read_from_other_client(text: &str) -> String {
    let (stop, handle) = serve_clipboard(text.to_owned());
    let mut reader = X11Backend::with_config(
        BackendConfig::new()
            .selection_timeout(Duration::from_secs(2))
            .max_selection_bytes(16 * 1024 * 1024),
    )
    .unwrap();
    let result = reader.clipboard().unwrap();
    stop.send(()).unwrap();
    handle.join().unwrap();
    result
}

#[test]
#[ignore = "needs an X server"]
fn clipboard_round_trip_within_one_connection() {
    init_logging();
    let mut backend = X11Backend::new().unwrap();
    backend.set_clipboard("héllo wörld").unwrap();
    assert_eq!(backend.clipboard().unwrap(), "héllo wörld");

    backend.set_clipboard("").unwrap();
    assert_eq!(backend.clipboard().unwrap(), "");
}

#[test]
#[ignore = "needs an X server"]
fn clipboard_between_connections() {
    init_logging();
    assert_eq!(read_from_other_client("héllo wörld"), "héllo wörld");
    assert_eq!(read_from_other_client(""), "");
}

#[test]
#[ignore = "needs an X server"]
fn clipboard_incremental_transfer() {
    init_logging();
    let text: String = "0123456789abcdef"
        .chars()
        .cycle()
        .take(INCR_CHUNK_SIZE * 3 + 17)
        .collect();
    assert_eq!(read_from_other_client(&text), text);
}

#[test]
#[ignore = "needs an X server"]
fn hide_and_show_keep_geometry() {
    init_logging();
    let mut backend = X11Backend::new().unwrap();
    let window = backend
        .create_window(WindowBuilder::new().title("geometry").size(320, 240).position(40, 50))
        .unwrap();
    pump(&mut backend, |backend| backend.is_visible(window).unwrap());
    let before = backend.size(window).unwrap();

    backend.hide(window).unwrap();
    pump(&mut backend, |backend| !backend.is_visible(window).unwrap());
    assert_eq!(backend.state(window).unwrap(), WindowState::Unmapped);

    backend.show(window).unwrap();
    pump(&mut backend, |backend| backend.is_visible(window).unwrap());
    assert_eq!(backend.size(window).unwrap(), before);

    backend.destroy_window(window).unwrap();
}

#[test]
#[ignore = "needs an X server"]
fn geometry_handle_follows_resizes() {
    init_logging();
    let mut backend = X11Backend::new().unwrap();
    let window = backend
        .create_window(WindowBuilder::new().title("resize").size(200, 200))
        .unwrap();
    let handle = backend.geometry_handle(window).unwrap();

    backend.set_size(window, (300, 150).into()).unwrap();
    let mut resized = false;
    let deadline = Instant::now() + Duration::from_secs(1);
    while !resized && Instant::now() < deadline {
        backend
            .wait_events(Some(Duration::from_millis(20)), |event| {
                if let X11Event::Resized { size, .. } = event {
                    resized = size == (300, 150).into();
                }
            })
            .unwrap();
    }
    if resized {
        assert_eq!(handle.size(), (300, 150).into());
    }
    backend.destroy_window(window).unwrap();
}

#[test]
#[ignore = "needs an X server"]
fn monitor_polling_is_idempotent() {
    init_logging();
    let mut backend = X11Backend::new().unwrap();
    assert!(!backend.monitors().is_empty());
    assert!(backend.poll_monitors().unwrap().is_empty());
    assert!(backend.poll_monitors().unwrap().is_empty());
}

#[test]
#[ignore = "needs an X server"]
fn video_mode_set_and_restore() {
    init_logging();
    let mut backend = X11Backend::new().unwrap();
    let Some(monitor) = backend.primary_monitor() else {
        return;
    };
    let original = backend.video_mode(monitor).unwrap();
    let modes = backend.video_modes(monitor).unwrap();
    assert!(modes.contains(&original));

    if let Some(other) = modes.iter().find(|mode| **mode != original) {
        backend.set_video_mode(monitor, other).unwrap();
        backend.restore_video_mode(monitor).unwrap();
        assert_eq!(backend.video_mode(monitor).unwrap(), original);
    }
}

#[test]
#[ignore = "needs an X server"]
fn waker_interrupts_wait() {
    init_logging();
    let mut backend = X11Backend::new().unwrap();
    let waker = backend.waker();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        waker.wake().unwrap();
    });

    let start = Instant::now();
    backend.wait_events(Some(Duration::from_secs(10)), |_| {}).unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();
}
