//! Clearer lifecycle tests.
//!
//! Clearers run on threads in this process against an in-memory clipboard,
//! and are cancelled through their real FIFOs.

mod common;

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use mnu_core::clipboard::{send_cancel, ClearOutcome, Clearer, ClipboardHandoff, MemoryClipboard};
use mnu_core::state::StateDir;
use mnu_core::Result;
use uuid::Uuid;

use common::{temp_state, wait_for};

/// Start a clearer on a thread and wait until it owns the clipboard.
fn spawn_clearer(
    state: &StateDir,
    clipboard: &MemoryClipboard,
    secret: &'static str,
    ttl: Duration,
) -> (Uuid, JoinHandle<Result<ClearOutcome>>) {
    let token = Uuid::new_v4();
    let clearer = Clearer::new(state.clone(), token, ttl, clipboard.clone());
    let handle = std::thread::spawn(move || clearer.run(secret.as_bytes()));

    let fifo = state.clearer_fifo(&token);
    assert!(
        wait_for(Duration::from_secs(5), || {
            fifo.exists() && clipboard.contents().as_deref() == Some(secret)
        }),
        "clearer never took over the clipboard"
    );
    (token, handle)
}

#[test]
fn test_cancel_leaves_clipboard_untouched() {
    let (_temp, state) = temp_state();
    let clipboard = MemoryClipboard::new();

    let (token, handle) = spawn_clearer(&state, &clipboard, "p@ss", Duration::from_secs(30));
    assert_eq!(clipboard.contents().as_deref(), Some("p@ss"));

    let started = Instant::now();
    assert!(send_cancel(&state.clearer_fifo(&token)));
    let outcome = handle.join().unwrap().unwrap();

    assert_eq!(outcome, ClearOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(clipboard.contents().as_deref(), Some("p@ss"));
    assert!(!state.clearer_fifo(&token).exists());
}

#[test]
fn test_external_change_is_not_wiped() {
    let (_temp, state) = temp_state();
    let clipboard = MemoryClipboard::new();

    let (_token, handle) = spawn_clearer(&state, &clipboard, "p@ss", Duration::from_millis(300));
    clipboard.set("copied by the user");

    let outcome = handle.join().unwrap().unwrap();
    assert_eq!(outcome, ClearOutcome::Superseded);
    assert_eq!(clipboard.contents().as_deref(), Some("copied by the user"));
}

#[test]
fn test_second_handoff_cancels_first() {
    let (_temp, state) = temp_state();
    let clipboard = MemoryClipboard::new();

    let (first, first_handle) =
        spawn_clearer(&state, &clipboard, "p@ss", Duration::from_millis(1200));
    assert_eq!(clipboard.contents().as_deref(), Some("p@ss"));

    std::thread::sleep(Duration::from_millis(300));
    assert!(send_cancel(&state.clearer_fifo(&first)));
    let (_second, second_handle) =
        spawn_clearer(&state, &clipboard, "otherSecret", Duration::from_millis(2000));
    assert_eq!(clipboard.contents().as_deref(), Some("otherSecret"));

    assert_eq!(first_handle.join().unwrap().unwrap(), ClearOutcome::Cancelled);
    // The first clearer's deadline has passed by now; its cancel kept it quiet.
    std::thread::sleep(Duration::from_millis(1000));
    assert_eq!(clipboard.contents().as_deref(), Some("otherSecret"));

    assert_eq!(second_handle.join().unwrap().unwrap(), ClearOutcome::Wiped);
    assert_eq!(clipboard.contents().as_deref(), Some(""));
}

#[test]
fn test_rapid_handoffs_wipe_once() {
    let (_temp, state) = temp_state();
    let clipboard = MemoryClipboard::new();
    let secrets = ["one", "two", "three", "four", "five"];

    let mut handles = Vec::new();
    let mut previous: Option<Uuid> = None;
    for secret in secrets {
        if let Some(token) = previous {
            assert!(send_cancel(&state.clearer_fifo(&token)));
        }
        let (token, handle) = spawn_clearer(&state, &clipboard, secret, Duration::from_millis(500));
        previous = Some(token);
        handles.push(handle);
    }

    let outcomes: Vec<ClearOutcome> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let wiped = outcomes.iter().filter(|o| **o == ClearOutcome::Wiped).count();
    assert_eq!(wiped, 1);
    assert_eq!(outcomes.last(), Some(&ClearOutcome::Wiped));
    assert!(outcomes[..4].iter().all(|o| *o == ClearOutcome::Cancelled));
    assert_eq!(clipboard.contents().as_deref(), Some(""));
}

#[test]
fn test_cancel_unknown_token_is_quick_noop() {
    let (_temp, state) = temp_state();
    let handoff = ClipboardHandoff::with_program(state, "/nonexistent");

    let started = Instant::now();
    assert!(!handoff.cancel(&Uuid::new_v4()));
    assert!(started.elapsed() < Duration::from_millis(500));
}
