//! Console progress line for a running scan.
//!
//! The renderer only reads [`ScanProgress`] snapshots from a watch channel,
//! so stopping it early or never starting it has no effect on the scan.
use std::io::{self, Write};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scanner::ScanProgress;

const FRAMES: [&str; 4] = ["....", ".   ", "..  ", "... "];
const TICK: Duration = Duration::from_millis(250);
const LINE_WIDTH: usize = 60;

pub fn render_line(frame: usize, p: &ScanProgress) -> String {
    format!(
        "Scanning{} ({}/{}) ({})",
        FRAMES[frame % FRAMES.len()],
        p.collected,
        p.target,
        p.page
    )
}

/// Spawn the renderer. Cancel `stop` and await the handle before printing
/// final results; the task clears its line on the way out.
pub fn spawn_renderer(rx: watch::Receiver<ScanProgress>, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut frame = 0usize;
        let mut ticker = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = *rx.borrow();
                    let line = render_line(frame, &snapshot);
                    let mut out = io::stdout().lock();
                    let _ = write!(out, "\r{line:<LINE_WIDTH$}");
                    let _ = out.flush();
                    frame += 1;
                }
            }
        }
        clear_line();
    })
}

pub fn clear_line() {
    let mut out = io::stdout().lock();
    let _ = write!(out, "\r{:LINE_WIDTH$}\r", "");
    let _ = out.flush();
}
