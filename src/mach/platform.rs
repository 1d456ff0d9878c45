//! The host surface the executor runs against.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything the running program needs from its host: text output
/// with cursor tracking, line input, screen control, a cooperative
/// stop flag, and pacing.
pub trait Platform {
    fn print(&mut self, text: &str);
    fn input_line(&mut self) -> String;
    /// Cursor position as 1-based (row, col).
    fn cursor_pos(&self) -> (usize, usize);
    /// Screen size as (rows, cols).
    fn screen_size(&self) -> (usize, usize);
    fn locate(&mut self, row: Option<usize>, col: Option<usize>);
    fn set_cursor_visible(&mut self, visible: bool);
    fn cls(&mut self);
    /// Polled between statements; true requests a clean stop.
    fn should_stop(&self) -> bool;
    /// Acknowledge a stop request so the next run starts clean.
    fn clear_stop(&mut self);
    fn delay(&mut self, micros: u64);
}

/// Terminal-backed platform for the command line. Screen control is
/// plain ANSI; the stop flag is shared with a signal handler.
pub struct StdioPlatform {
    stop: Arc<AtomicBool>,
    row: usize,
    col: usize,
}

impl StdioPlatform {
    pub fn new(stop: Arc<AtomicBool>) -> StdioPlatform {
        StdioPlatform {
            stop,
            row: 1,
            col: 1,
        }
    }

    fn track(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.col = 1;
                if self.row < 25 {
                    self.row += 1;
                }
            } else {
                self.col += 1;
            }
        }
    }
}

impl Platform for StdioPlatform {
    fn print(&mut self, text: &str) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
        self.track(text);
    }

    fn input_line(&mut self) -> String {
        let mut line = String::new();
        let stdin = std::io::stdin();
        let _ = stdin.lock().read_line(&mut line);
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        self.row = if self.row < 25 { self.row + 1 } else { self.row };
        self.col = 1;
        line
    }

    fn cursor_pos(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    fn screen_size(&self) -> (usize, usize) {
        (25, 80)
    }

    fn locate(&mut self, row: Option<usize>, col: Option<usize>) {
        let row = row.unwrap_or(self.row);
        let col = col.unwrap_or(self.col);
        print!("\x1b[{};{}H", row, col);
        let _ = std::io::stdout().flush();
        self.row = row;
        self.col = col;
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        print!("{}", if visible { "\x1b[?25h" } else { "\x1b[?25l" });
        let _ = std::io::stdout().flush();
    }

    fn cls(&mut self) {
        print!("\x1b[2J\x1b[H");
        let _ = std::io::stdout().flush();
        self.row = 1;
        self.col = 1;
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn clear_stop(&mut self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    fn delay(&mut self, micros: u64) {
        std::thread::sleep(std::time::Duration::from_micros(micros));
    }
}

/// In-memory platform for tests: output accumulates in a buffer and
/// input comes from queued lines.
#[derive(Default)]
pub struct CapturePlatform {
    pub output: String,
    pub inputs: VecDeque<String>,
    /// Scripted stop request, observed at the next statement boundary.
    pub stop: bool,
    row: usize,
    col: usize,
}

impl CapturePlatform {
    pub fn new() -> CapturePlatform {
        CapturePlatform {
            output: String::new(),
            inputs: VecDeque::new(),
            stop: false,
            row: 1,
            col: 1,
        }
    }

    pub fn with_inputs(lines: &[&str]) -> CapturePlatform {
        let mut platform = CapturePlatform::new();
        platform.inputs = lines.iter().map(|s| s.to_string()).collect();
        platform
    }
}

impl Platform for CapturePlatform {
    fn print(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.col = 1;
                self.row += 1;
            } else {
                self.col += 1;
            }
        }
        self.output.push_str(text);
    }

    fn input_line(&mut self) -> String {
        let line = self.inputs.pop_front().unwrap_or_default();
        self.output.push('\n');
        self.row += 1;
        self.col = 1;
        line
    }

    fn cursor_pos(&self) -> (usize, usize) {
        (self.row.max(1), self.col)
    }

    fn screen_size(&self) -> (usize, usize) {
        (25, 80)
    }

    fn locate(&mut self, row: Option<usize>, col: Option<usize>) {
        if let Some(row) = row {
            self.row = row;
        }
        if let Some(col) = col {
            self.col = col;
        }
    }

    fn set_cursor_visible(&mut self, _visible: bool) {}

    fn cls(&mut self) {
        self.row = 1;
        self.col = 1;
    }

    fn should_stop(&self) -> bool {
        self.stop
    }

    fn clear_stop(&mut self) {
        self.stop = false;
    }

    fn delay(&mut self, _micros: u64) {}
}
