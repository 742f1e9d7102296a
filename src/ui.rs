//! Stage reporting for `arloc`.
//!
//! Each pipeline step (configuration, authorization, capture, query) is a `Stage`. On a TTY
//! it shows as a spinner; otherwise as plain `==>` lines on stderr. A stage closes with its
//! duration and an optional detail such as an encoded byte count or the pose confidence.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    /// Spinner on a terminal, plain lines otherwise.
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Pretty output needs a terminal even when asked for explicitly.
    fn spinners(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> Stage {
        let spinner = if self.spinners() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        Stage {
            name: name.to_string(),
            started: Instant::now(),
            spinner,
            detail: None,
            failed: false,
        }
    }
}

/// One reported step. Prints its summary line when dropped.
pub struct Stage {
    name: String,
    started: Instant,
    spinner: Option<ProgressBar>,
    detail: Option<String>,
    failed: bool,
}

impl Stage {
    /// Short result shown after the duration, e.g. `48213 bytes`.
    pub fn detail(&mut self, detail: impl Into<String>) {
        self.detail = Some(detail.into());
    }

    pub fn fail(&mut self) {
        self.failed = true;
    }

    fn summary(&self, elapsed: Duration) -> String {
        let mark = if self.failed { "✘" } else { "✔" };
        let mut line = format!("{} {} ({})", mark, self.name, format_duration(elapsed));
        if let Some(detail) = &self.detail {
            line.push_str(": ");
            line.push_str(detail);
        }
        line
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        let line = self.summary(self.started.elapsed());
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
