//! An `indicatif`-backed [`ProgressReporter`], the default boundary
//! implementation of the core's progress sink (spec.md §6).

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use pgschema_diff_core::{ProgressReporter, ProgressStage};

pub struct IndicatifReporter {
    bar: ProgressBar,
    lock: Mutex<()>,
}

impl IndicatifReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .expect("static template is valid")
                .progress_chars("=>-"),
        );
        Self {
            bar,
            lock: Mutex::new(()),
        }
    }
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifReporter {
    fn show(&self, stage: ProgressStage, percent: u8) {
        // Source and target collection run concurrently and may call
        // `show` from different tasks; serialize bar mutation so the two
        // stages don't interleave a half-written position and message.
        let _guard = self.lock.lock().unwrap();
        self.bar.set_position(percent as u64);
        self.bar.set_message(stage.label());
    }

    fn status(&self, message: &str) {
        self.bar.println(message);
    }

    fn warning(&self, message: &str) {
        self.bar.println(format!("warning: {message}"));
    }

    fn error(&self, message: &str) {
        self.bar.println(format!("error: {message}"));
    }
}

impl Drop for IndicatifReporter {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}
