//! Optional bytes/speed/ETA progress reporter for the HTTP cache
//! (§4.8 item 5), gated by `BUILDER_VERBOSE` (§6) and rendered with
//! `indicatif` — a teacher dependency otherwise unused.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

pub struct ProgressReporter {
    bar: ProgressBar,
    last_update: Mutex<Instant>,
}

impl ProgressReporter {
    /// Builds a reporter for `label`, or `None` when progress reporting
    /// is disabled (`crate::config::verbose_enabled()` is false).
    pub fn new(label: &str, enabled: bool) -> Option<Self> {
        if !enabled {
            return None;
        }
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(label.to_string());
        Some(ProgressReporter {
            bar,
            last_update: Mutex::new(Instant::now() - MIN_UPDATE_INTERVAL),
        })
    }

    /// Updates the bar at most once per `MIN_UPDATE_INTERVAL` (§4.8:
    /// "updating at ≤200ms intervals").
    pub fn update(&self, written: u64, total: Option<u64>) {
        let mut last = self.last_update.lock().expect("progress mutex poisoned");
        let now = Instant::now();
        if now.duration_since(*last) < MIN_UPDATE_INTERVAL {
            return;
        }
        *last = now;
        if let Some(total) = total {
            self.bar.set_length(total);
        }
        self.bar.set_position(written);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_reporter_is_none() {
        assert!(ProgressReporter::new("x", false).is_none());
    }

    #[test]
    fn enabled_reporter_accepts_updates() {
        let reporter = ProgressReporter::new("downloading", true).unwrap();
        reporter.update(10, Some(100));
        reporter.finish();
    }
}
