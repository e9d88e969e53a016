use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Single progress bar on stderr, sized to the planned run duration.
pub(crate) struct HumanProgress {
    pb: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new(prefix: &str, total: Duration) -> Self {
        let pb = ProgressBar::with_draw_target(
            Some(total.as_millis() as u64),
            ProgressDrawTarget::stderr_with_hz(5),
        );
        pb.set_style(bar_style());
        pb.set_prefix(prefix.to_string());
        Self { pb }
    }

    pub(crate) fn update(&self, elapsed: Duration, message: String) {
        let len = self.pb.length().unwrap_or(0);
        self.pb.set_message(message);
        self.pb.set_position((elapsed.as_millis() as u64).min(len));
    }

    pub(crate) fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
