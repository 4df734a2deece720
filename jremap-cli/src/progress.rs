// Terminal progress reporting
use indicatif::{ProgressBar, ProgressStyle};
use jremap_core::remapper::progress::ProgressSink;

/// Spinner used for stages without a known size.
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Forwards pipeline progress to an indicatif bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(message: &str) -> Self {
        Self { bar: create_progress_bar(message) }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl ProgressSink for BarProgress {
    fn pairs_processed(&self, done: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
            if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} pairs") {
                self.bar.set_style(style.progress_chars("=> "));
            }
        }
        self.bar.set_position(done);
    }

    fn stage(&self, name: &str) {
        self.bar.set_message(format!("Stage: {}", name));
        self.bar.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_progress_sizes_the_bar() {
        let progress = BarProgress::new("Remapping...");
        progress.stage("methods");
        progress.pairs_processed(3, 10);
        assert_eq!(progress.bar.length(), Some(10));
        assert_eq!(progress.bar.position(), 3);
        progress.finish("done");
        assert!(progress.bar.is_finished());
    }
}
