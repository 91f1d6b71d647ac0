use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use parallel_gzip::{Direction, ProgressObserver, ProgressSnapshot};

const TEMPLATE: &str =
    "{spinner:.green} {prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} blocks {msg} ({eta})";

/// Terminal progress bar counting written blocks.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for BarProgress {
    fn on_start(&self, direction: Direction, blocks_total: u64) {
        self.bar.set_length(blocks_total);
        self.bar.set_prefix(direction.to_string());
        self.bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.blocks_written);
        if let Some(memory) = snapshot.process_memory {
            self.bar.set_message(format!("{} MiB rss", memory / (1024 * 1024)));
        }
    }

    fn on_finish(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.blocks_written);
        self.bar.finish_with_message(format!("done in {:.2?}", snapshot.elapsed));
    }
}
