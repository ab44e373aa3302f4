//! Progress bar utilities

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over simulated frames; hidden when `visible` is false
pub fn create_frame_bar(frames: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames {msg}")
            .expect("invalid progress bar template")
            .progress_chars("##-"),
    );
    pb
}
