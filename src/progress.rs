//! Progress indicators for userctl.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str = "  {spinner:.green} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "  {spinner:.green} {msg}";

/// Bar for a known number of steps
pub fn bar(len: usize, prefix: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    let pb = ProgressBar::new(len as u64);
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb
}

/// Spinner for work of unknown length
pub fn spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
