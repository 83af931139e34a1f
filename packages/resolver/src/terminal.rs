//! Terminal rendering of a record pass.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use property_geo_cli_utils::{MultiProgress, print_line};
use property_geo_resolver::progress::RunProgress;
use property_geo_resolver::report::BatchTally;

/// A records bar on stderr plus one stdout line per batch.
///
/// The bar starts as a spinner and becomes a bounded bar once the pass
/// reports its total. Its message carries the running `success`/`failed`
/// counters.
pub struct TerminalProgress {
    multi: MultiProgress,
    bar: ProgressBar,
    label: String,
}

impl TerminalProgress {
    #[must_use]
    pub fn new(multi: &MultiProgress, label: &str) -> Arc<dyn RunProgress> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix} {msg} ({pos} records)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(label.to_string());

        Arc::new(Self {
            multi: multi.clone(),
            bar,
            label: label.to_string(),
        })
    }
}

impl RunProgress for TerminalProgress {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{prefix} {bar:32.green/white} {pos}/{len} [{elapsed}<{eta}] {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
    }

    fn advance(&self, records: u64) {
        self.bar.inc(records);
    }

    fn batch(&self, tally: &BatchTally) {
        self.bar
            .set_message(format!("success={} failed={}", tally.success, tally.failed));
        if let Err(e) = print_line(&self.multi, &tally.to_string()) {
            log::warn!("{}: could not print batch counters: {e}", self.label);
        }
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
