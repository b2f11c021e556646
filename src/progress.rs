//! Progress reporting and display.
//!
//! The pipeline writes phase changes and an append-only debug log through the
//! [`ProgressReporter`] trait; the fancy renderer's steady-tick refresh only
//! ever reads display state, so the display can never gate or reorder a
//! pipeline operation.

use std::sync::Arc;

/// Status of one listing moving through the posting queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Queued,
    /// Driving the external form; the label names the workflow state reached.
    Driving(String),
    Posted,
    Failed(String),
    Skipped(String),
}

/// Phase of the overall run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    ExtractingImages,
    ResolvingAnchors,
    DecodingRows,
    BindingImages,
    Reconciling,
    Posting,
    Completed,
    Failed(String),
}

impl RunPhase {
    fn message(&self) -> String {
        match self {
            Self::ExtractingImages => "📦 Extracting embedded images...".to_owned(),
            Self::ResolvingAnchors => "📐 Resolving image anchors...".to_owned(),
            Self::DecodingRows => "📄 Decoding listing rows...".to_owned(),
            Self::BindingImages => "🖼️  Binding images to rows...".to_owned(),
            Self::Reconciling => "🗄️  Reconciling against the store...".to_owned(),
            Self::Posting => "🚀 Posting pending listings...".to_owned(),
            Self::Completed => "✅ Completed!".to_owned(),
            Self::Failed(error) => format!("❌ Failed: {error}"),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn set_phase(&self, phase: RunPhase);

    /// Register the item codes about to be driven through the posting queue.
    fn register_items(&self, codes: Vec<String>);

    fn update_item(&self, code: &str, status: ItemStatus);

    /// Append a timestamped line to the debug log.
    fn add_debug(&self, message: &str);

    fn add_error(&self, message: &str);

    fn finish(&self);
}

/// No-op reporter for tests and library embedding.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn set_phase(&self, _phase: RunPhase) {}
    fn register_items(&self, _codes: Vec<String>) {}
    fn update_item(&self, _code: &str, _status: ItemStatus) {}
    fn add_debug(&self, _message: &str) {}
    fn add_error(&self, _message: &str) {}
    fn finish(&self) {}
}

#[derive(Debug, Default)]
struct Stats {
    total_items: usize,
    posted: usize,
    failed: usize,
    skipped: usize,
    start_time: Option<std::time::Instant>,
}

impl Stats {
    fn started() -> Self {
        Self {
            start_time: Some(std::time::Instant::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, status: &ItemStatus) {
        match status {
            ItemStatus::Posted => self.posted += 1,
            ItemStatus::Failed(_) => self.failed += 1,
            ItemStatus::Skipped(_) => self.skipped += 1,
            _ => {}
        }
    }

    fn print_summary(&self) {
        let duration = self.start_time.map(|t| t.elapsed()).unwrap_or_default();
        eprintln!();
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("📊 Summary");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if self.total_items > 0 {
            eprintln!("   📄 Queued:   {}", self.total_items);
            eprintln!("   ✅ Posted:   {}", self.posted);
            if self.failed > 0 {
                eprintln!("   ❌ Failed:   {}", self.failed);
            }
            if self.skipped > 0 {
                eprintln!("   ⏭️  Skipped:  {}", self.skipped);
            }
        }
        eprintln!("   ⏱️  Duration: {:.2}s", duration.as_secs_f64());
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

/// Plain stderr reporter for non-TTY runs.
pub struct SimpleReporter {
    stats: std::sync::RwLock<Stats>,
}

impl SimpleReporter {
    pub fn new() -> Self {
        Self {
            stats: std::sync::RwLock::new(Stats::started()),
        }
    }
}

impl Default for SimpleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SimpleReporter {
    fn set_phase(&self, phase: RunPhase) {
        eprintln!("{}", phase.message());
    }

    fn register_items(&self, codes: Vec<String>) {
        self.stats.write().unwrap().total_items = codes.len();
        eprintln!("   {} listings queued", codes.len());
    }

    fn update_item(&self, code: &str, status: ItemStatus) {
        self.stats.write().unwrap().record(&status);
        match status {
            ItemStatus::Posted => eprintln!("   ✓ {code}"),
            ItemStatus::Failed(reason) => eprintln!("   ✗ {code}: {reason}"),
            ItemStatus::Skipped(reason) => eprintln!("   - {code}: {reason}"),
            _ => {}
        }
    }

    fn add_debug(&self, message: &str) {
        eprintln!("   [{}] {message}", chrono::Local::now().format("%H:%M:%S"));
    }

    fn add_error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn finish(&self) {
        self.stats.read().unwrap().print_summary();
    }
}

/// Interactive reporter with spinners and a live item bar (for TTY).
pub struct FancyReporter {
    multi: indicatif::MultiProgress,
    phase_bar: indicatif::ProgressBar,
    items: std::sync::RwLock<std::collections::HashMap<String, indicatif::ProgressBar>>,
    queue_bar: std::sync::RwLock<Option<indicatif::ProgressBar>>,
    stats: std::sync::RwLock<Stats>,
}

impl FancyReporter {
    pub fn new() -> Self {
        let multi = indicatif::MultiProgress::new();
        let phase_bar = multi.add(indicatif::ProgressBar::new_spinner());
        phase_bar.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        // The tick thread only repaints; it never touches pipeline state.
        phase_bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Self {
            multi,
            phase_bar,
            items: std::sync::RwLock::new(std::collections::HashMap::new()),
            queue_bar: std::sync::RwLock::new(None),
            stats: std::sync::RwLock::new(Stats::started()),
        }
    }
}

impl Default for FancyReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for FancyReporter {
    fn set_phase(&self, phase: RunPhase) {
        let message = phase.message();
        if matches!(phase, RunPhase::Completed | RunPhase::Failed(_)) {
            self.phase_bar.finish_with_message(message);
        } else {
            self.phase_bar.set_message(message);
        }
    }

    fn register_items(&self, codes: Vec<String>) {
        self.stats.write().unwrap().total_items = codes.len();
        let queue_bar = self
            .multi
            .add(indicatif::ProgressBar::new(codes.len() as u64));
        queue_bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("   {bar:40.cyan/blue} {pos}/{len} listings")
                .unwrap()
                .progress_chars("█▓▒░  "),
        );
        *self.queue_bar.write().unwrap() = Some(queue_bar);
    }

    fn update_item(&self, code: &str, status: ItemStatus) {
        let mut items = self.items.write().unwrap();
        match &status {
            ItemStatus::Posted | ItemStatus::Failed(_) | ItemStatus::Skipped(_) => {
                if let Some(bar) = items.remove(code) {
                    bar.finish_and_clear();
                }
                if let Some(queue_bar) = &*self.queue_bar.read().unwrap() {
                    queue_bar.inc(1);
                }
                if let ItemStatus::Failed(reason) = &status {
                    self.multi.println(format!("❌ {code}: {reason}")).ok();
                }
                self.stats.write().unwrap().record(&status);
            }
            ItemStatus::Queued | ItemStatus::Driving(_) => {
                let detail = match &status {
                    ItemStatus::Driving(state) => state.as_str(),
                    _ => "queued",
                };
                let bar = items.entry(code.to_owned()).or_insert_with(|| {
                    let bar = self.multi.add(indicatif::ProgressBar::new_spinner());
                    bar.set_style(
                        indicatif::ProgressStyle::default_spinner()
                            .template("   {spinner:.green} {msg}")
                            .unwrap(),
                    );
                    bar.enable_steady_tick(std::time::Duration::from_millis(100));
                    bar
                });
                bar.set_message(format!("{code}: {detail}"));
            }
        }
    }

    fn add_debug(&self, message: &str) {
        self.multi
            .println(format!(
                "   [{}] {message}",
                chrono::Local::now().format("%H:%M:%S")
            ))
            .ok();
    }

    fn add_error(&self, message: &str) {
        self.multi.println(format!("❌ {message}")).ok();
    }

    fn finish(&self) {
        for bar in self.items.read().unwrap().values() {
            bar.finish_and_clear();
        }
        if let Some(queue_bar) = &*self.queue_bar.read().unwrap() {
            queue_bar.finish_and_clear();
        }
        self.phase_bar.finish_and_clear();
        self.stats.read().unwrap().print_summary();
    }
}

/// Pick a reporter for the current terminal.
pub fn create_reporter() -> Arc<dyn ProgressReporter> {
    if console::Term::stderr().is_term() {
        Arc::new(FancyReporter::new())
    } else {
        Arc::new(SimpleReporter::new())
    }
}
