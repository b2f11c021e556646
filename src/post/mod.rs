//! Posting Workflow.
//!
//! Driving the external listing form is modeled as an explicit finite-state
//! machine rather than one long procedure: every transition locates a single
//! named control (with a bounded number of retries), so a failure at any step
//! is independently observable and one item's failure never corrupts the rest
//! of the queue.

pub mod surface;

use std::path::{Path, PathBuf};

use crate::{
    ListingRecord,
    content::ContentGenerator,
    progress::{ItemStatus, ProgressReporter, RunPhase},
    store::{ListingStore, StoredListing, self},
};

pub use surface::{Control, FormSurface};

/// How many times a single control lookup is retried before the item fails.
pub const MAX_CONTROL_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    FormReady,
    TitleEntered,
    PriceEntered,
    CategorySelected,
    ConditionSelected,
    ImageAttached,
    DescriptionEntered,
    Submitting,
    Posted,
    Failed,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::FormReady => "form ready",
            Self::TitleEntered => "title entered",
            Self::PriceEntered => "price entered",
            Self::CategorySelected => "category selected",
            Self::ConditionSelected => "condition selected",
            Self::ImageAttached => "image attached",
            Self::DescriptionEntered => "description entered",
            Self::Submitting => "submitting",
            Self::Posted => "posted",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Everything the external form needs for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PostJob {
    pub item_code: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub image_path: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Posted,
    /// `state` is the last state reached before the failing transition.
    Failed { state: WorkflowState, reason: String },
}

enum Action<'a> {
    Locate(Control),
    Fill(Control, &'a str),
    Click(Control),
    Attach(Control, &'a Path),
}

impl Action<'_> {
    fn control(&self) -> Control {
        match self {
            Self::Locate(control)
            | Self::Fill(control, _)
            | Self::Click(control)
            | Self::Attach(control, _) => *control,
        }
    }
}

pub struct PostingWorkflow<'a, S: FormSurface> {
    surface: &'a mut S,
    reporter: &'a dyn ProgressReporter,
    state: WorkflowState,
}

impl<'a, S: FormSurface> PostingWorkflow<'a, S> {
    pub fn new(surface: &'a mut S, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            surface,
            reporter,
            state: WorkflowState::Idle,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Drive one job through the full transition sequence.
    pub async fn run(&mut self, job: &PostJob) -> Outcome {
        self.state = WorkflowState::Idle;
        let price = format_price(job.price);
        let sequence: [(WorkflowState, Vec<Action>); 8] = [
            (WorkflowState::FormReady, vec![Action::Locate(Control::Title)]),
            (
                WorkflowState::TitleEntered,
                vec![Action::Fill(Control::Title, &job.title)],
            ),
            (
                WorkflowState::PriceEntered,
                vec![Action::Fill(Control::Price, &price)],
            ),
            (
                WorkflowState::CategorySelected,
                vec![
                    Action::Click(Control::Category),
                    Action::Click(Control::CategoryOption),
                ],
            ),
            (
                WorkflowState::ConditionSelected,
                vec![
                    Action::Click(Control::Condition),
                    Action::Click(Control::ConditionOption),
                ],
            ),
            (
                WorkflowState::ImageAttached,
                vec![Action::Attach(Control::PhotoInput, &job.image_path)],
            ),
            (
                WorkflowState::DescriptionEntered,
                vec![Action::Fill(Control::Description, &job.description)],
            ),
            (
                WorkflowState::Submitting,
                vec![Action::Click(Control::Publish)],
            ),
        ];

        for (next, actions) in sequence {
            for action in actions {
                if let Err(reason) = self.perform(action).await {
                    let state = self.state;
                    self.state = WorkflowState::Failed;
                    return Outcome::Failed { state, reason };
                }
            }
            self.state = next;
            self.reporter
                .update_item(&job.item_code, ItemStatus::Driving(next.to_string()));
        }

        // The confirmation dialog is optional; absence or a lookup error both
        // mean there was nothing to dismiss.
        match self.surface.dismiss(Control::ConfirmLeave).await {
            Ok(true) => self.reporter.add_debug("dismissed leave-page dialog"),
            Ok(false) => {}
            Err(error) => self
                .reporter
                .add_debug(&format!("no leave-page dialog: {error}")),
        }
        self.state = WorkflowState::Posted;
        Outcome::Posted
    }

    async fn perform(&mut self, action: Action<'_>) -> Result<(), String> {
        let control = action.control();
        for attempt in 1..=MAX_CONTROL_RETRIES {
            let result = match &action {
                Action::Locate(control) => self.surface.locate(*control).await,
                Action::Fill(control, value) => self.surface.fill(*control, value).await,
                Action::Click(control) => self.surface.click(*control).await,
                Action::Attach(control, path) => self.surface.attach(*control, path).await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(error) if attempt < MAX_CONTROL_RETRIES => {
                    self.reporter.add_debug(&format!(
                        "retry {attempt} for {}: {error}",
                        control.label()
                    ));
                }
                Err(error) => return Err(format!("{}: {error}", control.label())),
            }
        }
        unreachable!("retry loop returns before exhausting attempts")
    }
}

fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{}", price as i64)
    } else {
        format!("{price}")
    }
}

/// Locate the bound image for an item code, trying the allowed extensions.
pub fn find_image(images_dir: &Path, item_code: &str) -> Option<PathBuf> {
    ["jpg", "jpeg", "png"].into_iter().find_map(|ext| {
        let path = images_dir.join(format!("image_{item_code}.{ext}"));
        path.exists().then_some(path)
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct QueueReport {
    pub posted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drain every pending listing through content generation and the workflow.
///
/// A failed or unpostable item is reported and left pending; the queue moves
/// on to the next item.
pub async fn run_queue<S: FormSurface, G: ContentGenerator>(
    listings: &ListingStore,
    surface: &mut S,
    generator: &G,
    images_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<QueueReport, store::Error> {
    reporter.set_phase(RunPhase::Posting);
    let pending = listings.pending().await?;
    reporter.register_items(
        pending
            .iter()
            .map(|listing| listing.item_code.clone())
            .collect(),
    );
    for listing in &pending {
        reporter.update_item(&listing.item_code, ItemStatus::Queued);
    }

    let mut report = QueueReport::default();
    for listing in pending {
        let code = listing.item_code.clone();
        let Some(image_path) = find_image(images_dir, &code) else {
            reporter.update_item(
                &code,
                ItemStatus::Skipped("no image bound; not yet postable".to_owned()),
            );
            report.skipped += 1;
            continue;
        };
        let Some(price) = listing.price else {
            reporter.update_item(&code, ItemStatus::Skipped("no price".to_owned()));
            report.skipped += 1;
            continue;
        };
        let content = match generator.generate(&record_of(&listing)).await {
            Ok(content) => content,
            Err(error) => {
                reporter.update_item(&code, ItemStatus::Failed(error.to_string()));
                report.failed += 1;
                continue;
            }
        };
        let job = PostJob {
            item_code: code.clone(),
            title: content.title,
            description: content.description,
            price,
            image_path,
        };
        let mut workflow = PostingWorkflow::new(surface, reporter);
        match workflow.run(&job).await {
            Outcome::Posted => {
                listings.mark_posted(&code).await?;
                reporter.update_item(&code, ItemStatus::Posted);
                report.posted += 1;
            }
            Outcome::Failed { state, reason } => {
                tracing::error!(%code, %state, %reason, "posting failed; listing stays pending");
                reporter.update_item(&code, ItemStatus::Failed(format!("at {state}: {reason}")));
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn record_of(listing: &StoredListing) -> ListingRecord {
    ListingRecord {
        sheet_row: 0,
        item_code: listing.item_code.clone(),
        description: listing.description.clone().unwrap_or_default(),
        quantity: None,
        price: listing.price,
        total: None,
        image_path: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{content::TemplateGenerator, progress::NullReporter, store::ListingStatus};

    #[derive(Default)]
    struct ScriptedSurface {
        /// How many times each control errors before starting to succeed.
        failures: HashMap<Control, u32>,
        dialog_appears: bool,
        touched: Vec<Control>,
    }

    impl ScriptedSurface {
        fn touch(&mut self, control: Control) -> Result<(), String> {
            self.touched.push(control);
            match self.failures.get_mut(&control) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(format!("{} not located in time", control.label()))
                }
                _ => Ok(()),
            }
        }
    }

    impl FormSurface for ScriptedSurface {
        type Error = String;

        async fn locate(&mut self, control: Control) -> Result<(), String> {
            self.touch(control)
        }

        async fn fill(&mut self, control: Control, _value: &str) -> Result<(), String> {
            self.touch(control)
        }

        async fn click(&mut self, control: Control) -> Result<(), String> {
            self.touch(control)
        }

        async fn attach(&mut self, control: Control, _path: &Path) -> Result<(), String> {
            self.touch(control)
        }

        async fn dismiss(&mut self, control: Control) -> Result<bool, String> {
            self.touched.push(control);
            Ok(self.dialog_appears)
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        phases: std::sync::Mutex<Vec<RunPhase>>,
        statuses: std::sync::Mutex<Vec<(String, ItemStatus)>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn set_phase(&self, phase: RunPhase) {
            self.phases.lock().unwrap().push(phase);
        }
        fn register_items(&self, _codes: Vec<String>) {}
        fn update_item(&self, code: &str, status: ItemStatus) {
            self.statuses.lock().unwrap().push((code.to_owned(), status));
        }
        fn add_debug(&self, _message: &str) {}
        fn add_error(&self, _message: &str) {}
        fn finish(&self) {}
    }

    fn job() -> PostJob {
        PostJob {
            item_code: "A1".to_owned(),
            title: "Oak table".to_owned(),
            description: "Solid oak, seats six".to_owned(),
            price: 120.0,
            image_path: PathBuf::from("image_A1.png"),
        }
    }

    #[tokio::test]
    async fn happy_path_walks_every_transition_in_order() {
        let mut surface = ScriptedSurface::default();
        let mut workflow = PostingWorkflow::new(&mut surface, &NullReporter);
        assert_eq!(workflow.run(&job()).await, Outcome::Posted);
        assert_eq!(workflow.state(), WorkflowState::Posted);
        assert_eq!(
            surface.touched,
            vec![
                Control::Title,
                Control::Title,
                Control::Price,
                Control::Category,
                Control::CategoryOption,
                Control::Condition,
                Control::ConditionOption,
                Control::PhotoInput,
                Control::Description,
                Control::Publish,
                Control::ConfirmLeave,
            ]
        );
    }

    #[tokio::test]
    async fn optional_dialog_does_not_change_the_outcome() {
        let mut surface = ScriptedSurface {
            dialog_appears: true,
            ..Default::default()
        };
        let mut workflow = PostingWorkflow::new(&mut surface, &NullReporter);
        assert_eq!(workflow.run(&job()).await, Outcome::Posted);
    }

    #[tokio::test]
    async fn transient_control_failures_are_retried() {
        let mut surface = ScriptedSurface {
            failures: HashMap::from([(Control::Publish, MAX_CONTROL_RETRIES - 1)]),
            ..Default::default()
        };
        let mut workflow = PostingWorkflow::new(&mut surface, &NullReporter);
        assert_eq!(workflow.run(&job()).await, Outcome::Posted);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_at_the_reached_state() {
        let mut surface = ScriptedSurface {
            failures: HashMap::from([(Control::Condition, MAX_CONTROL_RETRIES)]),
            ..Default::default()
        };
        let mut workflow = PostingWorkflow::new(&mut surface, &NullReporter);
        let outcome = workflow.run(&job()).await;
        let Outcome::Failed { state, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(state, WorkflowState::CategorySelected);
        assert_eq!(workflow.state(), WorkflowState::Failed);
        // Later controls were never touched.
        assert!(!surface.touched.contains(&Control::Description));
        assert_eq!(
            surface
                .touched
                .iter()
                .filter(|control| **control == Control::Condition)
                .count() as u32,
            MAX_CONTROL_RETRIES
        );
    }

    #[tokio::test]
    async fn queue_isolates_failures_and_skips_unpostable_items() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image_A1.png"), b"one").unwrap();
        std::fs::write(dir.path().join("image_A3.jpg"), b"three").unwrap();

        let listings = ListingStore::open("sqlite::memory:").await.unwrap();
        listings.insert("A1", "first", Some(10.0)).await.unwrap();
        listings.insert("A2", "no image", Some(20.0)).await.unwrap();
        listings.insert("A3", "third", Some(30.0)).await.unwrap();

        // Publish fails for the first item's whole retry budget, then works.
        let mut surface = ScriptedSurface {
            failures: HashMap::from([(Control::Publish, MAX_CONTROL_RETRIES)]),
            ..Default::default()
        };
        let generator = TemplateGenerator {
            max_title_len: 100,
            max_description_len: 500,
        };
        let report = run_queue(&listings, &mut surface, &generator, dir.path(), &NullReporter)
            .await
            .unwrap();
        assert_eq!(
            report,
            QueueReport {
                posted: 1,
                failed: 1,
                skipped: 1
            }
        );
        let a1 = listings.get("A1").await.unwrap().unwrap();
        let a3 = listings.get("A3").await.unwrap().unwrap();
        assert_eq!(a1.status, ListingStatus::Pending);
        assert_eq!(a3.status, ListingStatus::Posted);
    }

    #[tokio::test]
    async fn queue_reports_the_posting_phase_and_queued_items() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image_A1.png"), b"one").unwrap();

        let listings = ListingStore::open("sqlite::memory:").await.unwrap();
        listings.insert("A1", "first", Some(10.0)).await.unwrap();

        let mut surface = ScriptedSurface::default();
        let generator = TemplateGenerator {
            max_title_len: 100,
            max_description_len: 500,
        };
        let reporter = RecordingReporter::default();
        run_queue(&listings, &mut surface, &generator, dir.path(), &reporter)
            .await
            .unwrap();

        assert!(reporter.phases.lock().unwrap().contains(&RunPhase::Posting));
        let statuses = reporter.statuses.lock().unwrap();
        assert_eq!(statuses.first(), Some(&("A1".to_owned(), ItemStatus::Queued)));
        assert_eq!(statuses.last(), Some(&("A1".to_owned(), ItemStatus::Posted)));
    }

    #[test]
    fn price_formatting_drops_trailing_zero_fractions() {
        assert_eq!(format_price(120.0), "120");
        assert_eq!(format_price(35.5), "35.5");
    }
}
