//! Capability seam to the external listing form.
//!
//! The workflow never talks to a browser directly; it asks a [`FormSurface`]
//! to locate and operate named controls. The production implementation wraps
//! a scripted UI driver and lives outside this crate; tests script one.

use std::path::Path;

/// The interactive controls the posting form exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Title,
    Price,
    Category,
    CategoryOption,
    Condition,
    ConditionOption,
    PhotoInput,
    Description,
    Publish,
    /// Confirmation dialog that may or may not appear after publishing.
    ConfirmLeave,
}

impl Control {
    pub fn label(self) -> &'static str {
        match self {
            Self::Title => "title input",
            Self::Price => "price input",
            Self::Category => "category selector",
            Self::CategoryOption => "category option",
            Self::Condition => "condition selector",
            Self::ConditionOption => "condition option",
            Self::PhotoInput => "photo upload input",
            Self::Description => "description input",
            Self::Publish => "publish button",
            Self::ConfirmLeave => "leave-page dialog",
        }
    }
}

/// One interaction with the external surface. Implementations must bound
/// every control lookup with a timeout; an error here means "not located in
/// time", never an infinite wait.
pub trait FormSurface {
    type Error: std::fmt::Display;

    /// Confirm the control is present and interactable.
    fn locate(&mut self, control: Control) -> impl Future<Output = Result<(), Self::Error>>;

    fn fill(
        &mut self,
        control: Control,
        value: &str,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn click(&mut self, control: Control) -> impl Future<Output = Result<(), Self::Error>>;

    fn attach(
        &mut self,
        control: Control,
        path: &Path,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Dismiss an optional dialog. `Ok(false)` means it never appeared,
    /// which is not a failure.
    fn dismiss(&mut self, control: Control) -> impl Future<Output = Result<bool, Self::Error>>;
}
