//! Degraded-but-continue warning collection.
//!
//! A single ingestion run collects non-fatal conditions (an unreadable media
//! entry, an uncoercible cell, an image/row count mismatch) into a task-local
//! buffer so they can be surfaced in the run report instead of aborting the
//! batch. Each warning names the pipeline stage that degraded, so the report
//! can count degraded units per stage.

use std::{cell::RefCell, fmt};

/// Pipeline stage a degraded unit was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    Anchor,
    Rows,
    Bind,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Anchor => "anchor",
            Self::Rows => "rows",
            Self::Bind => "bind",
            Self::Store => "store",
        };
        f.write_str(name)
    }
}

/// One non-fatal condition: the unit degraded, the batch continued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

tokio::task_local! {
    static WARNINGS: RefCell<Vec<Warning>>;
}

/// Record a non-fatal condition for the current ingestion run.
/// Outside a collection scope the warning is dropped.
pub fn collect(stage: Stage, message: impl Into<String>) {
    let _ = WARNINGS.try_with(|warnings| {
        warnings.borrow_mut().push(Warning {
            stage,
            message: message.into(),
        });
    });
}

/// Run `f` with warning collection enabled, returning its output together
/// with everything collected while it ran.
pub async fn scoped<F, T>(f: F) -> (T, Vec<Warning>)
where
    F: std::future::Future<Output = T>,
{
    WARNINGS
        .scope(RefCell::new(Vec::new()), async {
            let result = f.await;
            let warnings = WARNINGS.with(|w| std::mem::take(&mut *w.borrow_mut()));
            (result, warnings)
        })
        .await
}

/// Degraded-unit counts per stage, in first-observed order.
pub fn count_by_stage(warnings: &[Warning]) -> indexmap::IndexMap<Stage, usize> {
    let mut counts = indexmap::IndexMap::new();
    for warning in warnings {
        *counts.entry(warning.stage).or_insert(0) += 1;
    }
    counts
}

/// Emit a degraded-unit warning for the current run, tagged with its stage.
#[macro_export]
macro_rules! warn_run {
    ($stage:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::warn!(stage = %$stage, "{message}");
        $crate::warning::collect($stage, message);
    }};
}
