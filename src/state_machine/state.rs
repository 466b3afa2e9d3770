use chrono::{DateTime, Duration, Utc};

use super::update::ItemUpdate;
use crate::content::{Content, WorkItem, WorkStatus};
use crate::error::{ErrorKind, PressError, Result};

/// Something that happened to a work item while the orchestrator held it.
#[derive(Debug)]
pub enum Event<'a> {
    /// The orchestrator started working on a pending item.
    PickedUp,
    /// The plugin accepted the content.
    Published {
        url: Option<String>,
        content: &'a Content,
    },
    /// The attempt failed with this error.
    Failed(&'a PressError),
    /// Work stopped without a verdict (cancellation, generate-only); back to pending.
    Released,
}

/// The result of evaluating a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started,
    Published {
        url: Option<String>,
    },
    /// Back to pending with one more retry consumed and a later date.
    Rescheduled {
        retry_count: u32,
        scheduled_for: DateTime<Utc>,
        kind: ErrorKind,
    },
    /// Terminal failure.
    Failed {
        kind: ErrorKind,
    },
    Released,
}

/// How far a rescheduled item is pushed back.
pub const RESCHEDULE_DELAY_DAYS: i64 = 1;

/// Drives a `WorkItem` through `pending → processing → published | failed`.
pub struct StateMachine;

impl StateMachine {
    /// Compute and apply the transition for `event`, returning it together
    /// with the fields that changed so the caller can persist them.
    ///
    /// - `PickedUp` is only valid from `Pending`.
    /// - Every other event is only valid from `Processing`.
    /// - A fatal failure fails the item at once and leaves `retry_count` alone.
    /// - Any other failure reschedules while `retry_count < retry_ceiling`,
    ///   otherwise fails the item.
    pub fn next(item: &mut WorkItem, event: Event<'_>) -> Result<(Transition, ItemUpdate)> {
        let (transition, update) = match event {
            Event::PickedUp => {
                Self::require(item, WorkStatus::Pending, WorkStatus::Processing)?;
                (Transition::Started, ItemUpdate::status(WorkStatus::Processing))
            }
            Event::Published { url, content } => {
                Self::require(item, WorkStatus::Processing, WorkStatus::Published)?;
                let update = ItemUpdate {
                    status: Some(WorkStatus::Published),
                    last_error: Some(None),
                    final_content: Some(content.clone()),
                    published_url: url.clone(),
                    ..ItemUpdate::default()
                };
                (Transition::Published { url }, update)
            }
            Event::Failed(err) => Self::handle_failure(item, err)?,
            Event::Released => {
                Self::require(item, WorkStatus::Processing, WorkStatus::Pending)?;
                (Transition::Released, ItemUpdate::status(WorkStatus::Pending))
            }
        };

        update.apply_to(item);
        Ok((transition, update))
    }

    fn handle_failure(item: &WorkItem, err: &PressError) -> Result<(Transition, ItemUpdate)> {
        let kind = err.kind();
        let message = Some(err.to_string());

        if kind != ErrorKind::Fatal && item.retry_count < item.retry_ceiling {
            Self::require(item, WorkStatus::Processing, WorkStatus::Pending)?;
            let retry_count = item.retry_count + 1;
            let scheduled_for = item.scheduled_for + Duration::days(RESCHEDULE_DELAY_DAYS);
            let update = ItemUpdate {
                status: Some(WorkStatus::Pending),
                retry_count: Some(retry_count),
                scheduled_for: Some(scheduled_for),
                last_error: Some(message),
                ..ItemUpdate::default()
            };
            return Ok((
                Transition::Rescheduled {
                    retry_count,
                    scheduled_for,
                    kind,
                },
                update,
            ));
        }

        Self::require(item, WorkStatus::Processing, WorkStatus::Failed)?;
        let update = ItemUpdate {
            status: Some(WorkStatus::Failed),
            last_error: Some(message),
            ..ItemUpdate::default()
        };
        Ok((Transition::Failed { kind }, update))
    }

    fn require(item: &WorkItem, from: WorkStatus, to: WorkStatus) -> Result<()> {
        if item.status == from {
            Ok(())
        } else {
            Err(PressError::InvalidTransition {
                from: item.status,
                to,
            })
        }
    }
}
