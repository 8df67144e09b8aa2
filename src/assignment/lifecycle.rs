#![forbid(unsafe_code)]

use crate::assignment::model::{
    Assignment, AssignmentStatus, FieldPatch, TaskKind, VEHICLE_PHOTO_COUNT,
};
use crate::assignment::store::{AssignmentStore, StoreError};
use crate::error::FleetError;

/// What a driver submits for one step. One variant per step, so a request
/// cannot even express fields that belong to a different step, and it never
/// carries a status: the next status is derived from the stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// ASSIGNED -> PENDING: task type, transport mode when picking up,
    /// best-effort start address.
    Start {
        task: TaskKind,
        transport_type: Option<String>,
        start_address: Option<String>,
    },
    /// PENDING -> PICKED: five vehicle photo references plus best-effort
    /// pickup address.
    Pickup {
        images: Vec<String>,
        pickup_address: Option<String>,
    },
    /// PICKED -> COMPLETED: the final handover photo plus best-effort
    /// drop-off address.
    Complete {
        final_image: String,
        drop_off_address: Option<String>,
    },
}

impl StepInput {
    #[must_use]
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "task details",
            Self::Pickup { .. } => "vehicle photos",
            Self::Complete { .. } => "final photo",
        }
    }
}

/// The assignment lifecycle engine.
///
/// `transition` re-validates every submitted field against the *stored*
/// status, derives the next status from the transition table, and commits
/// status plus fields in a single conditional store update. A stale or
/// repeated submission observes the already-advanced record and is rejected
/// as not applicable rather than re-applied.
#[derive(Debug, Clone)]
pub struct Engine {
    store: AssignmentStore,
}

impl Engine {
    #[must_use]
    pub fn new(store: AssignmentStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &AssignmentStore {
        &self.store
    }

    pub fn transition(&self, id: &str, input: StepInput) -> Result<Assignment, FleetError> {
        let current = match self.store.find_by_id(id) {
            Ok(Some(record)) => record,
            Ok(None) => return Err(FleetError::AssignmentNotFound(id.to_owned())),
            Err(e) => return Err(persistence(e)),
        };

        let expected = current.status;
        let (next, patch) = validate_transition(&current, input)?;

        match self
            .store
            .update_status_and_fields(id, expected, next, &patch)
        {
            Ok(updated) => {
                tracing::info!(
                    assignment = %updated.id,
                    from = %expected,
                    to = %updated.status,
                    "assignment transitioned"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict { actual, .. }) => Err(FleetError::TransitionNotApplicable(
                format!("assignment '{id}' is now {actual}, expected {expected}"),
            )),
            Err(StoreError::NotFound(_)) => Err(FleetError::AssignmentNotFound(id.to_owned())),
            Err(StoreError::Io(e)) => Err(persistence(e)),
        }
    }
}

fn persistence(e: impl std::fmt::Display) -> FleetError {
    tracing::error!(error = %e, "assignment store failure");
    FleetError::Persistence("assignment store unavailable".to_owned())
}

/// The transition table. Pairs the stored status with the submitted step,
/// checks the step's validation rule, and yields the next status plus the
/// fields that transition commits.
fn validate_transition(
    current: &Assignment,
    input: StepInput,
) -> Result<(AssignmentStatus, FieldPatch), FleetError> {
    match (current.status, input) {
        (
            AssignmentStatus::Assigned,
            StepInput::Start {
                task,
                transport_type,
                start_address,
            },
        ) => {
            let transport_type = match task {
                TaskKind::Pickup => {
                    let t = transport_type.as_deref().map(str::trim).unwrap_or("");
                    if t.is_empty() {
                        return Err(FleetError::Validation(
                            "transport type is required for pickup tasks".to_owned(),
                        ));
                    }
                    Some(t.to_owned())
                }
                TaskKind::Dropoff => None,
            };
            Ok((
                AssignmentStatus::Pending,
                FieldPatch::Start {
                    task,
                    transport_type,
                    start_address: clean_address(start_address),
                },
            ))
        }

        (
            AssignmentStatus::Pending,
            StepInput::Pickup {
                images,
                pickup_address,
            },
        ) => {
            if images.len() != VEHICLE_PHOTO_COUNT {
                return Err(FleetError::Validation(format!(
                    "expected {VEHICLE_PHOTO_COUNT} vehicle photos, got {}",
                    images.len()
                )));
            }
            if images.iter().any(|r| r.trim().is_empty()) {
                return Err(FleetError::Validation(
                    "every vehicle photo slot needs a stored reference".to_owned(),
                ));
            }
            Ok((
                AssignmentStatus::Picked,
                FieldPatch::Pickup {
                    images,
                    pickup_address: clean_address(pickup_address),
                },
            ))
        }

        (
            AssignmentStatus::Picked,
            StepInput::Complete {
                final_image,
                drop_off_address,
            },
        ) => {
            if final_image.trim().is_empty() {
                return Err(FleetError::Validation(
                    "final photo reference must not be empty".to_owned(),
                ));
            }
            Ok((
                AssignmentStatus::Completed,
                FieldPatch::Complete {
                    final_image,
                    drop_off_address: clean_address(drop_off_address),
                },
            ))
        }

        (AssignmentStatus::Completed, _) => Err(FleetError::TransitionNotApplicable(format!(
            "assignment '{}' is already completed",
            current.id
        ))),

        (status, input) => Err(FleetError::TransitionNotApplicable(format!(
            "assignment '{}' is {status}; the {} step does not apply",
            current.id,
            input.step_name()
        ))),
    }
}

// Enrichment is best-effort: a blank resolved address is stored as absent,
// never as a validation failure.
fn clean_address(address: Option<String>) -> Option<String> {
    address
        .map(|a| a.trim().to_owned())
        .filter(|a| !a.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (tempfile::TempDir, Engine) {
        let td = tempfile::tempdir().expect("tempdir");
        let store = AssignmentStore::new(td.path().join("assignments"));
        (td, Engine::new(store))
    }

    fn seed(engine: &Engine, id: &str) -> Assignment {
        let a = Assignment::new(
            id.into(),
            "d1".into(),
            "AP01AB1234".into(),
            "2026-08-10".into(),
        );
        engine.store().save(&a).unwrap();
        a
    }

    fn start_input() -> StepInput {
        StepInput::Start {
            task: TaskKind::Pickup,
            transport_type: Some("car".into()),
            start_address: Some("Hyderabad".into()),
        }
    }

    fn photos() -> Vec<String> {
        vec!["f".into(), "l".into(), "b".into(), "r".into(), "o".into()]
    }

    fn advance_to_pending(engine: &Engine, id: &str) {
        engine.transition(id, start_input()).unwrap();
    }

    fn advance_to_picked(engine: &Engine, id: &str) {
        advance_to_pending(engine, id);
        engine
            .transition(
                id,
                StepInput::Pickup {
                    images: photos(),
                    pickup_address: None,
                },
            )
            .unwrap();
    }

    #[test]
    fn assigned_with_valid_input_becomes_pending() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        let updated = engine.transition("a1", start_input()).unwrap();
        assert_eq!(updated.status, AssignmentStatus::Pending);
        assert_eq!(updated.task, Some(TaskKind::Pickup));
        assert_eq!(updated.transport_type.as_deref(), Some("car"));
        assert_eq!(updated.start_address.as_deref(), Some("Hyderabad"));
        // Later steps' fields untouched.
        assert!(updated.images.is_empty());
        assert!(updated.final_image.is_none());
    }

    #[test]
    fn dropoff_needs_no_transport_type() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        let updated = engine
            .transition(
                "a1",
                StepInput::Start {
                    task: TaskKind::Dropoff,
                    transport_type: None,
                    start_address: None,
                },
            )
            .unwrap();
        assert_eq!(updated.status, AssignmentStatus::Pending);
        assert!(updated.transport_type.is_none());
        assert!(updated.start_address.is_none());
    }

    #[test]
    fn pickup_task_requires_transport_type() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        let err = engine
            .transition(
                "a1",
                StepInput::Start {
                    task: TaskKind::Pickup,
                    transport_type: Some("   ".into()),
                    start_address: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let stored = engine.store().find_by_id("a1").unwrap().unwrap();
        assert_eq!(stored.status, AssignmentStatus::Assigned);
    }

    #[test]
    fn fewer_than_five_photos_is_rejected() {
        let (_td, engine) = engine();
        seed(&engine, "a1");
        advance_to_pending(&engine, "a1");

        let err = engine
            .transition(
                "a1",
                StepInput::Pickup {
                    images: vec!["f".into(), "l".into(), "b".into()],
                    pickup_address: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let stored = engine.store().find_by_id("a1").unwrap().unwrap();
        assert_eq!(stored.status, AssignmentStatus::Pending);
        assert!(stored.images.is_empty());
    }

    #[test]
    fn blank_photo_slot_is_rejected() {
        let (_td, engine) = engine();
        seed(&engine, "a1");
        advance_to_pending(&engine, "a1");

        let mut images = photos();
        images[2] = "  ".into();
        let err = engine
            .transition(
                "a1",
                StepInput::Pickup {
                    images,
                    pickup_address: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }

    #[test]
    fn five_photos_advance_to_picked() {
        let (_td, engine) = engine();
        seed(&engine, "a1");
        advance_to_pending(&engine, "a1");

        let updated = engine
            .transition(
                "a1",
                StepInput::Pickup {
                    images: photos(),
                    pickup_address: Some("Depot 4".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.status, AssignmentStatus::Picked);
        assert_eq!(updated.images, photos());
        assert_eq!(updated.pickup_address.as_deref(), Some("Depot 4"));
    }

    #[test]
    fn empty_final_image_is_rejected_then_accepted() {
        let (_td, engine) = engine();
        seed(&engine, "a1");
        advance_to_picked(&engine, "a1");

        let err = engine
            .transition(
                "a1",
                StepInput::Complete {
                    final_image: String::new(),
                    drop_off_address: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let updated = engine
            .transition(
                "a1",
                StepInput::Complete {
                    final_image: "final".into(),
                    drop_off_address: Some("Yard 2".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.status, AssignmentStatus::Completed);
        assert_eq!(updated.final_image.as_deref(), Some("final"));
        assert_eq!(updated.drop_off_address.as_deref(), Some("Yard 2"));
    }

    #[test]
    fn completed_is_terminal() {
        let (_td, engine) = engine();
        seed(&engine, "a1");
        advance_to_picked(&engine, "a1");
        engine
            .transition(
                "a1",
                StepInput::Complete {
                    final_image: "final".into(),
                    drop_off_address: None,
                },
            )
            .unwrap();

        let err = engine.transition("a1", start_input()).unwrap_err();
        assert!(matches!(err, FleetError::TransitionNotApplicable(_)));
    }

    #[test]
    fn step_for_wrong_status_is_not_applicable() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        // Still ASSIGNED; the photo step does not apply yet.
        let err = engine
            .transition(
                "a1",
                StepInput::Pickup {
                    images: photos(),
                    pickup_address: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, FleetError::TransitionNotApplicable(_)));
    }

    #[test]
    fn repeated_submission_is_rejected_not_reapplied() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        engine.transition("a1", start_input()).unwrap();
        let err = engine.transition("a1", start_input()).unwrap_err();
        assert!(matches!(err, FleetError::TransitionNotApplicable(_)));
    }

    #[test]
    fn unknown_assignment_is_not_found() {
        let (_td, engine) = engine();
        let err = engine.transition("ghost", start_input()).unwrap_err();
        assert!(matches!(err, FleetError::AssignmentNotFound(_)));
    }

    #[test]
    fn blank_addresses_are_stored_as_absent() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        let updated = engine
            .transition(
                "a1",
                StepInput::Start {
                    task: TaskKind::Dropoff,
                    transport_type: None,
                    start_address: Some("   ".into()),
                },
            )
            .unwrap();
        assert!(updated.start_address.is_none());
    }

    #[test]
    fn concurrent_transitions_admit_exactly_one_winner() {
        let (_td, engine) = engine();
        seed(&engine, "a1");

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                engine.transition("a1", start_input())
            }));
        }

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(FleetError::TransitionNotApplicable(_))
        )));

        let stored = engine.store().find_by_id("a1").unwrap().unwrap();
        assert_eq!(stored.status, AssignmentStatus::Pending);
    }
}
