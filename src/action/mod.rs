#![forbid(unsafe_code)]

use serde::Serialize;

use crate::assignment::lifecycle::{Engine, StepInput};
use crate::assignment::model::Assignment;
use crate::assignment::store::AssignmentStore;
use crate::driver::DriverDirectory;
use crate::error::FleetError;

/// Response envelope for the action boundary: an HTTP-ish status code, a
/// short message, and the updated record on success.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Assignment>,
}

impl ActionResponse {
    #[must_use]
    pub fn ok(data: Assignment) -> Self {
        Self {
            status: 200,
            message: "success".to_owned(),
            data: Some(data),
        }
    }

    #[must_use]
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Submit one lifecycle step on a driver's behalf.
///
/// 404 when the assignment or driver does not exist, 422 when the submitted
/// fields fail the current step's validation, 409 when the stored status no
/// longer matches the step (stale client or lost race), 500 on persistence
/// failures with the detail kept out of the response.
pub fn update_assignment(
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    assignment_id: &str,
    driver_id: &str,
    submitted: StepInput,
) -> ActionResponse {
    let driver = match drivers.find_by_id(driver_id) {
        Ok(found) => found,
        Err(e) => {
            tracing::error!(error = %e, "driver directory failure");
            return ActionResponse::error(500, "Failed to update assignment!");
        }
    };
    if driver.is_none() {
        return from_error(&FleetError::DriverNotFound(driver_id.to_owned()));
    }

    let current = match store.find_by_id(assignment_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return from_error(&FleetError::AssignmentNotFound(assignment_id.to_owned()));
        }
        Err(e) => {
            tracing::error!(error = %e, "assignment store failure");
            return ActionResponse::error(500, "Failed to update assignment!");
        }
    };
    if current.driver_id != driver_id {
        return from_error(&FleetError::Validation(format!(
            "driver '{driver_id}' is not assigned to '{assignment_id}'"
        )));
    }

    match Engine::new(store.clone()).transition(assignment_id, submitted) {
        Ok(updated) => ActionResponse::ok(updated),
        Err(e) => from_error(&e),
    }
}

/// Load an assignment for display. 200 with the record, or 404.
pub fn get_assignment(store: &AssignmentStore, assignment_id: &str) -> ActionResponse {
    match store.find_by_id(assignment_id) {
        Ok(Some(record)) => ActionResponse::ok(record),
        Ok(None) => from_error(&FleetError::AssignmentNotFound(assignment_id.to_owned())),
        Err(e) => {
            tracing::error!(error = %e, "assignment store failure");
            ActionResponse::error(500, "Failed to fetch assignment!")
        }
    }
}

fn from_error(e: &FleetError) -> ActionResponse {
    match e {
        FleetError::AssignmentNotFound(_) | FleetError::DriverNotFound(_) => {
            ActionResponse::error(404, e.to_string())
        }
        FleetError::Validation(_) => ActionResponse::error(422, e.to_string()),
        FleetError::TransitionNotApplicable(_) => ActionResponse::error(409, e.to_string()),
        // Persistence detail is logged where it happened; callers get a
        // generic, retryable failure.
        FleetError::Persistence(_) => ActionResponse::error(500, "Failed to update assignment!"),
        other => ActionResponse::error(500, other.to_string()),
    }
}
