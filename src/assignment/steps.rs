#![forbid(unsafe_code)]

use crate::assignment::model::{AssignmentStatus, PhotoSlot};

/// The capture step a driver sees for a given assignment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Capture task type, transport mode, start address.
    TaskDetails,
    /// Capture the five vehicle photos and the pickup address.
    VehiclePhotos,
    /// Capture the final handover photo and the drop-off address.
    FinalPhoto,
    /// Terminal display; nothing left to capture.
    Done,
}

/// Total over the status enum; unknown status strings never reach this
/// point because deserialization already rejects them.
#[must_use]
pub fn step_for(status: AssignmentStatus) -> Step {
    match status {
        AssignmentStatus::Assigned => Step::TaskDetails,
        AssignmentStatus::Pending => Step::VehiclePhotos,
        AssignmentStatus::Picked => Step::FinalPhoto,
        AssignmentStatus::Completed => Step::Done,
    }
}

impl Step {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::TaskDetails => "Task details",
            Self::VehiclePhotos => "Vehicle photos",
            Self::FinalPhoto => "Final photo",
            Self::Done => "Completed",
        }
    }

    /// Short description of what the step captures, for display.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::TaskDetails => {
                "choose task type (pickup|dropoff), transport mode for pickups; \
                 start address is captured automatically"
                    .to_owned()
            }
            Self::VehiclePhotos => {
                let slots: Vec<&str> = PhotoSlot::ALL.iter().map(|s| s.label()).collect();
                format!(
                    "upload one photo per slot ({}); pickup address is captured automatically",
                    slots.join(", ")
                )
            }
            Self::FinalPhoto => {
                "upload the final handover photo; drop-off address is captured automatically"
                    .to_owned()
            }
            Self::Done => "assignment is complete; no further input".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_maps_to_a_step() {
        assert_eq!(step_for(AssignmentStatus::Assigned), Step::TaskDetails);
        assert_eq!(step_for(AssignmentStatus::Pending), Step::VehiclePhotos);
        assert_eq!(step_for(AssignmentStatus::Picked), Step::FinalPhoto);
        assert_eq!(step_for(AssignmentStatus::Completed), Step::Done);
    }

    #[test]
    fn photo_step_lists_all_slots() {
        let desc = Step::VehiclePhotos.describe();
        for slot in PhotoSlot::ALL {
            assert!(desc.contains(slot.label()), "missing slot {}", slot.label());
        }
    }
}
