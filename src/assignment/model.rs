#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states in their fixed forward order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentStatus {
    Assigned,
    Pending,
    Picked,
    Completed,
}

impl AssignmentStatus {
    /// The only status this one may advance to. Completed is terminal.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Assigned => Some(Self::Pending),
            Self::Pending => Some(Self::Picked),
            Self::Picked => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "ASSIGNED",
            Self::Pending => "PENDING",
            Self::Picked => "PICKED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    Pickup,
    Dropoff,
}

impl TaskKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pickup => "PICKUP",
            Self::Dropoff => "DROPOFF",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PICKUP" => Ok(Self::Pickup),
            "DROPOFF" => Ok(Self::Dropoff),
            other => Err(format!("unknown task type '{other}' (expected pickup|dropoff)")),
        }
    }
}

/// Named photo slots for the vehicle photo step, in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSlot {
    Front,
    Left,
    Back,
    Right,
    Odometer,
}

impl PhotoSlot {
    pub const ALL: [Self; 5] = [
        Self::Front,
        Self::Left,
        Self::Back,
        Self::Right,
        Self::Odometer,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Left => "left",
            Self::Back => "back",
            Self::Right => "right",
            Self::Odometer => "odometer",
        }
    }
}

pub const VEHICLE_PHOTO_COUNT: usize = PhotoSlot::ALL.len();

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub id: String,
    pub driver_id: String,
    pub car_plate: String,
    /// Scheduled date, ISO `YYYY-MM-DD`.
    pub pickup_date: String,
    pub status: AssignmentStatus,

    #[serde(default)]
    pub task: Option<TaskKind>,
    #[serde(default)]
    pub transport_type: Option<String>,
    #[serde(default)]
    pub start_address: Option<String>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub drop_off_address: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub final_image: Option<String>,

    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Assignment {
    #[must_use]
    pub fn new(id: String, driver_id: String, car_plate: String, pickup_date: String) -> Self {
        Self {
            id,
            driver_id,
            car_plate,
            pickup_date,
            status: AssignmentStatus::Assigned,
            task: None,
            transport_type: None,
            start_address: None,
            pickup_address: None,
            drop_off_address: None,
            images: Vec::new(),
            final_image: None,
            created_at: now_rfc3339(),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn new_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        id.chars().take(6).collect()
    }
}

/// The fields a single transition commits alongside its status change.
/// One variant per step; a transition never touches another step's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPatch {
    Start {
        task: TaskKind,
        transport_type: Option<String>,
        start_address: Option<String>,
    },
    Pickup {
        images: Vec<String>,
        pickup_address: Option<String>,
    },
    Complete {
        final_image: String,
        drop_off_address: Option<String>,
    },
}

impl FieldPatch {
    /// Apply this patch onto a record. Only the fields owned by the patch's
    /// step are written; everything else is left as stored.
    pub(crate) fn apply(&self, record: &mut Assignment) {
        match self {
            Self::Start {
                task,
                transport_type,
                start_address,
            } => {
                record.task = Some(*task);
                record.transport_type.clone_from(transport_type);
                record.start_address.clone_from(start_address);
            }
            Self::Pickup {
                images,
                pickup_address,
            } => {
                record.images.clone_from(images);
                record.pickup_address.clone_from(pickup_address);
            }
            Self::Complete {
                final_image,
                drop_off_address,
            } => {
                record.final_image = Some(final_image.clone());
                record.drop_off_address.clone_from(drop_off_address);
            }
        }
    }
}

/// Uppercase and check a vehicle plate. Returns the normalized plate.
pub fn normalize_car_plate(input: &str) -> Result<String, String> {
    let plate = input.trim().to_uppercase();
    if plate.len() < 2 {
        return Err("plate must be at least 2 characters".to_owned());
    }
    if plate.len() > 16 {
        return Err("plate must be at most 16 characters".to_owned());
    }
    let re = Regex::new(r"^[A-Z0-9]+$").map_err(|e| e.to_string())?;
    if !re.is_match(&plate) {
        return Err(format!("plate '{plate}' must contain only letters and digits"));
    }
    Ok(plate)
}

/// Check a scheduled date string (`YYYY-MM-DD`). Returns the trimmed input.
pub fn validate_pickup_date(input: &str) -> Result<String, String> {
    let s = input.trim();
    time::Date::parse(s, &time::format_description::well_known::Iso8601::DEFAULT)
        .map_err(|e| format!("invalid pickup date '{s}': {e}"))?;
    Ok(s.to_owned())
}

#[must_use]
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_owned())
}
