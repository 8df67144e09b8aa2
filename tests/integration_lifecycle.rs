use std::path::PathBuf;

use fleetops::action;
use fleetops::assignment::lifecycle::StepInput;
use fleetops::assignment::model::{Assignment, AssignmentStatus, TaskKind};
use fleetops::assignment::steps::{self, Step};
use fleetops::assignment::store::AssignmentStore;
use fleetops::driver::{Driver, DriverDirectory};
use fleetops::media::{ImageLimits, MediaStore};

struct Fixture {
    _td: tempfile::TempDir,
    store: AssignmentStore,
    drivers: DriverDirectory,
    media: MediaStore,
    photo_dir: PathBuf,
}

fn fixture() -> Fixture {
    let td = tempfile::tempdir().expect("tempdir");
    let store = AssignmentStore::new(td.path().join("assignments"));
    let drivers = DriverDirectory::new(td.path().join("drivers"));
    let media = MediaStore::new(
        td.path().join("media"),
        ImageLimits {
            max_bytes: 512 * 1024,
            max_dimension: 1920,
        },
    );
    let photo_dir = td.path().join("photos");
    std::fs::create_dir_all(&photo_dir).expect("photo dir");

    drivers
        .save(&Driver::new("d1".into(), "Rajesh".into(), Some("9618544459".into())))
        .expect("save driver");
    store
        .save(&Assignment::new(
            "a1".into(),
            "d1".into(),
            "AP01AB1234".into(),
            "2026-08-10".into(),
        ))
        .expect("save assignment");

    Fixture {
        _td: td,
        store,
        drivers,
        media,
        photo_dir,
    }
}

fn capture_photo(fx: &Fixture, name: &str) -> String {
    let path = fx.photo_dir.join(format!("{name}.jpg"));
    std::fs::write(&path, format!("jpeg-bytes-{name}")).expect("write photo");
    fx.media.store_file(&path).expect("store photo")
}

#[test]
fn full_lifecycle_walkthrough() {
    let fx = fixture();

    // ASSIGNED: the task-details step applies.
    let loaded = action::get_assignment(&fx.store, "a1");
    assert_eq!(loaded.status, 200);
    assert_eq!(
        steps::step_for(loaded.data.unwrap().status),
        Step::TaskDetails
    );

    // ASSIGNED -> PENDING with task type, transport and start address.
    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "d1",
        StepInput::Start {
            task: TaskKind::Pickup,
            transport_type: Some("car".into()),
            start_address: Some("Hyderabad".into()),
        },
    );
    assert_eq!(res.status, 200);
    assert_eq!(res.message, "success");
    let record = res.data.unwrap();
    assert_eq!(record.status, AssignmentStatus::Pending);
    assert_eq!(record.task, Some(TaskKind::Pickup));
    assert_eq!(record.transport_type.as_deref(), Some("car"));
    assert_eq!(record.start_address.as_deref(), Some("Hyderabad"));

    // Too few photos: rejected, status unchanged.
    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "d1",
        StepInput::Pickup {
            images: vec![
                capture_photo(&fx, "front"),
                capture_photo(&fx, "left"),
                capture_photo(&fx, "back"),
            ],
            pickup_address: None,
        },
    );
    assert_eq!(res.status, 422);
    let stored = fx.store.find_by_id("a1").unwrap().unwrap();
    assert_eq!(stored.status, AssignmentStatus::Pending);
    assert!(stored.images.is_empty());

    // PENDING -> PICKED with all five slots stored through the pipeline.
    let images: Vec<String> = ["front", "left", "back", "right", "odometer"]
        .iter()
        .map(|name| capture_photo(&fx, name))
        .collect();
    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "d1",
        StepInput::Pickup {
            images: images.clone(),
            pickup_address: Some("Depot 4, Hyderabad".into()),
        },
    );
    assert_eq!(res.status, 200);
    let record = res.data.unwrap();
    assert_eq!(record.status, AssignmentStatus::Picked);
    assert_eq!(record.images, images);
    // The start step's fields survived untouched.
    assert_eq!(record.start_address.as_deref(), Some("Hyderabad"));

    // A stale repeat of the start step no longer applies.
    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "d1",
        StepInput::Start {
            task: TaskKind::Pickup,
            transport_type: Some("car".into()),
            start_address: None,
        },
    );
    assert_eq!(res.status, 409);

    // PICKED -> COMPLETED with the final photo.
    let final_image = capture_photo(&fx, "handover");
    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "d1",
        StepInput::Complete {
            final_image: final_image.clone(),
            drop_off_address: Some("Yard 2".into()),
        },
    );
    assert_eq!(res.status, 200);
    let record = res.data.unwrap();
    assert_eq!(record.status, AssignmentStatus::Completed);
    assert_eq!(record.final_image.as_deref(), Some(final_image.as_str()));
    assert_eq!(steps::step_for(record.status), Step::Done);

    // Terminal: nothing further applies.
    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "d1",
        StepInput::Complete {
            final_image,
            drop_off_address: None,
        },
    );
    assert_eq!(res.status, 409);
}

#[test]
fn unknown_driver_and_assignment_are_404() {
    let fx = fixture();

    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "a1",
        "nobody",
        StepInput::Start {
            task: TaskKind::Dropoff,
            transport_type: None,
            start_address: None,
        },
    );
    assert_eq!(res.status, 404);

    let res = action::update_assignment(
        &fx.store,
        &fx.drivers,
        "missing",
        "d1",
        StepInput::Start {
            task: TaskKind::Dropoff,
            transport_type: None,
            start_address: None,
        },
    );
    assert_eq!(res.status, 404);
}

#[test]
fn stored_photo_references_are_content_addressed() {
    let fx = fixture();
    let a = capture_photo(&fx, "front");
    let b = capture_photo(&fx, "front");
    assert_eq!(a, b);
    assert!(fx.media.blob_path(&a).exists());
}

#[test]
fn oversized_photo_fails_its_slot() {
    let td = tempfile::tempdir().expect("tempdir");
    let media = MediaStore::new(
        td.path().join("media"),
        ImageLimits {
            max_bytes: 16,
            max_dimension: 1920,
        },
    );
    let path = td.path().join("big.jpg");
    std::fs::write(&path, vec![0u8; 64]).expect("write photo");
    assert!(media.store_file(&path).is_err());
}
