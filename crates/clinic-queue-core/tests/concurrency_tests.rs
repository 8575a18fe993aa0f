//! Ticket issuance and optimizer passes racing on one database file.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{TimeZone, Utc};
use clinic_queue_core::db::Database;
use clinic_queue_core::directory::{Directories, InMemoryDirectory};
use clinic_queue_core::models::{
    Doctor, PatientName, QueueAction, QueueStatus, QueueType, Room, TenantScope, TenantSettings,
};
use clinic_queue_core::queue::{ActiveFilter, EnqueueRequest, QueueOptimizer, QueueService};
use clinic_queue_core::QueueConfig;

fn clinic() -> TenantScope {
    TenantScope::new("clinicA").unwrap()
}

fn shared_directory(patients: usize) -> Arc<InMemoryDirectory> {
    let dir = Arc::new(InMemoryDirectory::new());
    for i in 0..patients {
        dir.upsert_patient(
            &clinic(),
            &format!("p{}", i),
            PatientName {
                first_name: format!("First{}", i),
                last_name: "Racer".into(),
            },
        )
        .unwrap();
    }
    dir.set_doctors(&clinic(), vec![Doctor::new("d1", "Dr. Osei"), Doctor::new("d2", "Dr. Ng")])
        .unwrap();
    dir
}

/// Each thread opens its own connection to the file, like separate workers would.
fn enqueue_concurrently(
    path: PathBuf,
    dir: Arc<InMemoryDirectory>,
    patients: Vec<String>,
) -> Vec<String> {
    let barrier = Arc::new(Barrier::new(patients.len()));
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();

    let handles: Vec<_> = patients
        .into_iter()
        .map(|patient| {
            let path = path.clone();
            let dir = dir.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                let directories = Directories::from_shared(dir);
                let config = QueueConfig::default();
                let service = QueueService::new(&db, &directories, &config);
                barrier.wait();
                service
                    .enqueue_at(&clinic(), EnqueueRequest::new(patient, QueueType::WalkIn), at)
                    .unwrap()
                    .queue_number
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_two_concurrent_walk_ins_get_distinct_tickets() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.db");
    let dir = shared_directory(5);
    dir.set_settings(
        &clinic(),
        TenantSettings {
            auto_queue_optimization: false,
            ..Default::default()
        },
    )
    .unwrap();

    // Three tickets already issued today
    {
        let db = Database::open(&path).unwrap();
        let directories = Directories::from_shared(dir.clone());
        let config = QueueConfig::default();
        let service = QueueService::new(&db, &directories, &config);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        for p in ["p0", "p1", "p2"] {
            service
                .enqueue_at(&clinic(), EnqueueRequest::new(p, QueueType::WalkIn), at)
                .unwrap();
        }
    }

    let mut tickets = enqueue_concurrently(path, dir, vec!["p3".into(), "p4".into()]);
    tickets.sort();
    assert_eq!(tickets, vec!["W20240301-004", "W20240301-005"]);
}

#[test]
fn test_many_concurrent_enqueues_stay_unique() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.db");
    let dir = shared_directory(6);
    Database::open(&path).unwrap();

    let patients = (0..6).map(|i| format!("p{}", i)).collect();
    let tickets = enqueue_concurrently(path.clone(), dir, patients);

    let unique: HashSet<_> = tickets.iter().collect();
    assert_eq!(unique.len(), tickets.len());

    let db = Database::open(&path).unwrap();
    let active = db.list_active_entries(&clinic(), &ActiveFilter::default()).unwrap();
    assert_eq!(active.len(), 6);
}

#[test]
fn test_concurrent_optimizer_passes_converge() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.db");
    let dir = shared_directory(4);
    dir.set_settings(
        &clinic(),
        TenantSettings {
            auto_queue_optimization: false,
            ..Default::default()
        },
    )
    .unwrap();
    {
        let db = Database::open(&path).unwrap();
        let directories = Directories::from_shared(dir.clone());
        let config = QueueConfig::default();
        let service = QueueService::new(&db, &directories, &config);
        for i in 0..4 {
            service
                .enqueue(&clinic(), EnqueueRequest::new(format!("p{}", i), QueueType::WalkIn))
                .unwrap();
        }
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let dir = dir.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                let directories = Directories::from_shared(dir);
                let config = QueueConfig::default();
                barrier.wait();
                QueueOptimizer::new(&db, &directories, &config)
                    .run(&clinic())
                    .unwrap()
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let db = Database::open(&path).unwrap();
    let directories = Directories::from_shared(dir);
    let config = QueueConfig::default();
    let settled = QueueOptimizer::new(&db, &directories, &config)
        .run(&clinic())
        .unwrap();
    assert!(settled.changes.is_empty(), "not converged: {:?}", settled.changes);

    let active = db.list_active_entries(&clinic(), &ActiveFilter::default()).unwrap();
    assert!(active.iter().all(|e| e.doctor_id.is_some()));
    let estimates: Vec<_> = active.iter().map(|e| e.estimated_wait_minutes).collect();
    assert_eq!(estimates, vec![Some(0), Some(15), Some(30), Some(45)]);
}

#[test]
fn test_concurrent_starts_never_share_a_room() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.db");
    let dir = shared_directory(2);
    dir.set_rooms(&clinic(), vec![Room::new("r1", "Room 1")]).unwrap();
    dir.set_settings(
        &clinic(),
        TenantSettings {
            auto_queue_optimization: false,
            ..Default::default()
        },
    )
    .unwrap();

    let ids: Vec<String> = {
        let db = Database::open(&path).unwrap();
        let directories = Directories::from_shared(dir.clone());
        let config = QueueConfig::default();
        let service = QueueService::new(&db, &directories, &config);
        ["p0", "p1"]
            .iter()
            .map(|p| {
                service
                    .enqueue(&clinic(), EnqueueRequest::new(*p, QueueType::WalkIn))
                    .unwrap()
                    .id
            })
            .collect()
    };

    let barrier = Arc::new(Barrier::new(ids.len()));
    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let path = path.clone();
            let dir = dir.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                let directories = Directories::from_shared(dir);
                let config = QueueConfig::default();
                let service = QueueService::new(&db, &directories, &config);
                barrier.wait();
                service
                    .transition(&clinic(), &id, QueueAction::Start)
                    .unwrap()
                    .room_id
            })
        })
        .collect();
    let mut rooms: Vec<Option<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    rooms.sort();
    assert_eq!(rooms, vec![None, Some("r1".to_string())]);

    let db = Database::open(&path).unwrap();
    let filter = ActiveFilter {
        status: Some(QueueStatus::InProgress),
        room_id: Some("r1".into()),
        ..Default::default()
    };
    assert_eq!(db.list_active_entries(&clinic(), &filter).unwrap().len(), 1);
}
