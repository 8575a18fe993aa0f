//! Collaborator interfaces consumed by the queue.
//!
//! The platform around the queue owns patients, staff rosters, rooms,
//! appointments and tenant settings. The queue reaches them only through
//! these traits. Their failures are `anyhow::Error`s: the queue logs them and
//! carries on with whatever it could read.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use crate::models::{Appointment, Doctor, PatientName, Room, TenantScope, TenantSettings};

/// Time range checked for doctor appointment conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl AppointmentWindow {
    pub fn lookahead(from: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            from,
            until: from + chrono::Duration::minutes(minutes.max(0)),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.until
    }
}

pub trait PatientDirectory: Send + Sync {
    fn lookup(&self, scope: &TenantScope, patient_id: &str) -> anyhow::Result<Option<PatientName>>;
}

pub trait DoctorDirectory: Send + Sync {
    /// Doctors on duty for the tenant.
    fn list_available(&self, scope: &TenantScope) -> anyhow::Result<Vec<Doctor>>;
}

pub trait RoomDirectory: Send + Sync {
    /// Rooms open for consultations.
    fn list_available(&self, scope: &TenantScope) -> anyhow::Result<Vec<Room>>;
}

pub trait AppointmentDirectory: Send + Sync {
    fn upcoming_for(
        &self,
        scope: &TenantScope,
        doctor_id: &str,
        window: AppointmentWindow,
    ) -> anyhow::Result<Vec<Appointment>>;
}

pub trait SettingsProvider: Send + Sync {
    fn get(&self, scope: &TenantScope) -> anyhow::Result<TenantSettings>;
}

/// The full set of directories a queue service talks to.
#[derive(Clone)]
pub struct Directories {
    pub patients: Arc<dyn PatientDirectory>,
    pub doctors: Arc<dyn DoctorDirectory>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub appointments: Arc<dyn AppointmentDirectory>,
    pub settings: Arc<dyn SettingsProvider>,
}

impl Directories {
    /// Use one object for every directory.
    pub fn from_shared<T>(directory: Arc<T>) -> Self
    where
        T: PatientDirectory
            + DoctorDirectory
            + RoomDirectory
            + AppointmentDirectory
            + SettingsProvider
            + 'static,
    {
        Self {
            patients: directory.clone(),
            doctors: directory.clone(),
            rooms: directory.clone(),
            appointments: directory.clone(),
            settings: directory,
        }
    }
}

#[derive(Debug, Default)]
struct TenantDirectory {
    patients: HashMap<String, PatientName>,
    doctors: Vec<Doctor>,
    rooms: Vec<Room>,
    appointments: Vec<Appointment>,
    settings: Option<TenantSettings>,
}

/// Directory snapshot held in memory.
///
/// Hosts push the current roster into it (the FFI layer does this); tests use
/// it directly.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tenants: RwLock<HashMap<String, TenantDirectory>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn write<R>(
        &self,
        scope: &TenantScope,
        f: impl FnOnce(&mut TenantDirectory) -> R,
    ) -> anyhow::Result<R> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| anyhow!("directory lock poisoned"))?;
        Ok(f(tenants.entry(scope.id().to_string()).or_default()))
    }

    fn read<R>(
        &self,
        scope: &TenantScope,
        f: impl FnOnce(Option<&TenantDirectory>) -> R,
    ) -> anyhow::Result<R> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| anyhow!("directory lock poisoned"))?;
        Ok(f(tenants.get(scope.id())))
    }

    pub fn upsert_patient(
        &self,
        scope: &TenantScope,
        patient_id: &str,
        name: PatientName,
    ) -> anyhow::Result<()> {
        self.write(scope, |t| {
            t.patients.insert(patient_id.to_string(), name);
        })
    }

    /// Replace the on-duty roster.
    pub fn set_doctors(&self, scope: &TenantScope, doctors: Vec<Doctor>) -> anyhow::Result<()> {
        self.write(scope, |t| t.doctors = doctors)
    }

    pub fn set_rooms(&self, scope: &TenantScope, rooms: Vec<Room>) -> anyhow::Result<()> {
        self.write(scope, |t| t.rooms = rooms)
    }

    pub fn set_appointments(
        &self,
        scope: &TenantScope,
        appointments: Vec<Appointment>,
    ) -> anyhow::Result<()> {
        self.write(scope, |t| t.appointments = appointments)
    }

    pub fn add_appointment(
        &self,
        scope: &TenantScope,
        appointment: Appointment,
    ) -> anyhow::Result<()> {
        self.write(scope, |t| t.appointments.push(appointment))
    }

    pub fn set_settings(&self, scope: &TenantScope, settings: TenantSettings) -> anyhow::Result<()> {
        self.write(scope, |t| t.settings = Some(settings))
    }
}

impl PatientDirectory for InMemoryDirectory {
    fn lookup(&self, scope: &TenantScope, patient_id: &str) -> anyhow::Result<Option<PatientName>> {
        self.read(scope, |t| t.and_then(|t| t.patients.get(patient_id).cloned()))
    }
}

impl DoctorDirectory for InMemoryDirectory {
    fn list_available(&self, scope: &TenantScope) -> anyhow::Result<Vec<Doctor>> {
        self.read(scope, |t| t.map(|t| t.doctors.clone()).unwrap_or_default())
    }
}

impl RoomDirectory for InMemoryDirectory {
    fn list_available(&self, scope: &TenantScope) -> anyhow::Result<Vec<Room>> {
        self.read(scope, |t| t.map(|t| t.rooms.clone()).unwrap_or_default())
    }
}

impl AppointmentDirectory for InMemoryDirectory {
    fn upcoming_for(
        &self,
        scope: &TenantScope,
        doctor_id: &str,
        window: AppointmentWindow,
    ) -> anyhow::Result<Vec<Appointment>> {
        self.read(scope, |t| {
            t.map(|t| {
                t.appointments
                    .iter()
                    .filter(|a| a.doctor_id == doctor_id && window.contains(a.starts_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
        })
    }
}

impl SettingsProvider for InMemoryDirectory {
    fn get(&self, scope: &TenantScope) -> anyhow::Result<TenantSettings> {
        self.read(scope, |t| t.and_then(|t| t.settings.clone()).unwrap_or_default())
    }
}
