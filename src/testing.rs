//! In-memory fakes of the remote ports for tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::RemoteError;
use crate::models::{LegacyConstants, RawRecord, RecordField};
use crate::remote::{
    AreaKind, IdentityProviderPort, LegacyConfigPort, RemoteConfigPort, RemoteDistrict,
    RemoteDirectoryPort, RemoteRank, RemoteStation, RemoteUnit, SubjectId,
};

fn transient(what: &str) -> RemoteError {
    RemoteError::Transient(format!("{} unavailable", what))
}

/// Directory collection keyed by document id, plus an administrators list.
#[derive(Default)]
pub struct FakeRemoteDirectory {
    records: Mutex<BTreeMap<String, RawRecord>>,
    admins: Mutex<Vec<RawRecord>>,
    page_calls: AtomicUsize,
    email_lookups: AtomicUsize,
    fail_page_call: Mutex<Option<usize>>,
    failing_writes: AtomicBool,
    field_writes: Mutex<Vec<(String, RecordField, Value)>>,
}

impl FakeRemoteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let fake = Self::new();
        for record in records {
            fake.insert(record);
        }
        fake
    }

    pub fn insert(&self, record: RawRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.doc_id.clone(), record);
    }

    pub fn insert_admin(&self, record: RawRecord) {
        self.admins.lock().unwrap().push(record);
    }

    pub fn get(&self, doc_id: &str) -> Option<RawRecord> {
        self.records.lock().unwrap().get(doc_id).cloned()
    }

    pub fn update(&self, doc_id: &str, f: impl FnOnce(&mut RawRecord)) {
        if let Some(record) = self.records.lock().unwrap().get_mut(doc_id) {
            f(record);
        }
    }

    /// Make the `n`th `fetch_page` call (1-based) fail.
    pub fn fail_page_call(&self, n: usize) {
        *self.fail_page_call.lock().unwrap() = Some(n);
    }

    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn email_lookups(&self) -> usize {
        self.email_lookups.load(Ordering::SeqCst)
    }

    pub fn field_writes(&self) -> Vec<(String, RecordField, Value)> {
        self.field_writes.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(transient("remote write"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDirectoryPort for FakeRemoteDirectory {
    async fn fetch_page(
        &self,
        after_key: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<RawRecord>, RemoteError> {
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_page_call.lock().unwrap() == Some(call) {
            return Err(transient("page"));
        }

        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| after_key.map_or(true, |k| r.doc_id.as_str() > k))
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<RawRecord>, RemoteError> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .find(|r| r.email.as_deref() == Some(email))
            .cloned())
    }

    async fn fetch_by_admin_email(&self, email: &str) -> Result<Option<RawRecord>, RemoteError> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        let admins = self.admins.lock().unwrap();
        Ok(admins
            .iter()
            .find(|r| r.email.as_deref() == Some(email))
            .cloned())
    }

    async fn put_record(&self, record: &RawRecord) -> Result<(), RemoteError> {
        self.check_writable()?;
        self.insert(record.clone());
        Ok(())
    }

    async fn write_field(
        &self,
        key: &str,
        field: RecordField,
        value: Value,
    ) -> Result<(), RemoteError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(key)
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;

        let text = value.as_str().map(String::from);
        match field {
            RecordField::Name => record.name = text,
            RecordField::Email => record.email = text,
            RecordField::Rank => record.rank = text,
            RecordField::MetalNumber => record.metal_number = text,
            RecordField::Unit => record.unit = text,
            RecordField::District => record.district = text,
            RecordField::Station => record.station = text,
            RecordField::BloodGroup => record.blood_group = text,
            RecordField::PhotoRef => record.photo_url = text,
            RecordField::AuthSubjectId => record.auth_subject_id = text,
            RecordField::IsApproved => record.is_approved = value.as_bool(),
            RecordField::IsHidden => record.is_hidden = value.as_bool().unwrap_or(false),
            RecordField::MobileNumbers => {
                let numbers: Vec<String> =
                    serde_json::from_value(value.clone()).unwrap_or_default();
                record.mobile1 = numbers.first().cloned();
                record.mobile2 = numbers.get(1).cloned();
            }
        }
        drop(records);

        self.field_writes
            .lock()
            .unwrap()
            .push((key.to_string(), field, value));
        Ok(())
    }

    async fn write_pin(&self, key: &str, hash: &str) -> Result<(), RemoteError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(key) {
            record.pin_hash = Some(hash.to_string());
            return Ok(());
        }
        drop(records);

        let mut admins = self.admins.lock().unwrap();
        let admin = admins
            .iter_mut()
            .find(|r| r.doc_id == key)
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;
        admin.pin_hash = Some(hash.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.check_writable()?;
        self.records
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))
    }
}

/// Remote configuration collections with per-subsystem failure switches.
#[derive(Default)]
pub struct FakeRemoteConfig {
    pub units: Mutex<Vec<RemoteUnit>>,
    pub ranks: Mutex<Vec<RemoteRank>>,
    pub districts: Mutex<Vec<RemoteDistrict>>,
    pub stations: Mutex<Vec<RemoteStation>>,
    failing: Mutex<HashSet<&'static str>>,
    fetch_calls: AtomicUsize,
    areas: Mutex<BTreeMap<(AreaKind, String), Value>>,
    failing_area_deletes: AtomicBool,
}

impl FakeRemoteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fetches of one subsystem: "units", "ranks", "districts" or
    /// "stations".
    pub fn fail(&self, subsystem: &'static str) {
        self.failing.lock().unwrap().insert(subsystem);
    }

    pub fn fail_all(&self) {
        for subsystem in ["units", "ranks", "districts", "stations"] {
            self.fail(subsystem);
        }
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn area(&self, kind: AreaKind, key: &str) -> Option<Value> {
        self.areas
            .lock()
            .unwrap()
            .get(&(kind, key.to_string()))
            .cloned()
    }

    pub fn set_failing_area_deletes(&self, failing: bool) {
        self.failing_area_deletes.store(failing, Ordering::SeqCst);
    }

    fn begin_fetch(&self, subsystem: &'static str) -> Result<(), RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(subsystem) {
            return Err(transient(subsystem));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteConfigPort for FakeRemoteConfig {
    async fn fetch_units(&self) -> Result<Vec<RemoteUnit>, RemoteError> {
        self.begin_fetch("units")?;
        Ok(self.units.lock().unwrap().clone())
    }

    async fn fetch_ranks(&self) -> Result<Vec<RemoteRank>, RemoteError> {
        self.begin_fetch("ranks")?;
        Ok(self.ranks.lock().unwrap().clone())
    }

    async fn fetch_districts(&self) -> Result<Vec<RemoteDistrict>, RemoteError> {
        self.begin_fetch("districts")?;
        Ok(self.districts.lock().unwrap().clone())
    }

    async fn fetch_stations(&self) -> Result<Vec<RemoteStation>, RemoteError> {
        self.begin_fetch("stations")?;
        Ok(self.stations.lock().unwrap().clone())
    }

    async fn add_area(&self, kind: AreaKind, key: &str, payload: Value) -> Result<(), RemoteError> {
        self.areas
            .lock()
            .unwrap()
            .insert((kind, key.to_string()), payload);
        Ok(())
    }

    async fn delete_area(&self, kind: AreaKind, key: &str) -> Result<(), RemoteError> {
        if self.failing_area_deletes.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected(format!("cannot delete {}", key)));
        }
        self.areas.lock().unwrap().remove(&(kind, key.to_string()));
        Ok(())
    }
}

/// Legacy constants endpoint.
#[derive(Default)]
pub struct FakeLegacyConfig {
    constants: Mutex<LegacyConstants>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeLegacyConfig {
    pub fn new(constants: LegacyConstants) -> Self {
        Self {
            constants: Mutex::new(constants),
            ..Default::default()
        }
    }

    pub fn set_constants(&self, constants: LegacyConstants) {
        *self.constants.lock().unwrap() = constants;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LegacyConfigPort for FakeLegacyConfig {
    async fn fetch_constants(&self) -> Result<LegacyConstants, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(transient("legacy endpoint"));
        }
        Ok(self.constants.lock().unwrap().clone())
    }
}

/// Identity provider handing out a fixed subject id.
pub struct FakeIdentityProvider {
    subject: Mutex<SubjectId>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeIdentityProvider {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: Mutex::new(subject.to_string()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_subject(&self, subject: &str) {
        *self.subject.lock().unwrap() = subject.to_string();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProviderPort for FakeIdentityProvider {
    async fn bind_anonymous_session(&self) -> Result<SubjectId, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(transient("identity provider"));
        }
        Ok(self.subject.lock().unwrap().clone())
    }
}
