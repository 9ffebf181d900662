//! Common test utilities for sync integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use idsync_core::async_trait;
use idsync_core::prelude::*;
use serde_json::Value;

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Adapter operations, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchPopulation,
    FetchMemberships,
    FetchOne,
    Create,
    Update,
    Delete,
}

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchPopulation(Option<String>),
    FetchMemberships(String),
    FetchOne(String),
    Create(String),
    Update(String),
    Delete(String),
}

#[derive(Default)]
struct State {
    users: Vec<NativeRecord>,
    memberships: HashMap<String, Vec<String>>,
}

/// In-memory target directory.
///
/// Memberships written through the group attribute of a payload are stored
/// apart from the user record, the way a real directory keeps them.
pub struct MemoryDirectory {
    name: String,
    id_attribute: String,
    group_attribute: Option<String>,
    scope: Option<(String, Value)>,
    membership_delay: Duration,
    state: Mutex<State>,
    failures: Mutex<HashSet<(Op, String)>>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new(id_attribute: &str) -> Self {
        Self {
            name: "memory".to_string(),
            id_attribute: id_attribute.to_string(),
            group_attribute: None,
            scope: None,
            membership_delay: Duration::from_millis(2),
            state: Mutex::new(State::default()),
            failures: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_group_attribute(mut self, attribute: &str) -> Self {
        self.group_attribute = Some(attribute.to_string());
        self
    }

    /// Under any filter, only users whose `attribute` equals `value` are
    /// listed or in scope.
    pub fn with_scope(mut self, attribute: &str, value: Value) -> Self {
        self.scope = Some((attribute.to_string(), value));
        self
    }

    pub fn with_membership_delay(mut self, delay: Duration) -> Self {
        self.membership_delay = delay;
        self
    }

    /// Seed a user with memberships.
    pub fn seed(&self, user: Value, groups: &[&str]) {
        let record = NativeRecord::try_from(user).expect("seed must be an object");
        let id = record
            .get_str(&self.id_attribute)
            .expect("seed must carry an id")
            .to_string();
        let mut state = self.state.lock().unwrap();
        state
            .memberships
            .insert(id, groups.iter().map(|g| g.to_string()).collect());
        state.users.push(record);
    }

    /// Make `op` fail for `id` (use "" for population reads).
    pub fn fail_on(&self, op: Op, id: &str) {
        self.failures.lock().unwrap().insert((op, id.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that changed the directory, in order.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create(_) | Call::Update(_) | Call::Delete(_)))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn user(&self, id: &str) -> Option<NativeRecord> {
        let state = self.state.lock().unwrap();
        state
            .users
            .iter()
            .find(|u| u.get_str(&self.id_attribute) == Some(id))
            .cloned()
    }

    pub fn user_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .users
            .iter()
            .filter_map(|u| u.get_str(&self.id_attribute).map(str::to_string))
            .collect()
    }

    pub fn groups_of(&self, id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.memberships.get(id).cloned().unwrap_or_default()
    }

    fn record_call(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: Op, id: &str) -> AdapterResult<()> {
        if self.failures.lock().unwrap().contains(&(op, id.to_string())) {
            return Err(AdapterError::operation_failed(format!(
                "injected {op:?} failure for '{id}'"
            )));
        }
        Ok(())
    }

    fn split_groups(&self, mut record: NativeRecord) -> (NativeRecord, Option<Vec<String>>) {
        let groups = self
            .group_attribute
            .as_deref()
            .and_then(|attr| record.remove(attr))
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok());
        (record, groups)
    }

    fn matches_scope(&self, record: &NativeRecord, options: &ListOptions) -> bool {
        match (&self.scope, &options.filter) {
            (Some((attribute, value)), Some(_)) => record.get(attribute) == Some(value),
            _ => true,
        }
    }

    fn id_of(&self, record: &NativeRecord) -> AdapterResult<String> {
        record
            .get_str(&self.id_attribute)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::invalid_data(format!("missing '{}'", self.id_attribute)))
    }
}

#[async_trait]
impl ProviderAdapter for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_population(&self, options: &ListOptions) -> AdapterResult<Vec<NativeRecord>> {
        self.record_call(Call::FetchPopulation(options.filter.clone()));
        self.check(Op::FetchPopulation, "")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| self.matches_scope(u, options))
            .cloned()
            .collect())
    }

    async fn fetch_memberships(&self, user_id: &str) -> AdapterResult<Vec<String>> {
        self.record_call(Call::FetchMemberships(user_id.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.membership_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.check(Op::FetchMemberships, user_id)?;
        Ok(self.groups_of(user_id))
    }

    async fn fetch_one(&self, user_id: &str) -> AdapterResult<NativeRecord> {
        self.record_call(Call::FetchOne(user_id.to_string()));
        self.check(Op::FetchOne, user_id)?;
        self.user(user_id)
            .ok_or_else(|| AdapterError::not_found(user_id))
    }

    async fn create_record(&self, record: NativeRecord) -> AdapterResult<()> {
        let id = self.id_of(&record)?;
        self.record_call(Call::Create(id.clone()));
        self.check(Op::Create, &id)?;

        let (record, groups) = self.split_groups(record);
        let mut state = self.state.lock().unwrap();
        if state
            .users
            .iter()
            .any(|u| u.get_str(&self.id_attribute) == Some(id.as_str()))
        {
            return Err(AdapterError::already_exists(id));
        }
        state.users.push(record);
        state.memberships.insert(id, groups.unwrap_or_default());
        Ok(())
    }

    async fn update_record(&self, user_id: &str, record: NativeRecord) -> AdapterResult<()> {
        self.record_call(Call::Update(user_id.to_string()));
        self.check(Op::Update, user_id)?;

        let (record, groups) = self.split_groups(record);
        let mut state = self.state.lock().unwrap();
        let slot = state
            .users
            .iter_mut()
            .find(|u| u.get_str(&self.id_attribute) == Some(user_id))
            .ok_or_else(|| AdapterError::not_found(user_id))?;
        *slot = record;
        if let Some(groups) = groups {
            state.memberships.insert(user_id.to_string(), groups);
        }
        Ok(())
    }

    async fn delete_record(&self, user_id: &str) -> AdapterResult<()> {
        self.record_call(Call::Delete(user_id.to_string()));
        self.check(Op::Delete, user_id)?;

        let mut state = self.state.lock().unwrap();
        let before = state.users.len();
        state
            .users
            .retain(|u| u.get_str(&self.id_attribute) != Some(user_id));
        if state.users.len() == before {
            return Err(AdapterError::not_found(user_id));
        }
        state.memberships.remove(user_id);
        Ok(())
    }

    fn in_scope(&self, record: &NativeRecord, options: &ListOptions) -> AdapterResult<bool> {
        Ok(self.matches_scope(record, options))
    }
}
