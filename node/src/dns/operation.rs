//! Pending Record Operations
//!
//! An `OperationLog` collects the mutations of one update request into at
//! most one `Operation` per (owner name, type) key. Each operation carries
//! the post-mutation record set and the snapshot set it started from, which
//! together determine the remote action to submit.

use std::collections::HashMap;
use std::fmt;

use super::{canonical_name, DnsError, DnsRecordType, RecordSet, ResourceRecord, ZoneSnapshot};

/// Key of an operation: canonical owner name and type
pub type RecordKey = (String, DnsRecordType);

/// Remote action derived from an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Progress of an operation's remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Submitted,
    Waiting,
    Succeeded,
    Failed,
}

/// One pending remote action
#[derive(Debug, Clone)]
pub struct Operation {
    target: RecordSet,
    baseline: Option<RecordSet>,
    request_id: Option<String>,
    state: JobState,
}

impl Operation {
    fn new(target: RecordSet, baseline: Option<RecordSet>) -> Self {
        Self {
            target,
            baseline,
            request_id: None,
            state: JobState::Pending,
        }
    }

    pub fn key(&self) -> RecordKey {
        (self.target.name().to_string(), self.target.record_type())
    }

    /// Record set after every mutation of the batch
    pub fn target(&self) -> &RecordSet {
        &self.target
    }

    /// Snapshot record set the operation was derived from
    pub fn baseline(&self) -> Option<&RecordSet> {
        self.baseline.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Remote action needed to persist the target, `None` when nothing changed
    pub fn action(&self) -> Option<Action> {
        if self.baseline.as_ref() == Some(&self.target) {
            return None;
        }

        match (self.target.remote_id(), self.target.is_empty()) {
            (None, false) => Some(Action::Create),
            (Some(_), false) => Some(Action::Update),
            (Some(_), true) => Some(Action::Delete),
            (None, true) => None,
        }
    }

    pub(crate) fn mark_submitted(&mut self, request_id: String) {
        self.request_id = Some(request_id);
        self.state = JobState::Submitted;
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
    }
}

/// Mutations of one update request, built against a zone snapshot
pub struct OperationLog<'a> {
    snapshot: &'a ZoneSnapshot,
    operations: Vec<Operation>,
    index: HashMap<RecordKey, usize>,
}

impl<'a> OperationLog<'a> {
    pub fn new(snapshot: &'a ZoneSnapshot) -> Self {
        Self {
            snapshot,
            operations: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, name: &str, record_type: DnsRecordType) -> Option<&Operation> {
        let key = (canonical_name(name), record_type);
        self.index.get(&key).map(|&idx| &self.operations[idx])
    }

    /// Operations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Existing operation for the key, or a new one seeded from the snapshot
    pub fn get_or_create(&mut self, name: &str, record_type: DnsRecordType) -> &mut Operation {
        let key = (canonical_name(name), record_type);
        if let Some(&idx) = self.index.get(&key) {
            return &mut self.operations[idx];
        }

        let operation = match self.snapshot.rrset(&key.0, record_type) {
            Some(set) => Operation::new(set.clone(), Some(set.clone())),
            None => Operation::new(RecordSet::new(&key.0, record_type, 0), None),
        };

        let idx = self.operations.len();
        self.operations.push(operation);
        self.index.insert(key, idx);
        &mut self.operations[idx]
    }

    /// Add one record to its set
    pub fn add_rr(&mut self, rr: &ResourceRecord) -> Result<(), DnsError> {
        let operation = self.get_or_create(&rr.name, rr.record_type);
        operation.target.add_value(rr)?;
        operation.target.set_ttl(rr.ttl);
        Ok(())
    }

    /// Remove one value from its set
    pub fn remove_rr(&mut self, rr: &ResourceRecord) {
        let operation = self.get_or_create(&rr.name, rr.record_type);
        operation.target.remove_value(&rr.value);
    }

    /// Replace every value of a set
    pub fn replace_rrset(
        &mut self,
        name: &str,
        record_type: DnsRecordType,
        rrs: &[ResourceRecord],
    ) -> Result<(), DnsError> {
        let operation = self.get_or_create(name, record_type);
        operation.target.replace_values(rrs)
    }

    /// Empty a set. The operation stays registered so the delete is submitted.
    pub fn remove_rrset(&mut self, name: &str, record_type: DnsRecordType) {
        let operation = self.get_or_create(name, record_type);
        operation.target.clear();
    }

    /// Remove every set at a zone apex name except SOA and NS
    pub fn remove_name_apex(&mut self, name: &str) {
        for record_type in self.types_at(name) {
            if !record_type.is_apex_protected() {
                self.remove_rrset(name, record_type);
            }
        }
    }

    /// Remove every set at a name
    pub fn remove_name(&mut self, name: &str) {
        for record_type in self.types_at(name) {
            self.remove_rrset(name, record_type);
        }
    }

    /// Consume the log, releasing the snapshot borrow
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    /// Types present at a name, in the snapshot or added by this batch
    fn types_at(&self, name: &str) -> Vec<DnsRecordType> {
        let name = canonical_name(name);
        let mut types: Vec<DnsRecordType> = self
            .snapshot
            .rrsets_at(&name)
            .map(|set| set.record_type())
            .collect();

        for operation in &self.operations {
            if operation.target.name() == name && !types.contains(&operation.target.record_type()) {
                types.push(operation.target.record_type());
            }
        }
        types
    }
}
