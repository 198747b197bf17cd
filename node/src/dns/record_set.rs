//! Record Sets
//!
//! All values sharing one owner name and type, managed as a unit. A set
//! enforces the per-type cardinality rules and keeps its values distinct.

use std::collections::HashSet;
use std::str::FromStr;

use hickory_proto::rr::DNSClass;

use super::{canonical_name, DnsError, DnsRecordType, RdataValue, RemoteRecord, ResourceRecord};

/// Lifecycle of a record set relative to the state it was loaded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSetState {
    /// Matches the remote store (or was never changed since creation)
    Unmodified,
    /// Changed locally, not yet persisted
    Modified,
}

/// Owner name + type record set
#[derive(Debug, Clone)]
pub struct RecordSet {
    name: String,
    record_type: DnsRecordType,
    ttl: u32,
    values: Vec<String>,
    remote_id: Option<String>,
    description: String,
    state: RecordSetState,
}

impl RecordSet {
    /// Create an empty, locally originated set
    pub fn new(name: &str, record_type: DnsRecordType, ttl: u32) -> Self {
        Self {
            name: canonical_name(name),
            record_type,
            ttl,
            values: Vec::new(),
            remote_id: None,
            description: String::new(),
            state: RecordSetState::Unmodified,
        }
    }

    /// Build a set from a record listed by the zone API
    pub fn from_remote(record: &RemoteRecord) -> Result<Self, DnsError> {
        let record_type = DnsRecordType::from_str(&record.rrtype)?;
        let mut set = Self::new(&record.name, record_type, record.ttl);

        for rdata in &record.rdata {
            if !set.values.contains(&rdata.value) {
                set.values.push(rdata.value.clone());
            }
        }
        if !record.id.is_empty() {
            set.remote_id = Some(record.id.clone());
        }
        set.description = record.description.clone();

        Ok(set)
    }

    /// Representation sent to the zone API, keeping the remote description
    pub fn to_remote(&self) -> RemoteRecord {
        RemoteRecord {
            id: self.remote_id.clone().unwrap_or_default(),
            name: self.name.clone(),
            ttl: self.ttl,
            rrtype: self.record_type.to_string(),
            rdata: self
                .values
                .iter()
                .map(|value| RdataValue {
                    value: value.clone(),
                })
                .collect(),
            description: self.description.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> DnsRecordType {
        self.record_type
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn state(&self) -> RecordSetState {
        self.state
    }

    /// Number of values in the set
    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Whether both sets hold the same values, ignoring order and TTL
    pub fn has_same_values(&self, other: &RecordSet) -> bool {
        let ours: HashSet<&str> = self.values.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = other.values.iter().map(String::as_str).collect();
        ours == theirs
    }

    /// Change the TTL of the whole set
    pub fn set_ttl(&mut self, ttl: u32) {
        if self.ttl != ttl {
            self.ttl = ttl;
            self.state = RecordSetState::Modified;
        }
    }

    /// Add one value. Re-adding an existing value is a no-op.
    pub fn add_value(&mut self, rr: &ResourceRecord) -> Result<(), DnsError> {
        self.check(rr)?;

        if self.contains(&rr.value) {
            return Ok(());
        }
        if self.record_type.is_singleton() && !self.values.is_empty() {
            return Err(DnsError::Conflict {
                name: self.name.clone(),
                record_type: self.record_type,
            });
        }

        self.values.push(rr.value.clone());
        self.state = RecordSetState::Modified;
        Ok(())
    }

    /// Remove an exact value. Removing a missing value is a no-op.
    pub fn remove_value(&mut self, value: &str) {
        let before = self.values.len();
        self.values.retain(|v| v != value);
        if self.values.len() != before {
            self.state = RecordSetState::Modified;
        }
    }

    /// Replace every value. All candidates are validated before any is
    /// committed; on error the set is left untouched.
    pub fn replace_values(&mut self, rrs: &[ResourceRecord]) -> Result<(), DnsError> {
        let mut values: Vec<String> = Vec::with_capacity(rrs.len());
        for rr in rrs {
            self.check(rr)?;
            if !values.contains(&rr.value) {
                values.push(rr.value.clone());
            }
        }

        if self.record_type.is_singleton() && values.len() > 1 {
            return Err(DnsError::Conflict {
                name: self.name.clone(),
                record_type: self.record_type,
            });
        }

        if let Some(first) = rrs.first() {
            self.set_ttl(first.ttl);
        }
        if values != self.values {
            self.values = values;
            self.state = RecordSetState::Modified;
        }
        Ok(())
    }

    /// Drop every value, marking the set for deletion
    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            self.values.clear();
            self.state = RecordSetState::Modified;
        }
    }

    fn check(&self, rr: &ResourceRecord) -> Result<(), DnsError> {
        if canonical_name(&rr.name) != self.name {
            return Err(DnsError::NameMismatch {
                expected: self.name.clone(),
                actual: rr.name.clone(),
            });
        }
        if rr.record_type != self.record_type {
            return Err(DnsError::TypeMismatch {
                expected: self.record_type,
                actual: rr.record_type,
            });
        }
        if rr.class != DNSClass::IN {
            return Err(DnsError::ClassMismatch(rr.class.to_string()));
        }
        Ok(())
    }
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.record_type == other.record_type
            && self.ttl == other.ttl
            && self.has_same_values(other)
    }
}

impl Eq for RecordSet {}
