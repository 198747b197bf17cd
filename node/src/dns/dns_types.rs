//! DNS Record Type Definitions
//!
//! Record types accepted by the update gateway, the resource record shape the
//! orchestrator works with, and the error taxonomy shared by the DNS modules.

use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::{Action, ApiError, JobFailure};

/// Type code the zone management API uses for ANAME records
const ANAME_TYPE_CODE: u16 = 65280;

/// DNS record types the zone management API can store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    AAAA,
    /// Canonical name (alias)
    CNAME,
    /// Mail exchange
    MX,
    /// Text record
    TXT,
    /// Name server
    NS,
    /// Start of authority
    SOA,
    /// Certification Authority Authorization
    CAA,
    /// Service location
    SRV,
    /// Pointer record (reverse DNS)
    PTR,
    /// Delegation signer
    DS,
    /// Naming authority pointer
    NAPTR,
    /// TLS certificate association
    TLSA,
    /// Apex alias (provider specific, read only over DNS)
    ANAME,
}

impl DnsRecordType {
    /// Types restricted to a single value per owner name
    pub fn is_singleton(&self) -> bool {
        matches!(self, DnsRecordType::CNAME | DnsRecordType::SOA)
    }

    /// Types describing zone authority and delegation, never removed by an
    /// apex name deletion
    pub fn is_apex_protected(&self) -> bool {
        matches!(self, DnsRecordType::SOA | DnsRecordType::NS)
    }

    /// Whether records of this type may be changed through UPDATE messages
    pub fn is_updatable(&self) -> bool {
        !matches!(self, DnsRecordType::ANAME)
    }

    /// Map a wire record type onto a supported type
    pub fn from_hickory(rt: RecordType) -> Option<Self> {
        match rt {
            RecordType::A => Some(DnsRecordType::A),
            RecordType::AAAA => Some(DnsRecordType::AAAA),
            RecordType::CNAME => Some(DnsRecordType::CNAME),
            RecordType::MX => Some(DnsRecordType::MX),
            RecordType::TXT => Some(DnsRecordType::TXT),
            RecordType::NS => Some(DnsRecordType::NS),
            RecordType::SOA => Some(DnsRecordType::SOA),
            RecordType::CAA => Some(DnsRecordType::CAA),
            RecordType::SRV => Some(DnsRecordType::SRV),
            RecordType::PTR => Some(DnsRecordType::PTR),
            RecordType::DS => Some(DnsRecordType::DS),
            RecordType::NAPTR => Some(DnsRecordType::NAPTR),
            RecordType::TLSA => Some(DnsRecordType::TLSA),
            RecordType::Unknown(ANAME_TYPE_CODE) => Some(DnsRecordType::ANAME),
            _ => None,
        }
    }

    /// Wire record type for this type
    pub fn to_hickory(&self) -> RecordType {
        match self {
            DnsRecordType::A => RecordType::A,
            DnsRecordType::AAAA => RecordType::AAAA,
            DnsRecordType::CNAME => RecordType::CNAME,
            DnsRecordType::MX => RecordType::MX,
            DnsRecordType::TXT => RecordType::TXT,
            DnsRecordType::NS => RecordType::NS,
            DnsRecordType::SOA => RecordType::SOA,
            DnsRecordType::CAA => RecordType::CAA,
            DnsRecordType::SRV => RecordType::SRV,
            DnsRecordType::PTR => RecordType::PTR,
            DnsRecordType::DS => RecordType::DS,
            DnsRecordType::NAPTR => RecordType::NAPTR,
            DnsRecordType::TLSA => RecordType::TLSA,
            DnsRecordType::ANAME => RecordType::Unknown(ANAME_TYPE_CODE),
        }
    }
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::AAAA => write!(f, "AAAA"),
            DnsRecordType::CNAME => write!(f, "CNAME"),
            DnsRecordType::MX => write!(f, "MX"),
            DnsRecordType::TXT => write!(f, "TXT"),
            DnsRecordType::NS => write!(f, "NS"),
            DnsRecordType::SOA => write!(f, "SOA"),
            DnsRecordType::CAA => write!(f, "CAA"),
            DnsRecordType::SRV => write!(f, "SRV"),
            DnsRecordType::PTR => write!(f, "PTR"),
            DnsRecordType::DS => write!(f, "DS"),
            DnsRecordType::NAPTR => write!(f, "NAPTR"),
            DnsRecordType::TLSA => write!(f, "TLSA"),
            DnsRecordType::ANAME => write!(f, "ANAME"),
        }
    }
}

impl FromStr for DnsRecordType {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(DnsRecordType::A),
            "AAAA" => Ok(DnsRecordType::AAAA),
            "CNAME" => Ok(DnsRecordType::CNAME),
            "MX" => Ok(DnsRecordType::MX),
            "TXT" => Ok(DnsRecordType::TXT),
            "NS" => Ok(DnsRecordType::NS),
            "SOA" => Ok(DnsRecordType::SOA),
            "CAA" => Ok(DnsRecordType::CAA),
            "SRV" => Ok(DnsRecordType::SRV),
            "PTR" => Ok(DnsRecordType::PTR),
            "DS" => Ok(DnsRecordType::DS),
            "NAPTR" => Ok(DnsRecordType::NAPTR),
            "TLSA" => Ok(DnsRecordType::TLSA),
            "ANAME" => Ok(DnsRecordType::ANAME),
            _ => Err(DnsError::InvalidRecordType(s.to_string())),
        }
    }
}

/// A single resource record as carried by an update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name, canonical form
    pub name: String,
    /// Record type
    pub record_type: DnsRecordType,
    /// Record class (IN for additions, NONE for value deletions)
    pub class: DNSClass,
    /// Time to live in seconds
    pub ttl: u32,
    /// Presentation format rdata, empty for "delete" placeholders
    pub value: String,
}

impl ResourceRecord {
    /// Create a new IN-class record
    pub fn new(
        name: &str,
        record_type: DnsRecordType,
        ttl: u32,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: canonical_name(name),
            record_type,
            class: DNSClass::IN,
            ttl,
            value: value.into(),
        }
    }

    /// Create an A record
    pub fn a(name: &str, ip: Ipv4Addr, ttl: u32) -> Self {
        Self::new(name, DnsRecordType::A, ttl, ip.to_string())
    }

    /// Create an AAAA record
    pub fn aaaa(name: &str, ip: Ipv6Addr, ttl: u32) -> Self {
        Self::new(name, DnsRecordType::AAAA, ttl, ip.to_string())
    }

    /// Create a CNAME record
    pub fn cname(name: &str, target: &str, ttl: u32) -> Self {
        Self::new(name, DnsRecordType::CNAME, ttl, canonical_name(target))
    }

    /// Create a TXT record
    pub fn txt(name: &str, text: &str, ttl: u32) -> Self {
        Self::new(name, DnsRecordType::TXT, ttl, quote_txt(text.as_bytes()))
    }

    /// Override the record class
    pub fn with_class(mut self, class: DNSClass) -> Self {
        self.class = class;
        self
    }

    /// Convert a decoded wire record
    pub fn from_hickory(record: &Record) -> Result<Self, DnsError> {
        let record_type = DnsRecordType::from_hickory(record.record_type())
            .ok_or_else(|| DnsError::UnsupportedType(record.record_type().to_string()))?;

        Ok(Self {
            name: canonical_name(&record.name().to_ascii()),
            record_type,
            class: record.dns_class(),
            ttl: record.ttl(),
            value: rdata_value(record.data()),
        })
    }
}

/// Whether a wire record carries no rdata (RFC 2136 delete and prerequisite forms)
pub fn is_empty_rdata(record: &Record) -> bool {
    matches!(record.data(), RData::Update0(_))
}

/// Presentation format of an rdata value as stored by the zone API
pub fn rdata_value(rdata: &RData) -> String {
    match rdata {
        RData::TXT(txt) => txt
            .txt_data()
            .iter()
            .map(|chunk| quote_txt(chunk))
            .collect::<Vec<_>>()
            .join(" "),
        RData::Update0(_) => String::new(),
        other => other.to_string(),
    }
}

fn quote_txt(chunk: &[u8]) -> String {
    let text = String::from_utf8_lossy(chunk);
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Normalize an owner name: lowercase, fully qualified with a trailing dot
pub fn canonical_name(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.').to_lowercase();
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        format!("{}.", trimmed)
    }
}

/// Whether canonical `name` is at or below canonical `zone`
pub fn is_in_zone(name: &str, zone: &str) -> bool {
    zone == "." || name == zone || name.ends_with(&format!(".{}", zone))
}

/// DNS-specific errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DnsError {
    #[error("Invalid record type: {0}")]
    InvalidRecordType(String),

    #[error("Unsupported record type: {0}")]
    UnsupportedType(String),

    #[error("Owner name mismatch: set {expected}, record {actual}")]
    NameMismatch { expected: String, actual: String },

    #[error("Record type mismatch: set {expected}, record {actual}")]
    TypeMismatch {
        expected: DnsRecordType,
        actual: DnsRecordType,
    },

    #[error("Record class mismatch: expected IN, got {0}")]
    ClassMismatch(String),

    #[error("Conflict: {name} {record_type} can hold only one value")]
    Conflict {
        name: String,
        record_type: DnsRecordType,
    },

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Failed to look up zone {zone}: {source}")]
    ZoneLookup { zone: String, source: ApiError },

    #[error("Failed to get records of zone {zone} from API: {source}")]
    Sync { zone: String, source: ApiError },

    #[error("Update rejected: {}", join_errors(.0))]
    Rejected(Vec<DnsError>),

    #[error("Failed to {action} record name {name} rrtype {record_type}: {source}")]
    Submit {
        action: Action,
        name: String,
        record_type: DnsRecordType,
        source: ApiError,
    },

    #[error("{} record job(s) failed: {}", .0.len(), join_errors(.0))]
    BatchFailed(Vec<JobFailure>),

    #[error("Failed to request zone apply: {0}")]
    Apply(ApiError),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn join_errors<E: fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
