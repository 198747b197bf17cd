//! Dynamic Update Handling (RFC 2136)
//!
//! Turns a decoded UPDATE message into a batch of record operations and
//! drives it through the job coordinator. The flow for one request:
//!
//! 1. the zone section names exactly one zone, resolved via the metadata cache
//! 2. the zone snapshot is re-synchronized from the zone management API
//! 3. prerequisites are checked against the snapshot
//! 4. every update record is prescanned before anything is changed
//! 5. updates are applied to an operation log, then executed as one batch

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hickory_proto::op::{Message, OpCode, ResponseCode};
use hickory_proto::rr::{DNSClass, Record, RecordType};
use tracing::{debug, info, warn};

use super::{
    canonical_name, is_empty_rdata, DnsError, DnsRecordType, JobCoordinator, Operation,
    OperationLog, RecordSet, ResourceRecord, UpdateConfig, ZoneApi, ZoneMetadataCache,
    ZoneSnapshot, ZoneSynchronizer,
};

/// Prescanned update record
#[derive(Debug, Clone, PartialEq, Eq)]
enum UpdateInstruction {
    /// Add a record to its set
    Add(ResourceRecord),
    /// Delete every set at a name
    DeleteName(String),
    /// Delete one set
    DeleteRRSet(String, DnsRecordType),
    /// Delete one value from its set
    DeleteRR(ResourceRecord),
}

/// Serves UPDATE messages against the zone management API
pub struct UpdateHandler {
    zones: ZoneMetadataCache,
    synchronizer: ZoneSynchronizer,
    coordinator: JobCoordinator,
}

impl UpdateHandler {
    pub fn new(api: Arc<dyn ZoneApi>, config: &UpdateConfig) -> Self {
        Self {
            zones: ZoneMetadataCache::new(Arc::clone(&api)),
            synchronizer: ZoneSynchronizer::new(Arc::clone(&api), config.page_size),
            coordinator: JobCoordinator::new(api, config.apply_description.clone()),
        }
    }

    pub fn zones(&self) -> &ZoneMetadataCache {
        &self.zones
    }

    pub fn synchronizer(&self) -> &ZoneSynchronizer {
        &self.synchronizer
    }

    /// Process an UPDATE message and return the response code
    pub async fn handle_update(&self, message: &Message) -> ResponseCode {
        if message.op_code() != OpCode::Update {
            return ResponseCode::NotImp;
        }

        match self.process(message).await {
            Ok(code) => {
                if code != ResponseCode::NoError {
                    debug!("Update {} answered {}", message.id(), code);
                }
                code
            }
            Err(e) => {
                warn!("Update {} failed: {}", message.id(), e);
                failure_code(&e)
            }
        }
    }

    async fn process(&self, message: &Message) -> Result<ResponseCode, DnsError> {
        let queries = message.queries();
        if queries.len() != 1 {
            return Ok(ResponseCode::Refused);
        }
        let question = &queries[0];
        if question.query_type() != RecordType::SOA {
            return Ok(ResponseCode::FormErr);
        }

        let zone_name = canonical_name(&question.name().to_ascii());
        let zone = self
            .zones
            .resolve(&zone_name)
            .await
            .map_err(|source| DnsError::ZoneLookup {
                zone: zone_name.clone(),
                source,
            })?
            .ok_or_else(|| DnsError::ZoneNotFound(zone_name.clone()))?;

        let snapshot = self.synchronizer.sync(&zone).await?;

        if let Err(code) = check_prerequisites(&snapshot, message.answers()) {
            return Ok(code);
        }
        let instructions = match prescan(&snapshot, message.name_servers()) {
            Ok(instructions) => instructions,
            Err(code) => return Ok(code),
        };

        let operations = build_operations(&snapshot, &instructions)?;
        let report = self.coordinator.execute(&zone, operations).await?;
        info!("Update {} for zone {}: {}", message.id(), zone.name, report);

        Ok(ResponseCode::NoError)
    }
}

/// Response code for an orchestration failure
fn failure_code(err: &DnsError) -> ResponseCode {
    match err {
        DnsError::ZoneNotFound(_) | DnsError::ZoneLookup { .. } => ResponseCode::Refused,
        _ => ResponseCode::ServFail,
    }
}

fn owner_name(record: &Record) -> String {
    canonical_name(&record.name().to_ascii())
}

/// Evaluate the prerequisite section (RFC 2136 section 3.2)
fn check_prerequisites(snapshot: &ZoneSnapshot, prerequisites: &[Record]) -> Result<(), ResponseCode> {
    let mut expected: HashMap<(String, DnsRecordType), HashSet<String>> = HashMap::new();

    for record in prerequisites {
        if record.ttl() != 0 {
            return Err(ResponseCode::FormErr);
        }
        let name = owner_name(record);
        if !snapshot.contains_name(&name) {
            return Err(ResponseCode::NotZone);
        }

        let rrset_exists = |rt: RecordType| {
            DnsRecordType::from_hickory(rt)
                .and_then(|t| snapshot.rrset(&name, t))
                .map_or(false, |set| !set.is_empty())
        };

        match record.dns_class() {
            DNSClass::ANY => {
                if !is_empty_rdata(record) {
                    return Err(ResponseCode::FormErr);
                }
                if record.record_type() == RecordType::ANY {
                    if !snapshot.name_exists(&name) {
                        return Err(ResponseCode::NXDomain);
                    }
                } else if !rrset_exists(record.record_type()) {
                    return Err(ResponseCode::NXRRSet);
                }
            }
            DNSClass::NONE => {
                if !is_empty_rdata(record) {
                    return Err(ResponseCode::FormErr);
                }
                if record.record_type() == RecordType::ANY {
                    if snapshot.name_exists(&name) {
                        return Err(ResponseCode::YXDomain);
                    }
                } else if rrset_exists(record.record_type()) {
                    return Err(ResponseCode::YXRRSet);
                }
            }
            DNSClass::IN => {
                let rr = ResourceRecord::from_hickory(record).map_err(|_| ResponseCode::NXRRSet)?;
                expected
                    .entry((rr.name, rr.record_type))
                    .or_default()
                    .insert(rr.value);
            }
            _ => return Err(ResponseCode::FormErr),
        }
    }

    // Value-dependent prerequisites compare whole sets
    for ((name, record_type), values) in &expected {
        let actual: HashSet<String> = snapshot
            .rrset(name, *record_type)
            .map(|set| set.values().iter().cloned().collect())
            .unwrap_or_default();
        if &actual != values {
            return Err(ResponseCode::NXRRSet);
        }
    }

    Ok(())
}

/// Validate the update section before anything is changed (RFC 2136 section 3.4.1)
fn prescan(snapshot: &ZoneSnapshot, updates: &[Record]) -> Result<Vec<UpdateInstruction>, ResponseCode> {
    let mut instructions = Vec::with_capacity(updates.len());

    for record in updates {
        let name = owner_name(record);
        if !snapshot.contains_name(&name) {
            return Err(ResponseCode::NotZone);
        }

        let supported = DnsRecordType::from_hickory(record.record_type()).filter(DnsRecordType::is_updatable);

        let instruction = match record.dns_class() {
            DNSClass::IN => {
                if supported.is_none() || is_empty_rdata(record) {
                    return Err(ResponseCode::FormErr);
                }
                let rr = ResourceRecord::from_hickory(record).map_err(|_| ResponseCode::FormErr)?;
                UpdateInstruction::Add(rr)
            }
            DNSClass::ANY => {
                if record.ttl() != 0 || !is_empty_rdata(record) {
                    return Err(ResponseCode::FormErr);
                }
                if record.record_type() == RecordType::ANY {
                    UpdateInstruction::DeleteName(name)
                } else {
                    let record_type = supported.ok_or(ResponseCode::FormErr)?;
                    UpdateInstruction::DeleteRRSet(name, record_type)
                }
            }
            DNSClass::NONE => {
                if record.ttl() != 0 || supported.is_none() {
                    return Err(ResponseCode::FormErr);
                }
                let rr = ResourceRecord::from_hickory(record).map_err(|_| ResponseCode::FormErr)?;
                UpdateInstruction::DeleteRR(rr)
            }
            _ => return Err(ResponseCode::FormErr),
        };
        instructions.push(instruction);
    }

    Ok(instructions)
}

/// Apply prescanned updates to an operation log.
///
/// Validation errors are collected across every update; any error rejects
/// the whole batch before anything is submitted.
fn build_operations(
    snapshot: &ZoneSnapshot,
    instructions: &[UpdateInstruction],
) -> Result<Vec<Operation>, DnsError> {
    let apex = snapshot.apex();
    let mut log = OperationLog::new(snapshot);
    let mut errors = Vec::new();

    for instruction in instructions {
        let result = match instruction {
            UpdateInstruction::Add(rr) if rr.record_type == DnsRecordType::SOA => {
                log.replace_rrset(&rr.name, DnsRecordType::SOA, std::slice::from_ref(rr))
            }
            UpdateInstruction::Add(rr) => log.add_rr(rr),
            UpdateInstruction::DeleteName(name) if name == apex => {
                log.remove_name_apex(name);
                Ok(())
            }
            UpdateInstruction::DeleteName(name) => {
                log.remove_name(name);
                Ok(())
            }
            UpdateInstruction::DeleteRRSet(name, record_type)
                if name == apex && record_type.is_apex_protected() =>
            {
                debug!("Ignoring deletion of apex {} set", record_type);
                Ok(())
            }
            UpdateInstruction::DeleteRRSet(name, record_type) => {
                log.remove_rrset(name, *record_type);
                Ok(())
            }
            UpdateInstruction::DeleteRR(rr) if rr.record_type == DnsRecordType::SOA => {
                debug!("Ignoring SOA record deletion");
                Ok(())
            }
            UpdateInstruction::DeleteRR(rr)
                if rr.record_type == DnsRecordType::NS && rr.name == apex =>
            {
                // The last apex NS record is never removed
                let remaining = log
                    .get(&rr.name, DnsRecordType::NS)
                    .map(|op| op.target().count())
                    .or_else(|| snapshot.rrset(&rr.name, DnsRecordType::NS).map(RecordSet::count))
                    .unwrap_or(0);
                if remaining > 1 {
                    log.remove_rr(rr);
                } else {
                    debug!("Ignoring deletion of last apex NS record");
                }
                Ok(())
            }
            UpdateInstruction::DeleteRR(rr) => {
                log.remove_rr(rr);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Rejected update: {}", e);
            errors.push(e);
        }
    }

    if !errors.is_empty() {
        return Err(DnsError::Rejected(errors));
    }
    Ok(log.into_operations())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::test_support::{remote, ApiCall, FakeZoneApi};
    use crate::dns::ZoneInfo;
    use hickory_proto::op::{MessageType, Query};
    use hickory_proto::rr::rdata::{A, CNAME, NS};
    use hickory_proto::rr::{Name, RData};

    fn config() -> UpdateConfig {
        UpdateConfig {
            page_size: 100,
            ..UpdateConfig::default()
        }
    }

    fn setup() -> Arc<FakeZoneApi> {
        let api = FakeZoneApi::new();
        api.add_zone(ZoneInfo {
            id: "z1".to_string(),
            name: "example.test".to_string(),
        });
        for record in [
            remote("soa", "example.test.", "SOA", &["ns1.example.test. hostmaster.example.test. 1 3600 600 604800 300"]),
            remote("ns", "example.test.", "NS", &["ns1.example.test."]),
            remote("apex-a", "example.test.", "A", &["192.168.0.1"]),
            remote("www-a", "www.example.test.", "A", &["192.168.0.10"]),
            remote("alias", "alias.example.test.", "CNAME", &["www.example.test."]),
        ] {
            api.add_record("z1", record);
        }
        api
    }

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    fn update_message(zone: &str) -> Message {
        let mut message = Message::new();
        message
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update);
        message.add_query(Query::query(name(zone), RecordType::SOA));
        message
    }

    fn a_record(owner: &str, ip: &str, ttl: u32) -> Record {
        Record::from_rdata(name(owner), ttl, RData::A(A(ip.parse().unwrap())))
    }

    fn empty_record(owner: &str, rtype: RecordType, class: DNSClass) -> Record {
        let mut record = Record::from_rdata(name(owner), 0, RData::Update0(rtype));
        record.set_dns_class(class);
        record
    }

    #[tokio::test]
    async fn test_add_to_existing_set() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(a_record("example.test.", "192.168.0.2", 300));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NoError);

        let updates = api.count_calls(|c| matches!(c, ApiCall::Update { record_id, .. } if record_id == "apex-a"));
        assert_eq!(updates, 1);
        let apex = api.committed_record("z1", "example.test.", "A").unwrap();
        let values: Vec<&str> = apex.rdata.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["192.168.0.1", "192.168.0.2"]);
    }

    #[tokio::test]
    async fn test_cname_conflict_submits_nothing() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(Record::from_rdata(
            name("alias.example.test."),
            300,
            RData::CNAME(CNAME(name("other.example.test."))),
        ));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::ServFail);
        assert_eq!(api.submit_calls(), 0);
        assert_eq!(api.apply_calls(), 0);
        assert_eq!(api.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_zone_is_refused() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("unknown.test.");
        message.add_name_server(a_record("www.unknown.test.", "10.0.0.1", 300));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::Refused);
        assert_eq!(api.list_record_calls(), 0);
    }

    #[tokio::test]
    async fn test_zone_lookup_failure_is_refused() {
        let api = setup();
        api.fail_list_zones();
        let handler = UpdateHandler::new(api, &config());

        let message = update_message("example.test.");
        assert_eq!(handler.handle_update(&message).await, ResponseCode::Refused);
    }

    #[tokio::test]
    async fn test_sync_failure_is_servfail() {
        let api = setup();
        api.fail_list_records_at(0);
        let handler = UpdateHandler::new(api, &config());

        let message = update_message("example.test.");
        assert_eq!(handler.handle_update(&message).await, ResponseCode::ServFail);
    }

    #[tokio::test]
    async fn test_non_update_opcode() {
        let handler = UpdateHandler::new(setup(), &config());

        let mut message = update_message("example.test.");
        message.set_op_code(OpCode::Query);

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NotImp);
    }

    #[tokio::test]
    async fn test_zone_section_checks() {
        let handler = UpdateHandler::new(setup(), &config());

        let mut two_zones = update_message("example.test.");
        two_zones.add_query(Query::query(name("other.test."), RecordType::SOA));
        assert_eq!(handler.handle_update(&two_zones).await, ResponseCode::Refused);

        let mut wrong_type = Message::new();
        wrong_type.set_op_code(OpCode::Update);
        wrong_type.add_query(Query::query(name("example.test."), RecordType::A));
        assert_eq!(handler.handle_update(&wrong_type).await, ResponseCode::FormErr);
    }

    #[tokio::test]
    async fn test_prerequisite_codes() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let cases = [
            (empty_record("missing.example.test.", RecordType::ANY, DNSClass::ANY), ResponseCode::NXDomain),
            (empty_record("www.example.test.", RecordType::TXT, DNSClass::ANY), ResponseCode::NXRRSet),
            (empty_record("www.example.test.", RecordType::ANY, DNSClass::NONE), ResponseCode::YXDomain),
            (empty_record("www.example.test.", RecordType::A, DNSClass::NONE), ResponseCode::YXRRSet),
            (a_record("www.example.test.", "10.9.9.9", 0), ResponseCode::NXRRSet),
            (a_record("www.example.test.", "192.168.0.10", 300), ResponseCode::FormErr),
            (empty_record("www.example.org.", RecordType::ANY, DNSClass::ANY), ResponseCode::NotZone),
        ];

        for (prerequisite, expected) in cases {
            let mut message = update_message("example.test.");
            message.add_answer(prerequisite);
            message.add_name_server(a_record("new.example.test.", "10.0.0.1", 300));
            assert_eq!(handler.handle_update(&message).await, expected);
        }

        assert_eq!(api.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_satisfied_prerequisites() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_answer(empty_record("www.example.test.", RecordType::ANY, DNSClass::ANY));
        message.add_answer(empty_record("www.example.test.", RecordType::A, DNSClass::ANY));
        message.add_answer(empty_record("new.example.test.", RecordType::ANY, DNSClass::NONE));
        message.add_answer(a_record("www.example.test.", "192.168.0.10", 0));
        message.add_name_server(a_record("new.example.test.", "10.0.0.1", 300));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NoError);
        assert!(api.committed_record("z1", "new.example.test.", "A").is_some());
    }

    #[tokio::test]
    async fn test_prescan_rejects_before_changes() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(a_record("ok.example.test.", "10.0.0.1", 300));
        let mut bad = a_record("www.example.test.", "10.0.0.2", 300);
        bad.set_dns_class(DNSClass::CH);
        message.add_name_server(bad);

        assert_eq!(handler.handle_update(&message).await, ResponseCode::FormErr);
        assert_eq!(api.submit_calls(), 0);

        let mut outside = update_message("example.test.");
        outside.add_name_server(a_record("www.example.org.", "10.0.0.1", 300));
        assert_eq!(handler.handle_update(&outside).await, ResponseCode::NotZone);
    }

    #[tokio::test]
    async fn test_delete_name_and_rrset() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(empty_record("www.example.test.", RecordType::ANY, DNSClass::ANY));
        message.add_name_server(empty_record("alias.example.test.", RecordType::CNAME, DNSClass::ANY));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NoError);
        assert!(api.committed_record("z1", "www.example.test.", "A").is_none());
        assert!(api.committed_record("z1", "alias.example.test.", "CNAME").is_none());
    }

    #[tokio::test]
    async fn test_apex_deletes_keep_soa_and_ns() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(empty_record("example.test.", RecordType::ANY, DNSClass::ANY));
        message.add_name_server(empty_record("example.test.", RecordType::NS, DNSClass::ANY));
        let mut last_ns = Record::from_rdata(
            name("example.test."),
            0,
            RData::NS(NS(name("ns1.example.test."))),
        );
        last_ns.set_dns_class(DNSClass::NONE);
        message.add_name_server(last_ns);

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NoError);
        assert!(api.committed_record("z1", "example.test.", "A").is_none());
        assert!(api.committed_record("z1", "example.test.", "SOA").is_some());
        assert!(api.committed_record("z1", "example.test.", "NS").is_some());
    }

    #[tokio::test]
    async fn test_delete_single_value() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(a_record("www.example.test.", "192.168.0.11", 300));
        let mut delete = a_record("www.example.test.", "192.168.0.10", 0);
        delete.set_dns_class(DNSClass::NONE);
        message.add_name_server(delete);

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NoError);
        let www = api.committed_record("z1", "www.example.test.", "A").unwrap();
        assert_eq!(www.rdata.len(), 1);
        assert_eq!(www.rdata[0].value, "192.168.0.11");
    }

    #[tokio::test]
    async fn test_failed_job_is_servfail_and_cancelled() {
        let api = setup();
        api.fail_jobs_for("b.example.test.");
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(a_record("a.example.test.", "10.0.0.1", 300));
        message.add_name_server(a_record("b.example.test.", "10.0.0.2", 300));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::ServFail);
        assert_eq!(api.submit_calls(), 2);
        assert_eq!(api.cancel_calls(), 1);
        assert!(api.committed_record("z1", "a.example.test.", "A").is_none());
    }

    #[tokio::test]
    async fn test_noop_update_makes_no_record_calls() {
        let api = setup();
        let handler = UpdateHandler::new(api.clone(), &config());

        let mut message = update_message("example.test.");
        message.add_name_server(a_record("www.example.test.", "192.168.0.10", 300));

        assert_eq!(handler.handle_update(&message).await, ResponseCode::NoError);
        assert_eq!(api.submit_calls(), 0);
        assert_eq!(api.apply_calls(), 0);
    }

    #[test]
    fn test_failure_codes() {
        assert_eq!(
            failure_code(&DnsError::ZoneNotFound("x.".to_string())),
            ResponseCode::Refused
        );
        assert_eq!(
            failure_code(&DnsError::Rejected(Vec::new())),
            ResponseCode::ServFail
        );
    }
}
