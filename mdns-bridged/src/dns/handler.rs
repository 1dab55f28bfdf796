//! Handler chain: each stage answers a query or passes it to the next one.

use std::sync::Arc;
use anyhow::Result;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, SRV};
use hickory_proto::rr::{Name, RData, Record};
use super::synthesizer::{RecordData, Resolution, SynthRecord, Synthesizer};

pub trait Handler: Send + Sync {
    fn handle(&self, request: &Message) -> Message;
}

/// End of the chain: refuses anything nobody before it answered.
pub struct Refused;

impl Handler for Refused {
    fn handle(&self, request: &Message) -> Message {
        reply_to(request, ResponseCode::Refused, false)
    }
}

/// Answers queries under the bridge domain from the registry, delegates the rest.
pub struct BridgeHandler {
    synthesizer: Arc<Synthesizer>,
    next: Arc<dyn Handler>,
}

impl BridgeHandler {
    pub fn new(synthesizer: Arc<Synthesizer>, next: Arc<dyn Handler>) -> Self {
        Self { synthesizer, next }
    }
}

impl Handler for BridgeHandler {
    fn handle(&self, request: &Message) -> Message {
        let Some(query) = request.queries().first() else {
            return self.next.handle(request);
        };

        let qname = query.name().to_ascii();
        let resolution = self.synthesizer.resolve(&qname, query.query_type());
        tracing::debug!("{} {} -> {:?}", qname, query.query_type(), resolution);

        match resolution {
            Resolution::Delegate => self.next.handle(request),
            Resolution::NxDomain => reply_to(request, ResponseCode::NXDomain, true),
            Resolution::NoData => reply_to(request, ResponseCode::NoError, true),
            Resolution::Answer { answers, additionals } => {
                let mut reply = reply_to(request, ResponseCode::NoError, true);
                reply.add_answers(convert_all(&answers));
                reply.add_additionals(convert_all(&additionals));
                reply
            }
        }
    }
}

/// Empty response echoing the request's id, opcode, RD flag and question
fn reply_to(request: &Message, code: ResponseCode, authoritative: bool) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(false)
        .set_authoritative(authoritative)
        .set_response_code(code);
    reply.add_queries(request.queries().iter().cloned());
    reply
}

fn convert_all(records: &[SynthRecord]) -> Vec<Record> {
    records
        .iter()
        .filter_map(|record| match to_record(record) {
            Ok(rr) => Some(rr),
            Err(e) => {
                tracing::warn!("Dropping record for {}: {}", record.name, e);
                None
            }
        })
        .collect()
}

fn to_record(record: &SynthRecord) -> Result<Record> {
    let name = Name::from_ascii(&record.name)?;
    let rdata = match &record.data {
        RecordData::A(ip) => RData::A(A(*ip)),
        RecordData::Aaaa(ip) => RData::AAAA(AAAA(*ip)),
        RecordData::Srv { priority, weight, port, target } => {
            RData::SRV(SRV::new(*priority, *weight, *port, Name::from_ascii(target)?))
        }
        RecordData::Cname(target) => RData::CNAME(CNAME(Name::from_ascii(target)?)),
    };
    Ok(Record::from_rdata(name, record.ttl, rdata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use hickory_proto::op::{OpCode, Query};
    use hickory_proto::rr::RecordType;
    use crate::registry::pass::tests::entry;
    use crate::registry::{PassOutput, Registry};

    fn request(name: &str, qtype: RecordType) -> Message {
        let mut msg = Message::new();
        msg.set_id(4242)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        msg.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
        msg
    }

    fn chain() -> BridgeHandler {
        let registry = Registry::new(1);
        let mut pass = PassOutput::new();
        pass.ingest(entry("master-0", "alice.local.", 9), "");
        registry.write_snapshot(pass);
        let synth = Arc::new(Synthesizer::new("local", 60, registry));
        BridgeHandler::new(synth, Arc::new(Refused))
    }

    #[test]
    fn test_answer_is_authoritative() {
        let reply = chain().handle(&request("alice.local.", RecordType::A));
        assert_eq!(reply.id(), 4242);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(reply.response_code(), ResponseCode::NoError);
        assert!(reply.authoritative());
        assert!(reply.recursion_desired());
        assert_eq!(reply.queries().len(), 1);
        assert_eq!(reply.answers().len(), 1);
        assert_eq!(reply.answers()[0].record_type(), RecordType::A);
    }

    #[test]
    fn test_srv_carries_glue() {
        let reply = chain().handle(&request("_workstation._tcp.local.", RecordType::SRV));
        assert_eq!(reply.answers().len(), 1);
        assert_eq!(reply.answers()[0].record_type(), RecordType::SRV);
        assert_eq!(reply.additionals().len(), 1);
    }

    #[test]
    fn test_alias_answer_has_cname_first() {
        let reply = chain().handle(&request("master-0.local.", RecordType::A));
        let types: Vec<_> = reply.answers().iter().map(|r| r.record_type()).collect();
        assert_eq!(types, vec![RecordType::CNAME, RecordType::A]);
    }

    #[test]
    fn test_unknown_name_is_authoritative_nxdomain() {
        let reply = chain().handle(&request("bob.local.", RecordType::A));
        assert_eq!(reply.response_code(), ResponseCode::NXDomain);
        assert!(reply.authoritative());
        assert!(reply.answers().is_empty());
    }

    #[test]
    fn test_foreign_name_reaches_next_handler() {
        let reply = chain().handle(&request("example.com.", RecordType::A));
        assert_eq!(reply.response_code(), ResponseCode::Refused);
        assert!(!reply.authoritative());
    }

    #[test]
    fn test_empty_question_is_delegated() {
        let mut msg = request("alice.local.", RecordType::A);
        msg.take_queries();
        let reply = chain().handle(&msg);
        assert_eq!(reply.response_code(), ResponseCode::Refused);
    }

    #[test]
    fn test_reply_survives_wire_round_trip() {
        let reply = chain().handle(&request("master-0.local.", RecordType::A));
        let bytes = reply.to_vec().unwrap();
        let decoded = Message::from_vec(&bytes).unwrap();
        assert_eq!(decoded.answers().len(), 2);
        assert!(decoded.authoritative());
    }
}
