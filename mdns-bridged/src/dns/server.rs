use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::{Context, Result};
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use super::handler::Handler;

/// Largest datagram read; EDNS payloads above this are truncated by the client.
const MAX_DATAGRAM: usize = 4096;

/// Reply size limit for clients that sent no EDNS record.
const PLAIN_UDP_LIMIT: usize = 512;

pub async fn bind(listen: &str) -> Result<UdpSocket> {
    UdpSocket::bind(listen)
        .await
        .with_context(|| format!("Failed to bind DNS listener to {}", listen))
}

/// Serve DNS over UDP until `cancel` fires. Every datagram is handled on its
/// own task so a slow send never holds up the receive loop.
pub async fn serve_udp(
    socket: UdpSocket,
    handler: Arc<dyn Handler>,
    cancel: CancellationToken,
) -> Result<()> {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; MAX_DATAGRAM];
    tracing::info!("DNS listening on {}", socket.local_addr()?);

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!("DNS receive failed: {}", e);
                        continue;
                    }
                };
                let request = match Message::from_vec(&buf[..len]) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::debug!("Dropping undecodable datagram from {}: {}", peer, e);
                        continue;
                    }
                };
                let socket = Arc::clone(&socket);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = respond(&socket, handler.as_ref(), &request, peer).await {
                        tracing::warn!("Failed to answer {}: {:#}", peer, e);
                    }
                });
            }
            _ = cancel.cancelled() => {
                tracing::info!("DNS listener shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn respond(
    socket: &UdpSocket,
    handler: &dyn Handler,
    request: &Message,
    peer: SocketAddr,
) -> Result<()> {
    let reply = handler.handle(request);
    let bytes = encode_reply(request, reply)?;
    socket
        .send_to(&bytes, peer)
        .await
        .context("Failed to send reply")?;
    Ok(())
}

/// Encode `reply` to fit the payload size the client can take. A reply that
/// does not fit goes out as header and question only, with TC set, so the
/// client knows to retry over TCP.
fn encode_reply(request: &Message, mut reply: Message) -> Result<Vec<u8>> {
    let limit = request
        .extensions()
        .as_ref()
        .map_or(PLAIN_UDP_LIMIT, |edns| usize::from(edns.max_payload()).max(PLAIN_UDP_LIMIT));

    let bytes = reply.to_vec().context("Failed to encode reply")?;
    if bytes.len() <= limit {
        return Ok(bytes);
    }

    tracing::debug!("Reply of {} bytes exceeds {}, truncating", bytes.len(), limit);
    reply.take_answers();
    reply.take_name_servers();
    reply.take_additionals();
    reply.set_truncated(true);
    reply.to_vec().context("Failed to encode truncated reply")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;
    use std::net::Ipv4Addr;
    use hickory_proto::op::{Edns, MessageType, OpCode, Query, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use crate::dns::handler::{BridgeHandler, Refused};
    use crate::dns::synthesizer::Synthesizer;
    use crate::registry::pass::tests::entry;
    use crate::registry::{PassOutput, Registry};

    #[tokio::test]
    async fn test_udp_round_trip_and_shutdown() {
        let registry = Registry::new(1);
        let mut pass = PassOutput::new();
        pass.ingest(entry("alice", "alice.local.", 9), "");
        registry.write_snapshot(pass);
        let handler: Arc<dyn Handler> = Arc::new(BridgeHandler::new(
            Arc::new(Synthesizer::new("local", 60, registry)),
            Arc::new(Refused),
        ));

        let socket = bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_udp(socket, handler, cancel.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut query = Message::new();
        query
            .set_id(7)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query);
        query.add_query(Query::query(Name::from_str("alice.local.").unwrap(), RecordType::A));

        // Garbage first: it must be dropped without killing the loop.
        client.send_to(&[0xff, 0x00], addr).await.unwrap();
        client.send_to(&query.to_vec().unwrap(), addr).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.response_code(), ResponseCode::NoError);
        assert_eq!(reply.answers().len(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    fn plain_query() -> Message {
        let mut query = Message::new();
        query
            .set_id(9)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query);
        query.add_query(Query::query(
            Name::from_str("alice.local.").unwrap(),
            RecordType::A,
        ));
        query
    }

    /// A reply with `count` A records under distinct long owner names.
    fn large_reply(request: &Message, count: u8) -> Message {
        let mut reply = Message::new();
        reply
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query);
        reply.add_queries(request.queries().iter().cloned());
        for n in 0..count {
            let name = Name::from_str(&format!("workstation-number-{n:03}.local.")).unwrap();
            reply.add_answer(Record::from_rdata(name, 60, RData::A(A(Ipv4Addr::new(10, 0, 0, n)))));
        }
        reply
    }

    #[test]
    fn test_oversized_reply_is_truncated_without_edns() {
        let request = plain_query();
        let reply = large_reply(&request, 40);
        assert!(reply.to_vec().unwrap().len() > PLAIN_UDP_LIMIT);

        let bytes = encode_reply(&request, reply).unwrap();
        assert!(bytes.len() <= PLAIN_UDP_LIMIT);
        let decoded = Message::from_vec(&bytes).unwrap();
        assert!(decoded.truncated());
        assert_eq!(decoded.id(), 9);
        assert_eq!(decoded.queries().len(), 1);
        assert!(decoded.answers().is_empty());
    }

    #[test]
    fn test_edns_client_gets_full_reply() {
        let mut request = plain_query();
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        request.set_edns(edns);

        let bytes = encode_reply(&request, large_reply(&request, 40)).unwrap();
        let decoded = Message::from_vec(&bytes).unwrap();
        assert!(!decoded.truncated());
        assert_eq!(decoded.answers().len(), 40);
    }

    #[test]
    fn test_small_reply_is_untouched() {
        let request = plain_query();
        let bytes = encode_reply(&request, large_reply(&request, 2)).unwrap();
        let decoded = Message::from_vec(&bytes).unwrap();
        assert!(!decoded.truncated());
        assert_eq!(decoded.answers().len(), 2);
    }
}
