use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::{Name, Record, RecordType};
use hickory_proto::serialize::binary::BinDecodable;
use tokio::net::UdpSocket;
use tracing::{field::Empty, instrument};

use crate::error::TracerError;

/// Max size for the UDP receive buffer, as recommended by
/// [RFC6891](https://datatracker.ietf.org/doc/html/rfc6891#section-6.2.5).
pub const MAX_RECEIVE_BUFFER_SIZE: usize = 4096;

const DEFAULT_TARGET_PORT: u16 = 53;

/// One-shot, non-recursing outcome of a single query to a single
/// nameserver IP. Transport/DNS-level failures are values here, not
/// [`TracerError`]s -- the tracer turns them into Name registrations.
#[derive(Debug, Clone)]
pub enum ClientOutcome {
    Answered { answer: Vec<Record>, authority: Vec<Record>, additional: Vec<Record> },
    Nxdomain,
    Servfail,
    Timeout,
}

/// Sends one DNS query to one server IP and classifies the result. Does
/// not follow CNAMEs and does not recurse; pure transport.
#[async_trait]
pub trait Client: Debug {
    async fn query(
        &self,
        target: IpAddr,
        name: &Name,
        record_type: RecordType,
        timeout: Duration,
    ) -> Result<ClientOutcome, TracerError>;
}

#[derive(Debug, Default)]
pub struct UdpClient {
    target_port: u16,
}

impl UdpClient {
    pub fn new() -> Self {
        UdpClient { target_port: DEFAULT_TARGET_PORT }
    }

    #[cfg(test)]
    pub(crate) fn with_port(target_port: u16) -> Self {
        UdpClient { target_port }
    }
}

async fn connect(target: IpAddr, target_port: u16) -> Result<UdpSocket, TracerError> {
    let local = SocketAddr::new(
        match target {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        },
        0,
    );
    let socket = UdpSocket::bind(local).await?;
    socket.connect(SocketAddr::new(target, target_port)).await?;
    Ok(socket)
}

fn make_query(name: &Name, record_type: RecordType) -> Message {
    let mut query = Query::new();
    query.set_name(name.clone()).set_query_type(record_type);
    let mut message = Message::new();
    message.add_query(query);
    message.set_recursion_desired(true);
    message.set_id(rand::random());
    message.set_authentic_data(true);
    message
}

#[async_trait]
impl Client for UdpClient {
    #[instrument(fields(otel.status_code = "Error", response_code = Empty, %name, %record_type))]
    async fn query(
        &self,
        target: IpAddr,
        name: &Name,
        record_type: RecordType,
        timeout: Duration,
    ) -> Result<ClientOutcome, TracerError> {
        let outcome = tokio::time::timeout(timeout, self.query_inner(target, name, record_type)).await;
        match outcome {
            Err(_elapsed) => Ok(ClientOutcome::Timeout),
            Ok(Err(e)) => Err(e),
            Ok(Ok(message)) => {
                let span = tracing::Span::current();
                span.record("otel.status_code", "Ok");
                span.record("response_code", format!("{}", message.header().response_code()));
                Ok(classify(message))
            }
        }
    }
}

impl UdpClient {
    async fn query_inner(
        &self,
        target: IpAddr,
        name: &Name,
        record_type: RecordType,
    ) -> Result<Message, TracerError> {
        let socket = connect(target, self.target_port).await?;
        let request = make_query(name, record_type);
        socket.send(request.to_vec()?.as_slice()).await?;
        let mut buf = vec![0u8; MAX_RECEIVE_BUFFER_SIZE];
        let read_count = socket.recv(&mut buf).await?;
        Ok(Message::from_bytes(&buf[..read_count])?)
    }
}

fn classify(message: Message) -> ClientOutcome {
    match message.response_code() {
        ResponseCode::NXDomain => ClientOutcome::Nxdomain,
        ResponseCode::ServFail => ClientOutcome::Servfail,
        _ => ClientOutcome::Answered {
            answer: message.answers().to_vec(),
            authority: message.name_servers().to_vec(),
            additional: message.additionals().to_vec(),
        },
    }
}
