//! DDNS Server
//!
//! UDP and TCP listener for dynamic update messages. Messages are decoded
//! with Hickory DNS protocol parsing and handed to the `UpdateHandler`; the
//! reply echoes the request id, opcode and zone section.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{DdnsConfig, DnsError, UpdateHandler};

/// Maximum EDNS UDP message size
const MAX_EDNS_SIZE: usize = 4096;

/// DDNS Server
pub struct DnsServer {
    /// Server configuration
    config: DdnsConfig,
    /// Update processing
    handler: Arc<UpdateHandler>,
    /// Semaphore for limiting concurrent TCP connections
    tcp_semaphore: Arc<Semaphore>,
}

impl DnsServer {
    /// Create a new DDNS server
    pub fn new(config: DdnsConfig, handler: Arc<UpdateHandler>) -> Result<Self, DnsError> {
        config.validate()?;

        let tcp_semaphore = Arc::new(Semaphore::new(config.tcp_limits.max_connections));

        Ok(Self {
            config,
            handler,
            tcp_semaphore,
        })
    }

    /// Start the server (runs until shutdown)
    pub async fn run(&self) -> Result<(), DnsError> {
        info!(
            "Starting DDNS server on UDP {} and TCP {}",
            self.config.udp_addr, self.config.tcp_addr
        );

        let udp_socket = UdpSocket::bind(&self.config.udp_addr)
            .await
            .map_err(|e| DnsError::ServerError(format!("Failed to bind UDP: {}", e)))?;

        let tcp_listener = TcpListener::bind(&self.config.tcp_addr)
            .await
            .map_err(|e| DnsError::ServerError(format!("Failed to bind TCP: {}", e)))?;

        tokio::select! {
            result = self.run_udp_server(udp_socket) => {
                error!("UDP server stopped: {:?}", result);
                result
            }
            result = self.run_tcp_server(tcp_listener) => {
                error!("TCP server stopped: {:?}", result);
                result
            }
        }
    }

    /// Decode a message, process it and encode the reply
    pub async fn process_packet(&self, packet: &[u8]) -> Result<Vec<u8>, DnsError> {
        Self::handle_packet(&self.handler, self.config.update.timeout(), packet).await
    }

    async fn run_udp_server(&self, socket: UdpSocket) -> Result<(), DnsError> {
        let socket = Arc::new(socket);
        let mut buf = vec![0u8; MAX_EDNS_SIZE];

        loop {
            let (len, addr) = socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| DnsError::ServerError(format!("UDP recv error: {}", e)))?;

            let packet = buf[..len].to_vec();
            let socket = Arc::clone(&socket);
            let handler = Arc::clone(&self.handler);
            let update_timeout = self.config.update.timeout();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_udp_message(socket, addr, packet, handler, update_timeout).await
                {
                    debug!("UDP message error from {}: {}", addr, e);
                }
            });
        }
    }

    async fn handle_udp_message(
        socket: Arc<UdpSocket>,
        addr: SocketAddr,
        packet: Vec<u8>,
        handler: Arc<UpdateHandler>,
        update_timeout: Duration,
    ) -> Result<(), DnsError> {
        let response = Self::handle_packet(&handler, update_timeout, &packet).await?;

        socket
            .send_to(&response, addr)
            .await
            .map_err(|e| DnsError::ServerError(format!("Failed to send response: {}", e)))?;

        Ok(())
    }

    async fn run_tcp_server(&self, listener: TcpListener) -> Result<(), DnsError> {
        loop {
            let (stream, addr) = listener
                .accept()
                .await
                .map_err(|e| DnsError::ServerError(format!("TCP accept error: {}", e)))?;

            let permit = match Arc::clone(&self.tcp_semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("TCP semaphore full, rejecting connection from {}", addr);
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);
            let update_timeout = self.config.update.timeout();
            let idle_timeout = self.config.tcp_limits.idle_timeout();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_tcp_connection(stream, addr, handler, update_timeout, idle_timeout)
                        .await
                {
                    debug!("TCP connection error from {}: {}", addr, e);
                }
                drop(permit);
            });
        }
    }

    /// Handle a TCP connection (may carry several messages)
    async fn handle_tcp_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<UpdateHandler>,
        update_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<(), DnsError> {
        loop {
            // 2-byte length prefix
            let mut len_buf = [0u8; 2];
            match timeout(idle_timeout, stream.read_exact(&mut len_buf)).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => break,
            }

            let msg_len = u16::from_be_bytes(len_buf) as usize;
            let mut msg_buf = vec![0u8; msg_len];
            match timeout(idle_timeout, stream.read_exact(&mut msg_buf)).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => break,
            }

            let response = match Self::handle_packet(&handler, update_timeout, &msg_buf).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Dropping TCP message from {}: {}", addr, e);
                    continue;
                }
            };

            let len_prefix = (response.len() as u16).to_be_bytes();
            if stream.write_all(&len_prefix).await.is_err() {
                break;
            }
            if stream.write_all(&response).await.is_err() {
                break;
            }
        }

        Ok(())
    }

    async fn handle_packet(
        handler: &UpdateHandler,
        update_timeout: Duration,
        packet: &[u8],
    ) -> Result<Vec<u8>, DnsError> {
        let request = Message::from_vec(packet)
            .map_err(|e| DnsError::ServerError(format!("Failed to parse message: {}", e)))?;

        let response = Self::build_response(&request, handler, update_timeout).await;

        response
            .to_vec()
            .map_err(|e| DnsError::ServerError(format!("Failed to serialize response: {}", e)))
    }

    /// Build the reply to an update request
    async fn build_response(
        request: &Message,
        handler: &UpdateHandler,
        update_timeout: Duration,
    ) -> Message {
        let code = match timeout(update_timeout, handler.handle_update(request)).await {
            Ok(code) => code,
            Err(_) => {
                warn!(
                    "Update {} timed out after {:?}, submitted changes are left to the next sync",
                    request.id(),
                    update_timeout
                );
                ResponseCode::ServFail
            }
        };

        Self::build_error_response(request, code)
    }

    /// Build a reply carrying only a response code
    fn build_error_response(request: &Message, code: ResponseCode) -> Message {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(request.op_code());
        response.set_response_code(code);

        for question in request.queries() {
            response.add_query(question.clone());
        }

        response
    }

    /// Get server configuration
    pub fn config(&self) -> &DdnsConfig {
        &self.config
    }
}
