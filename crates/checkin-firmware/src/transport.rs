//! Plain-HTTP transport over an embassy-net TCP socket

use core::net::Ipv4Addr;

use checkin_core::Transport;
use checkin_core::error::TransportError;
use checkin_core::http::Endpoint;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{ConnectError, TcpSocket};
use embassy_net::{IpAddress, Stack};
use log::{debug, trace};

const RX_BUFFER_LEN: usize = 1536;
const TX_BUFFER_LEN: usize = 1024;

pub struct TcpTransport {
    stack: Stack<'static>,
    rx_buffer: [u8; RX_BUFFER_LEN],
    tx_buffer: [u8; TX_BUFFER_LEN],
}

impl TcpTransport {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            rx_buffer: [0; RX_BUFFER_LEN],
            tx_buffer: [0; TX_BUFFER_LEN],
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, TransportError> {
        if let Ok(address) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(address));
        }

        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                debug!("DNS lookup of {} failed: {:?}", host, e);
                TransportError::Dns
            })?;
        addresses.first().copied().ok_or(TransportError::Dns)
    }
}

impl Transport for TcpTransport {
    async fn exchange(
        &mut self,
        endpoint: &Endpoint<'_>,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, TransportError> {
        let address = self.resolve(endpoint.host).await?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer, &mut self.tx_buffer);
        socket
            .connect((address, endpoint.port))
            .await
            .map_err(|e| match e {
                ConnectError::TimedOut => TransportError::TimedOut,
                ConnectError::ConnectionReset => TransportError::Reset,
                _ => TransportError::Refused,
            })?;
        trace!("Connected to {}:{}", endpoint.host, endpoint.port);

        let mut written = 0;
        while written < request.len() {
            match socket.write(&request[written..]).await {
                Ok(0) | Err(_) => return Err(TransportError::Reset),
                Ok(n) => written += n,
            }
        }
        socket.flush().await.map_err(|_| TransportError::Reset)?;

        // `Connection: close` makes the server end the body with FIN.
        let mut received = 0;
        while received < response.len() {
            match socket.read(&mut response[received..]).await {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(_) if received > 0 => break,
                Err(_) => return Err(TransportError::Reset),
            }
        }

        socket.close();
        trace!("Received {} response bytes", received);
        Ok(received)
    }
}
