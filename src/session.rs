// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A blocking Modbus TCP connection to a single device.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{
    codec::tcp::{
        MAX_FRAME_LEN, MBAP_HEADER_LEN,
        client::{decode_response, encode_request},
        decode_header,
    },
    error::{Error, ProtocolError, TransportError},
    frame::{
        Header, Request, RequestAdu, RequestPdu, ResponseAdu, ResponsePdu, TransactionId, UnitId,
    },
};

type Result<T> = core::result::Result<T, Error>;

/// The registered Modbus TCP port.
pub const DEFAULT_PORT: u16 = 502;

/// Applied to connecting and to every single read or write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can exchange a request for a response PDU.
pub trait Transport {
    /// Send `req` to the unit `unit_id` and wait for the response PDU.
    ///
    /// Modbus exception responses are returned as [`Error::Exception`].
    fn request(&mut self, unit_id: UnitId, req: Request) -> Result<Vec<u8>>;
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_owned()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_owned()));
        }
        Ok(())
    }

    fn socket_addrs(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<_> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| {
                Error::Config(format!("cannot resolve {}:{}: {err}", self.host, self.port))
            })?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Config(format!(
                "{}:{} did not resolve to any address",
                self.host, self.port
            )));
        }
        Ok(addrs)
    }
}

/// Lifecycle of a [`TcpSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
}

/// A Modbus TCP connection with at most one outstanding request.
///
/// Any transport or protocol failure closes the connection and leaves the
/// session [`SessionState::Disconnected`]. It is never reopened implicitly.
#[derive(Debug)]
pub struct TcpSession {
    config: SessionConfig,
    state: SessionState,
    stream: Option<TcpStream>,
    transaction_id: TransactionId,
}

impl TcpSession {
    /// Create a disconnected session.
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            stream: None,
            transaction_id: 0,
        }
    }

    /// Create a session and open the connection.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.open()?;
        Ok(session)
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Open the connection.
    ///
    /// Every resolved address is tried in turn, the error of the
    /// last attempt is returned if none of them accepts.
    pub fn open(&mut self) -> Result<()> {
        self.close();
        self.config.validate()?;
        self.state = SessionState::Connecting;
        let result = self.config.socket_addrs().and_then(|addrs| {
            let mut last_err = None;
            for addr in addrs {
                log::debug!("Connecting to {addr}");
                match TcpStream::connect_timeout(&addr, self.config.timeout) {
                    Ok(stream) => return Ok(stream),
                    Err(err) => {
                        log::debug!("Failed to connect to {addr}: {err}");
                        last_err = Some(TransportError::Connect {
                            addr: addr.to_string(),
                            source: err,
                        });
                    }
                }
            }
            Err(last_err.unwrap_or(TransportError::NotConnected).into())
        });
        let stream = match result.and_then(|stream| self.configure(stream)) {
            Ok(stream) => stream,
            Err(err) => {
                self.state = SessionState::Disconnected;
                return Err(err);
            }
        };
        log::debug!(
            "Connected to {}:{}",
            self.config.host,
            self.config.port
        );
        self.stream = Some(stream);
        self.state = SessionState::Ready;
        Ok(())
    }

    fn configure(&self, stream: TcpStream) -> Result<TcpStream> {
        let timeout = Some(self.config.timeout);
        stream
            .set_read_timeout(timeout)
            .and_then(|()| stream.set_write_timeout(timeout))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|source| TransportError::Connect {
                addr: format!("{}:{}", self.config.host, self.config.port),
                source,
            })?;
        Ok(stream)
    }

    /// Close the connection.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!(
                "Disconnected from {}:{}",
                self.config.host,
                self.config.port
            );
        }
        self.state = SessionState::Disconnected;
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Send `req` and receive the complete response frame.
    fn exchange(&mut self, hdr: Header, req: Request) -> Result<Vec<u8>> {
        if self.state != SessionState::Ready {
            return Err(TransportError::NotConnected.into());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected.into());
        };

        let mut buf = [0; MAX_FRAME_LEN];
        let adu = RequestAdu {
            hdr,
            pdu: RequestPdu(req),
        };
        let len = encode_request(adu, &mut buf)?;
        log::trace!("Sending frame: {:02X?}", &buf[..len]);
        stream
            .write_all(&buf[..len])
            .and_then(|()| stream.flush())
            .map_err(TransportError::Write)?;

        let mut frame = vec![0; MBAP_HEADER_LEN];
        stream.read_exact(&mut frame).map_err(TransportError::Read)?;
        let (_, pdu_len) = decode_header(&frame)?;
        frame.resize(MBAP_HEADER_LEN + pdu_len, 0);
        stream
            .read_exact(&mut frame[MBAP_HEADER_LEN..])
            .map_err(TransportError::Read)?;
        log::trace!("Received frame: {frame:02X?}");
        Ok(frame)
    }
}

/// Check that a response frame answers the request sent with `hdr`.
///
/// Returns the response PDU.
fn accept_response(hdr: Header, frame: &[u8]) -> Result<Vec<u8>> {
    let ResponseAdu {
        hdr: rsp_hdr,
        pdu: ResponsePdu(rsp),
    } = decode_response(frame)?;
    if rsp_hdr.transaction_id != hdr.transaction_id {
        return Err(ProtocolError::TransactionId {
            expected: hdr.transaction_id,
            actual: rsp_hdr.transaction_id,
        }
        .into());
    }
    if rsp_hdr.unit_id != hdr.unit_id {
        return Err(ProtocolError::UnitId {
            expected: hdr.unit_id,
            actual: rsp_hdr.unit_id,
        }
        .into());
    }
    rsp?;
    Ok(frame[MBAP_HEADER_LEN..].to_vec())
}

impl Transport for TcpSession {
    fn request(&mut self, unit_id: UnitId, req: Request) -> Result<Vec<u8>> {
        let hdr = Header {
            transaction_id: self.next_transaction_id(),
            unit_id,
        };
        let result = self
            .exchange(hdr, req)
            .and_then(|frame| accept_response(hdr, &frame));
        if let Err(err @ (Error::Transport(_) | Error::Protocol(_))) = &result {
            log::debug!("Closing connection after failed request: {err}");
            self.close();
        }
        result
    }
}
