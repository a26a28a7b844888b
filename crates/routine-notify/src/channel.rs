//! Lazily reconnecting byte-stream channel for group reports.
//!
//! The channel holds at most one open link. Before every send it checks the
//! link with a zero-length write and reopens it when the check fails. A
//! zero-length write rarely fails on a buffered socket, so a dead peer is
//! usually only noticed by the next real write; that write drops its report
//! and the following send reconnects.

use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::NotifyError;
use crate::sink::ReportSink;
use crate::types::{Delivery, GroupReport, NotificationSinkKind};

pub type Link = Box<dyn Write + Send>;

/// Opens the underlying transport to a fixed endpoint.
pub trait Connector: Send {
    fn endpoint(&self) -> &str;
    fn connect(&self) -> Result<Link, NotifyError>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, NotifyError> {
        let mut addrs = self
            .endpoint
            .to_socket_addrs()
            .map_err(|err| NotifyError::Endpoint {
                endpoint: self.endpoint.clone(),
                message: err.to_string(),
            })?;
        addrs.next().ok_or_else(|| NotifyError::Endpoint {
            endpoint: self.endpoint.clone(),
            message: "endpoint resolved to no addresses".to_string(),
        })
    }
}

impl Connector for TcpConnector {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connect(&self) -> Result<Link, NotifyError> {
        let addr = self.resolve()?;
        let stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(|source| {
                NotifyError::Connect {
                    endpoint: self.endpoint.clone(),
                    source,
                }
            })?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(endpoint = %self.endpoint, error = %err, "failed to set TCP_NODELAY");
        }
        Ok(Box::new(stream))
    }
}

pub struct NotificationChannel<C: Connector> {
    connector: C,
    link: Option<Link>,
}

impl<C: Connector> NotificationChannel<C> {
    /// Creates a disconnected channel. Nothing is opened until the first send.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            link: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    /// Returns true when a link is open after probing or reconnecting.
    pub fn ensure_connection(&mut self) -> bool {
        if let Some(link) = self.link.as_mut() {
            if link.write(&[]).is_ok() {
                return true;
            }
            tracing::warn!(endpoint = self.connector.endpoint(), "notification link check failed");
            self.link = None;
        }

        match self.connector.connect() {
            Ok(link) => {
                tracing::info!(endpoint = self.connector.endpoint(), "notification link connected");
                self.link = Some(link);
                true
            }
            Err(err) => {
                tracing::error!(
                    endpoint = self.connector.endpoint(),
                    error = %err,
                    "notification link unavailable"
                );
                self.link = None;
                false
            }
        }
    }

    fn write_report(&mut self, report: &GroupReport) -> Result<(), NotifyError> {
        let line = report.encode_line()?;
        let Some(link) = self.link.as_mut() else {
            return Err(NotifyError::Write {
                source: std::io::Error::new(std::io::ErrorKind::NotConnected, "no open link"),
            });
        };
        link.write_all(line.as_bytes())
            .and_then(|()| link.flush())
            .map_err(|source| NotifyError::Write { source })
    }
}

impl<C: Connector> ReportSink for NotificationChannel<C> {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Stream
    }

    fn send(&mut self, report: &GroupReport) -> Delivery {
        if !self.ensure_connection() {
            tracing::warn!(group = %report.group, "not connected; group report skipped");
            return Delivery::Dropped {
                reason: format!("no connection to {}", self.connector.endpoint()),
            };
        }

        match self.write_report(report) {
            Ok(()) => {
                tracing::info!(
                    group = %report.group,
                    routines = report.routines.len(),
                    "group report sent"
                );
                Delivery::Sent
            }
            Err(err) => {
                tracing::error!(group = %report.group, error = %err, "group report dropped");
                if matches!(err, NotifyError::Write { .. }) {
                    self.link = None;
                }
                Delivery::Dropped {
                    reason: err.to_string(),
                }
            }
        }
    }
}
