//! Transport seam between the codec and the kernel.

use std::path::Path;

use crate::error::{Error, Result};
use crate::message::{MessageIter, NLM_F_DUMP, NLMSG_HDRLEN, NlMsgError};
use crate::socket::NetlinkSocket;

/// Executes encoded requests against the conntrack subsystem.
///
/// This is the only boundary the codec blocks on; everything on either
/// side of it is pure. Implementations return one buffer per kernel
/// record with the netlink header stripped (nfgenmsg onward). For DUMP
/// requests all multipart messages are aggregated up to the done marker;
/// for ACK requests the list is empty and only success or error matters.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn execute(&self, request: Vec<u8>) -> Result<Vec<Vec<u8>>>;
}

/// The real transport: an async NETLINK_NETFILTER socket.
pub struct NetlinkTransport {
    socket: NetlinkSocket,
}

impl NetlinkTransport {
    /// Open a socket in the current network namespace.
    pub fn connect() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::connect()?,
        })
    }

    /// Open a socket in the namespace at `ns_path`.
    pub fn connect_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::connect_in_namespace_path(ns_path)?,
        })
    }
}

impl Transport for NetlinkTransport {
    async fn execute(&self, mut request: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        if request.len() < NLMSG_HDRLEN {
            return Err(Error::InvalidMessage(
                "request shorter than a netlink header".into(),
            ));
        }

        // The builder leaves pid zeroed; stamp our port ID so replies can
        // be attributed, and recover seq/flags for the receive loop.
        request[12..16].copy_from_slice(&self.socket.pid().to_ne_bytes());
        let seq = u32::from_ne_bytes([request[8], request[9], request[10], request[11]]);
        let flags = u16::from_ne_bytes([request[6], request[7]]);
        let dump = flags & NLM_F_DUMP == NLM_F_DUMP;

        self.socket.send(&request).await?;

        let mut records = Vec::new();
        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    // ACK terminates a non-dump request.
                    if !dump {
                        return Ok(records);
                    }
                    continue;
                }

                if header.is_done() {
                    return Ok(records);
                }

                records.push(payload.to_vec());
            }
        }
    }
}
