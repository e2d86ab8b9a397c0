//! Conntrack session: request orchestration and batch decoding.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Result;
use crate::flow::{ConntrackFlow, Family, Table};
use crate::parse::parse_flow;
use crate::request::{flush_request, list_request};
use crate::transport::{NetlinkTransport, Transport};

/// A conntrack session over one transport.
///
/// The session owns the sequence counter correlating requests with
/// responses. The counter is atomic, so a shared session may issue
/// concurrent requests; decoding itself is pure and needs no
/// synchronization.
pub struct Session<T = NetlinkTransport> {
    transport: T,
    seq: AtomicU32,
}

impl Session<NetlinkTransport> {
    /// Connect to the kernel in the current network namespace.
    pub fn connect() -> Result<Self> {
        Ok(Self::with_transport(NetlinkTransport::connect()?))
    }

    /// Connect inside the network namespace at `ns_path`.
    pub fn connect_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        Ok(Self::with_transport(NetlinkTransport::connect_in_namespace_path(ns_path)?))
    }
}

impl<T: Transport> Session<T> {
    /// Create a session over an arbitrary transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            seq: AtomicU32::new(1),
        }
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Dump a table as decoded flow entries.
    ///
    /// A record that fails to decode is logged and skipped; it never
    /// aborts the rest of the batch.
    pub async fn list(&self, table: Table, family: Family) -> Result<Vec<ConntrackFlow>> {
        let mut request = list_request(table, family);
        request.set_seq(self.next_seq());

        let records = self.transport.execute(request.finish()).await?;

        let mut flows = Vec::with_capacity(records.len());
        for record in &records {
            match parse_flow(record) {
                Ok(flow) => flows.push(flow),
                Err(err) => tracing::warn!("skipping undecodable conntrack record: {err}"),
            }
        }
        Ok(flows)
    }

    /// Flush a table. Only the kernel's acknowledgement is surfaced.
    pub async fn flush(&self, table: Table) -> Result<()> {
        let mut request = flush_request(table);
        request.set_seq(self.next_seq());

        self.transport.execute(request.finish()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;
    use crate::message::NlMsgHdr;
    use crate::parse::records::sample_tcp_record;

    /// Transport that replays canned records and captures requests.
    struct MockTransport {
        records: Vec<Vec<u8>>,
        requests: Mutex<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        fn with_records(records: Vec<Vec<u8>>) -> Self {
            Self {
                records,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for MockTransport {
        async fn execute(&self, request: Vec<u8>) -> Result<Vec<Vec<u8>>> {
            self.requests.lock().unwrap().push(request);
            Ok(self.records.clone())
        }
    }

    /// Transport that fails every request with EPERM.
    struct DeniedTransport;

    impl Transport for DeniedTransport {
        async fn execute(&self, _request: Vec<u8>) -> Result<Vec<Vec<u8>>> {
            Err(Error::from_errno(-libc::EPERM))
        }
    }

    #[tokio::test]
    async fn list_decodes_each_record() {
        let session = Session::with_transport(MockTransport::with_records(vec![
            sample_tcp_record(),
            sample_tcp_record(),
        ]));

        let flows = session.list(Table::Conntrack, Family::Ipv4).await.unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].forward.dst_port, 80);
    }

    #[tokio::test]
    async fn bad_record_does_not_abort_the_batch() {
        let mut truncated = sample_tcp_record();
        truncated.truncate(30);

        let session = Session::with_transport(MockTransport::with_records(vec![
            sample_tcp_record(),
            truncated,
            sample_tcp_record(),
        ]));

        let flows = session.list(Table::Conntrack, Family::Ipv4).await.unwrap();
        assert_eq!(flows.len(), 2);
    }

    #[tokio::test]
    async fn sequence_increases_per_request() {
        let session = Session::with_transport(MockTransport::with_records(Vec::new()));

        session.list(Table::Conntrack, Family::Ipv4).await.unwrap();
        session.flush(Table::Conntrack).await.unwrap();

        let requests = session.transport.requests.lock().unwrap();
        let first = NlMsgHdr::from_bytes(&requests[0]).unwrap();
        let second = NlMsgHdr::from_bytes(&requests[1]).unwrap();
        assert_eq!(first.nlmsg_seq, 1);
        assert_eq!(second.nlmsg_seq, 2);
        assert_eq!(second.nlmsg_type, 0x0102);
    }

    #[tokio::test]
    async fn flush_surfaces_kernel_errors() {
        let session = Session::with_transport(DeniedTransport);
        let err = session.flush(Table::Conntrack).await.unwrap_err();
        assert!(err.is_permission_denied());
    }
}
