//! Conntrack request encoding.
//!
//! A request is the 16-byte netlink header, the 4-byte nfgenmsg netfilter
//! header, and zero or more attributes appended in order. The message type
//! word packs the table id (doubling as the netfilter subsystem id) into
//! the high byte and the operation into the low byte.

use crate::attr::{NLA_HDRLEN, nla_align};
use crate::flow::{Family, Table};
use crate::message::{
    NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgHdr, nlmsg_align,
};

/// Conntrack table operations (low byte of the message type).
pub const IPCTNL_MSG_CT_GET: u8 = 1;
pub const IPCTNL_MSG_CT_DELETE: u8 = 2;

/// nfgenmsg version constant.
pub const NFNETLINK_V0: u8 = 0;

/// Builder for one encoded netlink request.
///
/// NLM_F_REQUEST is always set; the length field is recomputed by
/// [`finish`](Self::finish) so it always reflects the total encoded size.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    buf: Vec<u8>,
}

impl RequestBuilder {
    /// Create a new request with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        let header = NlMsgHdr::new(msg_type, NLM_F_REQUEST | flags);
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self { buf }
    }

    /// Append raw bytes (with message alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append an attribute with the given type and payload.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        self.buf
            .extend_from_slice(&((NLA_HDRLEN + data.len()) as u16).to_ne_bytes());
        self.buf.extend_from_slice(&attr_type.to_ne_bytes());
        self.buf.extend_from_slice(data);
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the sending port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// Finalize: recompute the length field and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }

    /// The current buffer, for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Build a request against a conntrack table: netlink header plus the
/// nfgenmsg `{family, NFNETLINK_V0, res_id 0}`.
pub fn table_request(table: Table, family: Family, operation: u8, flags: u16) -> RequestBuilder {
    let msg_type = ((table as u16) << 8) | operation as u16;
    let mut builder = RequestBuilder::new(msg_type, flags);
    // nfgenmsg: family(1), version(1), res_id(2, network order)
    builder.append_bytes(&[family.as_u8(), NFNETLINK_V0, 0, 0]);
    builder
}

/// Build a dump request listing a whole table.
pub fn list_request(table: Table, family: Family) -> RequestBuilder {
    table_request(table, family, IPCTNL_MSG_CT_GET, NLM_F_DUMP)
}

/// Build a flush (delete-all) request. The kernel flushes regardless of
/// family; IPv4 is fixed here as the original protocol does.
pub fn flush_request(table: Table) -> RequestBuilder {
    table_request(table, Family::Ipv4, IPCTNL_MSG_CT_DELETE, NLM_F_ACK)
}
