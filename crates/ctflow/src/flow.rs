//! Conntrack flow data model.

use std::fmt;
use std::net::IpAddr;

/// Conntrack table selector.
///
/// The table id doubles as the netfilter subsystem id in the netlink
/// message type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Table {
    /// The connection tracking table.
    Conntrack = 1,
    /// The expectation table.
    Expect = 2,
}

/// Address family for table dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    /// The AF_* constant for the nfgenmsg family field.
    pub fn as_u8(self) -> u8 {
        match self {
            Family::Ipv4 => libc::AF_INET as u8,
            Family::Ipv6 => libc::AF_INET6 as u8,
        }
    }
}

/// TCP connection tracking state, as reported in CTA_PROTOINFO_TCP_STATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    None,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    CloseWait,
    LastAck,
    TimeWait,
    Close,
    Listen,
}

impl TcpState {
    /// Map a raw state code to a state, if it is within the known table.
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Self::None),
            1 => Some(Self::SynSent),
            2 => Some(Self::SynRecv),
            3 => Some(Self::Established),
            4 => Some(Self::FinWait),
            5 => Some(Self::CloseWait),
            6 => Some(Self::LastAck),
            7 => Some(Self::TimeWait),
            8 => Some(Self::Close),
            9 => Some(Self::Listen),
            _ => None,
        }
    }

    /// The conntrack-style label for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::Listen => "LISTEN",
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One direction of a tracked connection: addressing, protocol, counters.
///
/// Addresses are discriminated solely by which attribute type the kernel
/// emitted (v4 or v6 variants); a tuple may mix families and is
/// represented as-is. Ports are zero for port-less protocols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpTuple {
    /// Source address.
    pub src_addr: Option<IpAddr>,
    /// Destination address.
    pub dst_addr: Option<IpAddr>,
    /// Source port (TCP/UDP).
    pub src_port: u16,
    /// Destination port (TCP/UDP).
    pub dst_port: u16,
    /// IANA protocol number.
    pub protocol: u8,
    /// Byte counter for this direction.
    pub bytes: u64,
    /// Packet counter for this direction.
    pub packets: u64,
}

/// One decoded conntrack table entry.
///
/// Constructed fresh per kernel record and immutable once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConntrackFlow {
    /// Address family of the record (AF_INET / AF_INET6).
    pub family: u8,
    /// Original direction.
    pub forward: IpTuple,
    /// Reply direction.
    pub reverse: IpTuple,
    /// TCP state, when the kernel sent protocol info.
    pub tcp_state: Option<TcpState>,
    /// Connection mark. Only the low byte survives decoding; see
    /// [`crate::parse::parse_flow`].
    pub mark: u32,
}

/// Short name for an IANA protocol number, `"unknown"` otherwise.
pub fn proto_name(protocol: u8) -> &'static str {
    match protocol {
        1 => "icmp",
        2 => "igmp",
        6 => "tcp",
        17 => "udp",
        33 => "dccp",
        47 => "gre",
        58 => "ipv6-icmp",
        132 => "sctp",
        _ => "unknown",
    }
}

struct OptAddr(Option<IpAddr>);

impl fmt::Display for OptAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => addr.fmt(f),
            None => f.write_str("-"),
        }
    }
}

impl fmt::Display for ConntrackFlow {
    /// One-line summary in the style of the `conntrack` command output:
    ///
    /// ```text
    /// udp\t17 src=127.0.0.1 dst=127.0.0.1 sport=4001 dport=1234 packets=5 bytes=532\tsrc=... mark=0
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{} src={} dst={} sport={} dport={} packets={} bytes={}\tsrc={} dst={} sport={} dport={} packets={} bytes={} mark={}",
            proto_name(self.forward.protocol),
            self.forward.protocol,
            OptAddr(self.forward.src_addr),
            OptAddr(self.forward.dst_addr),
            self.forward.src_port,
            self.forward.dst_port,
            self.forward.packets,
            self.forward.bytes,
            OptAddr(self.reverse.src_addr),
            OptAddr(self.reverse.dst_addr),
            self.reverse.src_port,
            self.reverse.dst_port,
            self.reverse.packets,
            self.reverse.bytes,
            self.mark,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_state_table() {
        assert_eq!(TcpState::from_u8(3), Some(TcpState::Established));
        assert_eq!(TcpState::from_u8(9), Some(TcpState::Listen));
        assert_eq!(TcpState::from_u8(10), None);
        assert_eq!(TcpState::Established.to_string(), "ESTABLISHED");
    }

    #[test]
    fn family_constants() {
        assert_eq!(Family::Ipv4.as_u8(), 2);
        assert_eq!(Family::Ipv6.as_u8(), 10);
    }

    #[test]
    fn proto_names() {
        assert_eq!(proto_name(6), "tcp");
        assert_eq!(proto_name(17), "udp");
        assert_eq!(proto_name(200), "unknown");
    }

    #[test]
    fn display_handles_missing_addresses() {
        let flow = ConntrackFlow::default();
        let line = flow.to_string();
        assert!(line.starts_with("unknown\t0 src=- dst=-"));
        assert!(line.ends_with("mark=0"));
    }
}
