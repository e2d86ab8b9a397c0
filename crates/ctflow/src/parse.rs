//! Conntrack record decoding.
//!
//! A dumped record is the nfgenmsg header followed by top-level attributes:
//!
//! ```text
//! <len, NLA_F_NESTED|CTA_TUPLE_ORIG>
//!   <len, NLA_F_NESTED|CTA_TUPLE_IP>    addresses of the forward flow
//!   <len, NLA_F_NESTED|CTA_TUPLE_PROTO> protocol number and ports
//! <len, NLA_F_NESTED|CTA_TUPLE_REPLY>   same for the reverse flow
//! ...counters, protoinfo, mark, and attributes this model ignores...
//! ```
//!
//! The kernel enforces no schema: lengths, padding and nesting flags have
//! to be taken at face value. Each top-level attribute is therefore decoded
//! through a reader bounded to its declared payload, and the outer cursor
//! is realigned to the attribute end afterwards, so an unrecognized or
//! partially-understood attribute can never desynchronize the rest of the
//! record.

use std::net::IpAddr;

use crate::attr::{AttributeReader, NLA_HDRLEN, RawAttribute, nla_align};
use crate::error::Result;
use crate::flow::{ConntrackFlow, IpTuple, TcpState};

// Top-level conntrack attributes (subset decoded; the rest are skipped).
pub const CTA_TUPLE_ORIG: u16 = 1;
pub const CTA_TUPLE_REPLY: u16 = 2;
pub const CTA_PROTOINFO: u16 = 4;
pub const CTA_MARK: u16 = 8;
pub const CTA_COUNTERS_ORIG: u16 = 9;
pub const CTA_COUNTERS_REPLY: u16 = 10;

// Nested under a tuple.
pub const CTA_TUPLE_IP: u16 = 1;
pub const CTA_TUPLE_PROTO: u16 = 2;

// Nested under CTA_TUPLE_IP.
pub const CTA_IP_V4_SRC: u16 = 1;
pub const CTA_IP_V4_DST: u16 = 2;
pub const CTA_IP_V6_SRC: u16 = 3;
pub const CTA_IP_V6_DST: u16 = 4;

// Nested under CTA_TUPLE_PROTO.
pub const CTA_PROTO_NUM: u16 = 1;
pub const CTA_PROTO_SRC_PORT: u16 = 2;
pub const CTA_PROTO_DST_PORT: u16 = 3;

// Nested under a counters group.
pub const CTA_COUNTERS_PACKETS: u16 = 1;
pub const CTA_COUNTERS_BYTES: u16 = 2;

// Nested under CTA_PROTOINFO.
pub const CTA_PROTOINFO_TCP: u16 = 1;
pub const CTA_PROTOINFO_TCP_STATE: u16 = 1;

/// Decode one kernel record (nfgenmsg onward) into a flow entry.
///
/// Any truncation aborts the whole record with the underlying error; no
/// partially-populated entry is returned. Attribute types this model does
/// not extract are skipped by their declared length.
///
/// The connection mark carries a deliberate compatibility quirk: only the
/// fourth byte of the big-endian CTA_MARK payload is captured, so marks
/// above 255 lose their upper bytes. Consumers of the legacy decoder
/// depend on that truncated value.
pub fn parse_flow(data: &[u8]) -> Result<ConntrackFlow> {
    let mut reader = AttributeReader::new(data);

    let mut flow = ConntrackFlow {
        family: reader.read_u8()?,
        ..Default::default()
    };
    // Rest of the nfgenmsg header (version, res_id).
    reader.skip(3)?;

    while reader.remaining() >= NLA_HDRLEN {
        let header = reader.read_header()?;
        let payload = reader.read_bytes(header.len)?;
        let pad = nla_align(header.len) - header.len;
        reader.skip(pad.min(reader.remaining()))?;

        if header.nested {
            let mut group = AttributeReader::new(payload);
            match header.kind {
                CTA_TUPLE_ORIG => parse_tuple(&mut group, &mut flow.forward)?,
                CTA_TUPLE_REPLY => parse_tuple(&mut group, &mut flow.reverse)?,
                CTA_COUNTERS_ORIG => {
                    let (bytes, packets) = parse_counters(&mut group)?;
                    flow.forward.bytes = bytes;
                    flow.forward.packets = packets;
                }
                CTA_COUNTERS_REPLY => {
                    let (bytes, packets) = parse_counters(&mut group)?;
                    flow.reverse.bytes = bytes;
                    flow.reverse.packets = packets;
                }
                CTA_PROTOINFO => flow.tcp_state = parse_proto_info(&mut group)?,
                _ => {}
            }
        } else if header.kind == CTA_MARK && payload.len() >= 4 {
            flow.mark = payload[3] as u32;
        }
    }

    Ok(flow)
}

/// Decode one CTA_TUPLE_ORIG / CTA_TUPLE_REPLY payload.
///
/// The inner header must announce a nested CTA_TUPLE_IP group; anything
/// else is skipped by its declared length and the tuple stays empty.
fn parse_tuple(reader: &mut AttributeReader<'_>, tuple: &mut IpTuple) -> Result<()> {
    let inner = reader.read_header()?;
    if inner.nested && inner.kind == CTA_TUPLE_IP {
        parse_ip_tuple(reader, tuple)?;
    } else {
        reader.skip(inner.len)?;
    }
    Ok(())
}

/// Decode the address/protocol/port block of one tuple.
///
/// The layout is fixed and the kernel always emits all of it:
///
/// ```text
/// <len, CTA_IP_V4_SRC|CTA_IP_V6_SRC, 4 or 16 address bytes>
/// <len, CTA_IP_V4_DST|CTA_IP_V6_DST, 4 or 16 address bytes>
/// <len, NLA_F_NESTED|CTA_TUPLE_PROTO>                        (skipped raw)
/// <len, CTA_PROTO_NUM, 1 protocol byte, 3 bytes padding>
/// <len, CTA_PROTO_SRC_PORT, 2 port bytes, 2 bytes padding>
/// <len, CTA_PROTO_DST_PORT, 2 port bytes, 2 bytes padding>
/// ```
fn parse_ip_tuple(reader: &mut AttributeReader<'_>, tuple: &mut IpTuple) -> Result<()> {
    // The kernel always emits both addresses.
    for _ in 0..2 {
        let attr = reader.read_attr()?;
        match attr.kind {
            CTA_IP_V4_SRC | CTA_IP_V6_SRC => tuple.src_addr = tuple_addr(&attr),
            CTA_IP_V4_DST | CTA_IP_V6_DST => tuple.dst_addr = tuple_addr(&attr),
            _ => {}
        }
    }

    // The CTA_TUPLE_PROTO group header is not parsed as nested.
    reader.skip(4)?;

    let attr = reader.read_attr()?;
    if attr.kind == CTA_PROTO_NUM && !attr.payload.is_empty() {
        tuple.protocol = attr.payload[0];
    }
    // Alignment padding after the 1-byte protocol field.
    reader.skip(3)?;

    for _ in 0..2 {
        let header = reader.read_header()?;
        match header.kind {
            CTA_PROTO_SRC_PORT => tuple.src_port = reader.read_u16_be()?,
            CTA_PROTO_DST_PORT => tuple.dst_port = reader.read_u16_be()?,
            _ => {}
        }
        // Trailing padding after each 2-byte port.
        reader.skip(2)?;
    }

    Ok(())
}

/// Address family is discriminated solely by the attribute type; the
/// payload must carry exactly the length that family implies.
fn tuple_addr(attr: &RawAttribute<'_>) -> Option<IpAddr> {
    match attr.kind {
        CTA_IP_V4_SRC | CTA_IP_V4_DST => {
            <[u8; 4]>::try_from(attr.payload).ok().map(IpAddr::from)
        }
        CTA_IP_V6_SRC | CTA_IP_V6_DST => {
            <[u8; 16]>::try_from(attr.payload).ok().map(IpAddr::from)
        }
        _ => None,
    }
}

/// Decode a CTA_COUNTERS_* payload into (bytes, packets).
///
/// Counters are optional; an unexpected type or end of group stops the
/// loop early without touching anything beyond the group.
fn parse_counters(reader: &mut AttributeReader<'_>) -> Result<(u64, u64)> {
    let mut bytes = 0;
    let mut packets = 0;

    for _ in 0..2 {
        if reader.remaining() < NLA_HDRLEN {
            break;
        }
        let header = reader.read_header()?;
        match header.kind {
            CTA_COUNTERS_BYTES => bytes = reader.read_u64_be()?,
            CTA_COUNTERS_PACKETS => packets = reader.read_u64_be()?,
            _ => break,
        }
    }

    Ok((bytes, packets))
}

/// Decode a CTA_PROTOINFO payload into a TCP state, when present.
///
/// Unknown protoinfo types, and state codes outside the known table,
/// yield no state rather than an error.
fn parse_proto_info(reader: &mut AttributeReader<'_>) -> Result<Option<TcpState>> {
    let attr = reader.read_attr()?;
    if attr.kind != CTA_PROTOINFO_TCP {
        return Ok(None);
    }

    let mut inner = AttributeReader::new(attr.payload);
    let state = inner.read_attr()?;
    if state.kind == CTA_PROTOINFO_TCP_STATE && !state.payload.is_empty() {
        return Ok(TcpState::from_u8(state.payload[0]));
    }

    Ok(None)
}


#[cfg(test)]
mod tests {
    use super::records::*;
    use super::*;
    use crate::attr::NLA_F_NESTED;
    use crate::error::Error;

    #[test]
    fn decodes_full_tcp_record() {
        let flow = parse_flow(&sample_tcp_record()).unwrap();

        assert_eq!(flow.family, 2);
        assert_eq!(flow.forward.src_addr, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(flow.forward.dst_addr, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(flow.forward.src_port, 1234);
        assert_eq!(flow.forward.dst_port, 80);
        assert_eq!(flow.forward.protocol, 6);
        assert_eq!(flow.forward.packets, 5);
        assert_eq!(flow.forward.bytes, 532);
        assert_eq!(flow.reverse.src_addr, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(flow.reverse.dst_addr, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(flow.reverse.src_port, 80);
        assert_eq!(flow.reverse.dst_port, 1234);
        assert_eq!(flow.reverse.packets, 10);
        assert_eq!(flow.reverse.bytes, 1078);
        assert_eq!(flow.tcp_state, Some(TcpState::Established));
        assert_eq!(flow.mark, 0);
    }

    #[test]
    fn summary_line_matches_conntrack_output() {
        let flow = parse_flow(&sample_tcp_record()).unwrap();
        assert_eq!(
            flow.to_string(),
            "tcp\t6 src=10.0.0.1 dst=10.0.0.2 sport=1234 dport=80 packets=5 bytes=532\t\
             src=10.0.0.2 dst=10.0.0.1 sport=80 dport=1234 packets=10 bytes=1078 mark=0"
        );
    }

    #[test]
    fn udp_record_has_no_tcp_state() {
        let buf = record(
            libc::AF_INET as u8,
            &[
                nested(CTA_TUPLE_ORIG, &tuple(&[127, 0, 0, 1], &[127, 0, 0, 1], 17, 4001, 1234)),
                nested(CTA_TUPLE_REPLY, &tuple(&[127, 0, 0, 1], &[127, 0, 0, 1], 17, 1234, 4001)),
            ],
        );
        let flow = parse_flow(&buf).unwrap();
        assert_eq!(flow.forward.protocol, 17);
        assert_eq!(flow.tcp_state, None);
        assert!(flow.to_string().starts_with("udp\t17 "));
    }

    #[test]
    fn mixed_family_tuple_is_preserved_as_is() {
        let v6 = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let buf = record(
            libc::AF_INET as u8,
            &[nested(CTA_TUPLE_ORIG, &tuple(&[10, 0, 0, 1], &v6, 6, 1, 2))],
        );
        let flow = parse_flow(&buf).unwrap();
        assert_eq!(flow.forward.src_addr, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(flow.forward.dst_addr, Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn mark_low_byte_is_captured() {
        let buf = record(2, &[attr(CTA_MARK, &[0x00, 0x00, 0x00, 0xab])]);
        assert_eq!(parse_flow(&buf).unwrap().mark, 0xab);
    }

    #[test]
    fn mark_upper_bytes_are_lost() {
        // 0x0100 truncates to 0: the legacy single-byte capture is
        // intentional, not a defect to fix.
        let buf = record(2, &[attr(CTA_MARK, &[0x00, 0x00, 0x01, 0x00])]);
        assert_eq!(parse_flow(&buf).unwrap().mark, 0);
    }

    #[test]
    fn short_counters_group_stops_cleanly() {
        let group = nested(CTA_COUNTERS_ORIG, &[attr(CTA_COUNTERS_BYTES, &77u64.to_be_bytes())]);
        let buf = record(2, &[group, attr(CTA_MARK, &[0, 0, 0, 0x42])]);

        let flow = parse_flow(&buf).unwrap();
        assert_eq!(flow.forward.bytes, 77);
        assert_eq!(flow.forward.packets, 0);
        // The attribute after the counters group was not swallowed.
        assert_eq!(flow.mark, 0x42);
    }

    #[test]
    fn unrecognized_nested_attribute_is_skipped() {
        // CTA_SEQ_ADJ_ORIG (15) with sub-attributes the decoder knows
        // nothing about, placed before everything it does know.
        let unknown = nested(15, &[attr(1, &[1, 2, 3, 4]), attr(2, &[5, 6, 7, 8])]);
        let buf = record(
            2,
            &[
                unknown,
                nested(CTA_TUPLE_ORIG, &tuple(&[192, 168, 0, 1], &[192, 168, 0, 2], 6, 40000, 443)),
            ],
        );
        let flow = parse_flow(&buf).unwrap();
        assert_eq!(flow.forward.dst_port, 443);
    }

    #[test]
    fn tuple_without_ip_group_is_skipped() {
        // Inner header is a non-nested unknown type; its declared length
        // is skipped and the tuple stays empty.
        let bogus = nested(CTA_TUPLE_REPLY, &[attr(9, &[1, 2, 3, 4])]);
        let flow = parse_flow(&record(2, &[bogus])).unwrap();
        assert_eq!(flow.reverse, IpTuple::default());
    }

    #[test]
    fn protoinfo_unknown_kind_gives_no_state() {
        // CTA_PROTOINFO_DCCP instead of TCP.
        let info = nested(CTA_PROTOINFO, &[nested(2, &[attr(1, &[3])])]);
        let flow = parse_flow(&record(2, &[info])).unwrap();
        assert_eq!(flow.tcp_state, None);
    }

    #[test]
    fn protoinfo_out_of_table_state_gives_no_state() {
        let flow = parse_flow(&record(2, &[proto_info_tcp(13)])).unwrap();
        assert_eq!(flow.tcp_state, None);
    }

    #[test]
    fn truncated_record_fails_instead_of_reading_past_end() {
        let full = sample_tcp_record();
        // Cut inside the reply tuple.
        let err = parse_flow(&full[..90]).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn record_shorter_than_nfgenmsg_fails() {
        assert!(matches!(
            parse_flow(&[2, 0]).unwrap_err(),
            Error::TruncatedSkip { .. }
        ));
    }

    #[test]
    fn attribute_declaring_more_than_the_buffer_fails() {
        // Top-level header claims 64 payload bytes with 4 present.
        let mut buf = vec![2, 0, 0, 0];
        buf.extend_from_slice(&(68u16).to_ne_bytes());
        buf.extend_from_slice(&(CTA_TUPLE_ORIG | NLA_F_NESTED).to_ne_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            parse_flow(&buf).unwrap_err(),
            Error::TruncatedPayload { expected: 64, .. }
        ));
    }
}
