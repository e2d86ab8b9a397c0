//! Netfilter conntrack table access over raw netlink.
//!
//! This crate speaks the NETLINK_NETFILTER protocol directly: it encodes
//! conntrack GET/DELETE requests and decodes the kernel's dumped records
//! (nested type-length-value attributes) into [`ConntrackFlow`] entries
//! with forward/reverse tuples, counters, TCP state and connection mark.
//!
//! # Example
//!
//! ```ignore
//! use ctflow::{Family, Session, Table};
//!
//! #[tokio::main]
//! async fn main() -> ctflow::Result<()> {
//!     let session = Session::connect()?;
//!
//!     let flows = session.list(Table::Conntrack, Family::Ipv4).await?;
//!     for flow in &flows {
//!         println!("{flow}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! The wire codec ([`parse_flow`], [`RequestBuilder`]) is pure and can be
//! exercised without a socket; the [`Transport`] trait is the seam to the
//! kernel, implemented by [`NetlinkTransport`] and replaceable in tests.

pub mod attr;
mod error;
pub mod flow;
pub mod message;
pub mod parse;
pub mod request;
pub mod session;
mod socket;
pub mod transport;

pub use attr::{AttributeReader, RawAttribute};
pub use error::{Error, Result};
pub use flow::{ConntrackFlow, Family, IpTuple, Table, TcpState};
pub use parse::parse_flow;
pub use request::{RequestBuilder, flush_request, list_request};
pub use session::Session;
pub use socket::NetlinkSocket;
pub use transport::{NetlinkTransport, Transport};
