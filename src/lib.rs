//! Userspace TAP/TUN bridging primitives.
//!
//! The heart of this crate is the [`Translator`], which lets an
//! application that owns a Layer-3 virtual interface (TUN, raw IP
//! packets) participate in a Layer-2 transport (TAP semantics, whole
//! Ethernet frames):
//!
//! ```text
//! ┌──────────────┐  IP packets   ┌──────────────┐  Ethernet frames  ┌───────────┐
//! │  TUN device  │ ────────────► │  Translator  │ ────────────────► │ L2 tunnel │
//! │  (kernel)    │ ◄──────────── │              │ ◄──────────────── │ transport │
//! └──────────────┘               └──────────────┘                   └───────────┘
//! ```
//!
//! The translator synthesizes Ethernet headers on the way out and strips
//! them on the way in, answers ARP on behalf of the host, learns the
//! host's IP from egress traffic and the peer gateway's MAC from ingress
//! traffic, and can drive a DHCP conversation over the same synthetic L2
//! channel. It performs no I/O and owns no file descriptors; feeding it
//! packets, transmitting the frames it queues, and pacing DHCP retries
//! are all the caller's business.
//!
//! # Example
//!
//! ```
//! use taptun::{Translator, TranslatorConfig};
//!
//! let mut translator = Translator::new(TranslatorConfig::default())?;
//!
//! // Egress: wrap a packet read from the TUN device.
//! let ip_packet = [0x45u8, 0x00, 0x00, 0x14, 0, 0, 0, 0, 0x40, 0x11, 0, 0,
//!                  10, 0, 0, 2, 10, 0, 0, 1];
//! let frame = translator.ip_to_ethernet(&ip_packet)?;
//! assert_eq!(frame.len(), ip_packet.len() + 14);
//!
//! // Ingress: unwrap a frame received from the tunnel; ARP is consumed
//! // internally and yields `None`.
//! if let Some(packet) = translator.ethernet_to_ip(&frame)? {
//!     assert_eq!(&packet[..], &ip_packet[..]);
//! }
//!
//! // Replies the translator wants transmitted are polled off its queues.
//! while let Some(reply) = translator.pop_arp_reply() {
//!     // write `reply` to the tunnel
//!     let _ = reply;
//! }
//! # Ok::<(), taptun::Error>(())
//! ```

pub mod arp;
pub mod dhcp;
pub mod error;
pub mod ethernet;
pub mod translator;

pub use dhcp::{DhcpLease, DhcpState};
pub use error::{Error, Result};
pub use translator::{Translator, TranslatorConfig, TranslatorStats, MAX_ARP_QUEUE};
