//! ARP packet parsing and frame builders.
//!
//! All builders produce complete Ethernet frames (14-byte header + 28-byte
//! ARP body, 42 bytes total) ready to hand to the L2 transport.

use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

use crate::ethernet::{BROADCAST_MAC, ZERO_MAC};

/// Ethernet header (14) + ARP body (28).
pub const ARP_FRAME_LEN: usize = 42;

/// ARP operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOperation {
    Request = 1,
    Reply = 2,
}

impl TryFrom<u16> for ArpOperation {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Request),
            2 => Ok(Self::Reply),
            _ => Err(()),
        }
    }
}

/// Fields of a validated ingress ARP frame.
#[derive(Debug, Clone, Copy)]
pub struct ArpFields {
    pub operation: u16,
    pub sender_mac: [u8; 6],
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

/// Parse an ARP frame (Ethernet header included).
///
/// Returns `None` for short frames and for anything that is not
/// Ethernet/IPv4 ARP with 6-byte hardware and 4-byte protocol addresses.
pub fn parse(frame: &[u8]) -> Option<ArpFields> {
    if frame.len() < ARP_FRAME_LEN {
        return None;
    }

    let arp = &frame[14..];

    let hw_type = u16::from_be_bytes([arp[0], arp[1]]);
    let proto_type = u16::from_be_bytes([arp[2], arp[3]]);
    if hw_type != 1 || proto_type != 0x0800 {
        return None;
    }
    if arp[4] != 6 || arp[5] != 4 {
        return None;
    }

    let operation = u16::from_be_bytes([arp[6], arp[7]]);
    let sender_mac: [u8; 6] = arp[8..14].try_into().ok()?;
    let sender_ip = Ipv4Addr::new(arp[14], arp[15], arp[16], arp[17]);
    let target_ip = Ipv4Addr::new(arp[24], arp[25], arp[26], arp[27]);

    Some(ArpFields {
        operation,
        sender_mac,
        sender_ip,
        target_ip,
    })
}

/// ARP target-IP field of a built frame (frame bytes 38..42).
pub(crate) fn reply_target_ip(frame: &[u8]) -> Option<Ipv4Addr> {
    if frame.len() < ARP_FRAME_LEN {
        return None;
    }
    Some(Ipv4Addr::new(frame[38], frame[39], frame[40], frame[41]))
}

/// Build an ARP reply: "`our_ip` is at `our_mac`", addressed to the
/// requester.
pub fn build_reply(
    our_mac: [u8; 6],
    our_ip: Ipv4Addr,
    target_mac: [u8; 6],
    target_ip: Ipv4Addr,
) -> Bytes {
    build(
        ArpOperation::Reply,
        &target_mac,
        &our_mac,
        our_ip,
        &target_mac,
        target_ip,
    )
}

/// Build a broadcast ARP request: "who has `target_ip`? Tell `our_ip`".
pub fn build_request(our_mac: [u8; 6], our_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Bytes {
    build(
        ArpOperation::Request,
        &BROADCAST_MAC,
        &our_mac,
        our_ip,
        &ZERO_MAC,
        target_ip,
    )
}

/// Build a gratuitous ARP announcing `our_ip`.
pub fn build_gratuitous(our_mac: [u8; 6], our_ip: Ipv4Addr) -> Bytes {
    build(
        ArpOperation::Request,
        &BROADCAST_MAC,
        &our_mac,
        our_ip,
        &ZERO_MAC,
        our_ip,
    )
}

fn build(
    operation: ArpOperation,
    dst_mac: &[u8; 6],
    sender_mac: &[u8; 6],
    sender_ip: Ipv4Addr,
    target_mac: &[u8; 6],
    target_ip: Ipv4Addr,
) -> Bytes {
    let mut frame = BytesMut::with_capacity(ARP_FRAME_LEN);

    // Ethernet header
    frame.put_slice(dst_mac);
    frame.put_slice(sender_mac);
    frame.put_u16(0x0806);

    // ARP body
    frame.put_u16(0x0001); // hardware type: Ethernet
    frame.put_u16(0x0800); // protocol type: IPv4
    frame.put_u8(6); // hardware address length
    frame.put_u8(4); // protocol address length
    frame.put_u16(operation as u16);
    frame.put_slice(sender_mac);
    frame.put_slice(&sender_ip.octets());
    frame.put_slice(target_mac);
    frame.put_slice(&target_ip.octets());

    frame.freeze()
}
