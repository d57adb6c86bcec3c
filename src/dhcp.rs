//! DHCP initiator over synthetic Ethernet.
//!
//! Implements the client half of a BOOTP/DHCP conversation as framed
//! Ethernet packets, so the surrounding translator only ever sees L2: the
//! session emits complete DISCOVER/REQUEST/RELEASE frames and consumes
//! complete server reply frames.
//!
//! The session holds no timers. Retransmission and lease-renewal policy
//! belong to the caller, driven by [`DhcpLease`]'s predicates.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use std::net::Ipv4Addr;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::ethernet::{EtherType, BROADCAST_MAC};

/// DHCP magic cookie marking the start of the options region.
const DHCP_MAGIC: u32 = 0x63825363;

/// UDP port the client sends from and listens on.
pub const CLIENT_PORT: u16 = 68;

/// UDP port the server listens on.
pub const SERVER_PORT: u16 = 67;

/// Smallest well-formed server reply: Ethernet(14) + IP(20) + UDP(8) +
/// BOOTP fixed header and magic cookie (240).
const REPLY_MIN_FRAME: usize = 282;

/// Minimum total frame size for packets we emit; the BOOTP payload is
/// zero-padded up to this.
const BOOTP_MIN_FRAME: usize = 300;

/// DHCP message types (option 53).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DhcpMessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for DhcpMessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            _ => Err(()),
        }
    }
}

/// DHCP option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DhcpOption {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    DnsServer = 6,
    RequestedIp = 50,
    LeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequest = 55,
    RenewalTime = 58,
    RebindingTime = 59,
    End = 255,
}

/// DHCP session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DhcpState {
    /// No conversation in progress.
    #[default]
    Idle,
    /// DISCOVER queued, waiting for an OFFER.
    Selecting,
    /// REQUEST queued, waiting for an ACK.
    Requesting,
    /// Lease acquired.
    Bound,
}

/// Address configuration obtained from a DHCP ACK.
#[derive(Debug, Clone)]
pub struct DhcpLease {
    /// Assigned IP address.
    pub ip: Ipv4Addr,
    /// Subnet mask.
    pub netmask: Ipv4Addr,
    /// Default gateway, when the server sent one.
    pub gateway: Option<Ipv4Addr>,
    /// DNS servers, in server order.
    pub dns: Vec<Ipv4Addr>,
    /// The server the lease came from.
    pub server_id: Option<Ipv4Addr>,
    /// Lease time in seconds.
    pub lease_time: u32,
    /// Renewal time (T1) in seconds.
    pub renewal_time: u32,
    /// Rebinding time (T2) in seconds.
    pub rebinding_time: u32,
    obtained_at: Instant,
}

impl DhcpLease {
    /// When the lease was recorded.
    pub fn obtained_at(&self) -> Instant {
        self.obtained_at
    }

    fn elapsed_secs(&self) -> u64 {
        self.obtained_at.elapsed().as_secs()
    }

    /// The full lease time has elapsed.
    pub fn is_expired(&self) -> bool {
        self.elapsed_secs() >= u64::from(self.lease_time)
    }

    /// T1 has elapsed; the caller should renew with the original server.
    pub fn needs_renewal(&self) -> bool {
        self.elapsed_secs() >= u64::from(self.renewal_time)
    }

    /// T2 has elapsed; the caller should rebind with any server.
    pub fn needs_rebinding(&self) -> bool {
        self.elapsed_secs() >= u64::from(self.rebinding_time)
    }
}

/// Options parsed out of one server reply.
#[derive(Debug, Default)]
struct ReplyFields {
    message_type: Option<DhcpMessageType>,
    netmask: Option<Ipv4Addr>,
    router: Option<Ipv4Addr>,
    dns: Vec<Ipv4Addr>,
    server_id: Option<Ipv4Addr>,
    lease_time: Option<u32>,
    renewal_time: Option<u32>,
    rebinding_time: Option<u32>,
}

/// Check whether an Ethernet frame carries a DHCP server reply
/// (IPv4/UDP, ports 67 → 68, room for the BOOTP fixed header).
pub(crate) fn is_dhcp_reply(frame: &[u8]) -> bool {
    if frame.len() < REPLY_MIN_FRAME {
        return false;
    }
    if frame[12] != 0x08 || frame[13] != 0x00 {
        return false;
    }
    // Fixed offsets below assume an option-less IP header.
    if frame[14] != 0x45 {
        return false;
    }
    if frame[23] != 17 {
        return false;
    }
    let src_port = u16::from_be_bytes([frame[34], frame[35]]);
    let dst_port = u16::from_be_bytes([frame[36], frame[37]]);
    src_port == SERVER_PORT && dst_port == CLIENT_PORT
}

fn generate_xid() -> u32 {
    rand::thread_rng().gen()
}

/// DHCP client session.
///
/// Drives Idle → Selecting → Requesting → Bound; a NAK from any state
/// returns to Idle. All frames it builds are complete Ethernet frames.
#[derive(Debug)]
pub struct DhcpSession {
    state: DhcpState,
    xid: u32,
    mac: [u8; 6],
    offered_ip: Option<Ipv4Addr>,
    offered_server_id: Option<Ipv4Addr>,
    lease: Option<DhcpLease>,
}

impl DhcpSession {
    /// Create an idle session for the given client MAC.
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            state: DhcpState::Idle,
            xid: 0,
            mac,
            offered_ip: None,
            offered_server_id: None,
            lease: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> DhcpState {
        self.state
    }

    /// Transaction ID of the current conversation.
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// The lease from the most recent ACK, if any.
    pub fn lease(&self) -> Option<&DhcpLease> {
        self.lease.as_ref()
    }

    /// Begin (or restart) a conversation: fresh transaction ID, state
    /// Selecting. Returns the DISCOVER frame to transmit.
    pub fn start(&mut self) -> Bytes {
        self.xid = generate_xid();
        self.offered_ip = None;
        self.offered_server_id = None;
        self.state = DhcpState::Selecting;
        debug!(xid = %format_args!("{:08x}", self.xid), "DHCP DISCOVER");

        let payload = self.build_payload(DhcpMessageType::Discover, Ipv4Addr::UNSPECIFIED, None, None, true, true);
        wrap(
            &payload,
            self.mac,
            BROADCAST_MAC,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
        )
    }

    /// Return the session to Idle, discarding any offer and lease.
    pub fn reset(&mut self) {
        self.state = DhcpState::Idle;
        self.offered_ip = None;
        self.offered_server_id = None;
        self.lease = None;
    }

    /// Build a unicast RELEASE for the current lease and return to Idle.
    pub fn release(&mut self, client_ip: Ipv4Addr, server_ip: Ipv4Addr, server_mac: [u8; 6]) -> Bytes {
        info!(%client_ip, %server_ip, "DHCP RELEASE");
        let payload = self.build_payload(
            DhcpMessageType::Release,
            client_ip,
            None,
            Some(server_ip),
            false,
            false,
        );
        let frame = wrap(&payload, self.mac, server_mac, client_ip, server_ip);
        self.reset();
        frame
    }

    /// Feed one ingress frame to the session.
    ///
    /// Returns a frame to transmit when the reply advances the
    /// conversation (OFFER → REQUEST). Replies with a foreign transaction
    /// ID and malformed replies are ignored.
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<Bytes> {
        if !is_dhcp_reply(frame) {
            return None;
        }

        let bootp = &frame[42..];

        let xid = u32::from_be_bytes([bootp[4], bootp[5], bootp[6], bootp[7]]);
        if xid != self.xid {
            debug!(
                got = %format_args!("{:08x}", xid),
                want = %format_args!("{:08x}", self.xid),
                "ignoring DHCP reply with foreign xid"
            );
            return None;
        }

        let magic = u32::from_be_bytes([bootp[236], bootp[237], bootp[238], bootp[239]]);
        if magic != DHCP_MAGIC {
            debug!("DHCP reply missing magic cookie");
            return None;
        }

        let yiaddr = Ipv4Addr::new(bootp[16], bootp[17], bootp[18], bootp[19]);
        let fields = parse_options(&bootp[240..]);

        match (self.state, fields.message_type) {
            (DhcpState::Selecting, Some(DhcpMessageType::Offer)) => {
                if yiaddr.is_unspecified() {
                    debug!("DHCP OFFER without an address, ignoring");
                    return None;
                }
                let Some(server_id) = fields.server_id else {
                    debug!("DHCP OFFER without a server identifier, ignoring");
                    return None;
                };
                info!(offered = %yiaddr, server = %server_id, "DHCP OFFER");
                self.offered_ip = Some(yiaddr);
                self.offered_server_id = Some(server_id);
                self.state = DhcpState::Requesting;

                let payload = self.build_payload(
                    DhcpMessageType::Request,
                    Ipv4Addr::UNSPECIFIED,
                    Some(yiaddr),
                    Some(server_id),
                    true,
                    true,
                );
                Some(wrap(
                    &payload,
                    self.mac,
                    BROADCAST_MAC,
                    Ipv4Addr::UNSPECIFIED,
                    Ipv4Addr::BROADCAST,
                ))
            }
            (DhcpState::Requesting, Some(DhcpMessageType::Ack)) => {
                let lease_time = fields.lease_time.unwrap_or(86_400);
                let renewal_time = fields.renewal_time.unwrap_or(lease_time / 2);
                let rebinding_time = fields
                    .rebinding_time
                    .unwrap_or((u64::from(lease_time) * 7 / 8) as u32);

                let lease = DhcpLease {
                    ip: yiaddr,
                    netmask: fields.netmask.unwrap_or(Ipv4Addr::new(255, 255, 255, 0)),
                    gateway: fields.router,
                    dns: fields.dns,
                    server_id: fields.server_id.or(self.offered_server_id),
                    lease_time,
                    renewal_time,
                    rebinding_time,
                    obtained_at: Instant::now(),
                };
                info!(
                    ip = %lease.ip,
                    gateway = ?lease.gateway,
                    lease_secs = lease.lease_time,
                    "DHCP ACK"
                );
                self.lease = Some(lease);
                self.state = DhcpState::Bound;
                None
            }
            (_, Some(DhcpMessageType::Nak)) => {
                warn!("DHCP NAK, conversation aborted");
                self.reset();
                None
            }
            _ => None,
        }
    }

    /// Build a BOOTP payload (fixed header + options), padded so the
    /// final frame reaches [`BOOTP_MIN_FRAME`].
    fn build_payload(
        &self,
        msg_type: DhcpMessageType,
        ciaddr: Ipv4Addr,
        requested_ip: Option<Ipv4Addr>,
        server_id: Option<Ipv4Addr>,
        broadcast: bool,
        with_params: bool,
    ) -> BytesMut {
        let mut payload = BytesMut::with_capacity(BOOTP_MIN_FRAME - 42);

        payload.put_u8(0x01); // op: BOOTREQUEST
        payload.put_u8(0x01); // htype: Ethernet
        payload.put_u8(0x06); // hlen
        payload.put_u8(0x00); // hops
        payload.put_u32(self.xid);
        payload.put_u16(0x0000); // secs
        payload.put_u16(if broadcast { 0x8000 } else { 0x0000 });

        payload.put_slice(&ciaddr.octets());
        payload.put_slice(&[0u8; 12]); // yiaddr, siaddr, giaddr

        // chaddr, padded to 16 bytes
        payload.put_slice(&self.mac);
        payload.put_slice(&[0u8; 10]);

        // sname + file
        payload.put_slice(&[0u8; 192]);

        payload.put_u32(DHCP_MAGIC);

        payload.put_u8(DhcpOption::MessageType as u8);
        payload.put_u8(1);
        payload.put_u8(msg_type as u8);

        if let Some(ip) = requested_ip {
            payload.put_u8(DhcpOption::RequestedIp as u8);
            payload.put_u8(4);
            payload.put_slice(&ip.octets());
        }

        if let Some(ip) = server_id {
            payload.put_u8(DhcpOption::ServerIdentifier as u8);
            payload.put_u8(4);
            payload.put_slice(&ip.octets());
        }

        if with_params {
            payload.put_u8(DhcpOption::ParameterRequest as u8);
            payload.put_u8(4);
            payload.put_u8(DhcpOption::SubnetMask as u8);
            payload.put_u8(DhcpOption::Router as u8);
            payload.put_u8(DhcpOption::DnsServer as u8);
            payload.put_u8(DhcpOption::LeaseTime as u8);
        }

        payload.put_u8(DhcpOption::End as u8);

        while payload.len() < BOOTP_MIN_FRAME - 42 {
            payload.put_u8(0x00);
        }

        payload
    }
}

/// Walk the options region. Malformed lengths terminate the walk; fields
/// parsed up to that point are kept.
fn parse_options(options: &[u8]) -> ReplyFields {
    let mut fields = ReplyFields::default();
    let mut i = 0;

    while i < options.len() {
        let code = options[i];

        if code == DhcpOption::End as u8 {
            break;
        }
        if code == DhcpOption::Pad as u8 {
            i += 1;
            continue;
        }
        if i + 1 >= options.len() {
            break;
        }

        let len = options[i + 1] as usize;
        if i + 2 + len > options.len() {
            break;
        }
        let data = &options[i + 2..i + 2 + len];

        match code {
            c if c == DhcpOption::MessageType as u8 && len >= 1 => {
                fields.message_type = DhcpMessageType::try_from(data[0]).ok();
            }
            c if c == DhcpOption::SubnetMask as u8 && len >= 4 => {
                fields.netmask = Some(Ipv4Addr::new(data[0], data[1], data[2], data[3]));
            }
            c if c == DhcpOption::Router as u8 && len >= 4 => {
                fields.router = Some(Ipv4Addr::new(data[0], data[1], data[2], data[3]));
            }
            c if c == DhcpOption::DnsServer as u8 => {
                for chunk in data.chunks_exact(4) {
                    fields
                        .dns
                        .push(Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]));
                }
            }
            c if c == DhcpOption::ServerIdentifier as u8 && len >= 4 => {
                fields.server_id = Some(Ipv4Addr::new(data[0], data[1], data[2], data[3]));
            }
            c if c == DhcpOption::LeaseTime as u8 && len >= 4 => {
                fields.lease_time = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            c if c == DhcpOption::RenewalTime as u8 && len >= 4 => {
                fields.renewal_time =
                    Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            c if c == DhcpOption::RebindingTime as u8 && len >= 4 => {
                fields.rebinding_time =
                    Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            _ => {}
        }

        i += 2 + len;
    }

    fields
}

/// Wrap a BOOTP payload in UDP + IPv4 + Ethernet headers.
fn wrap(
    payload: &[u8],
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
) -> Bytes {
    let udp_len = 8 + payload.len();
    let ip_len = 20 + udp_len;

    let mut frame = BytesMut::with_capacity(14 + ip_len);

    // Ethernet
    frame.put_slice(&dst_mac);
    frame.put_slice(&src_mac);
    frame.put_u16(EtherType::Ipv4 as u16);

    // IPv4, no options
    frame.put_u8(0x45);
    frame.put_u8(0x00);
    frame.put_u16(ip_len as u16);
    frame.put_u32(0x0000_0000); // id, flags, fragment offset
    frame.put_u8(64); // TTL
    frame.put_u8(17); // protocol: UDP
    frame.put_u16(0x0000); // checksum placeholder
    frame.put_slice(&src_ip.octets());
    frame.put_slice(&dst_ip.octets());

    let checksum = ip_header_checksum(&frame[14..34]);
    frame[24] = (checksum >> 8) as u8;
    frame[25] = checksum as u8;

    // UDP; checksum optional over IPv4, left zero
    frame.put_u16(CLIENT_PORT);
    frame.put_u16(SERVER_PORT);
    frame.put_u16(udp_len as u16);
    frame.put_u16(0x0000);

    frame.put_slice(payload);

    frame.freeze()
}

/// One's-complement sum of the IP header with carry folding.
fn ip_header_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for pair in header.chunks_exact(2) {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MAC: [u8; 6] = [0x5E, 0x12, 0x34, 0x56, 0x78, 0x9A];

    /// Build a server reply frame: OFFER/ACK/NAK with the given yiaddr and
    /// extra raw options appended after the message type.
    fn server_reply(xid: u32, msg_type: u8, yiaddr: Ipv4Addr, extra_options: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(BOOTP_MIN_FRAME);

        // Ethernet
        frame.extend_from_slice(&BROADCAST_MAC);
        frame.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        frame.extend_from_slice(&[0x08, 0x00]);

        // IPv4 from the server to broadcast
        let bootp_len = 240 + 3 + extra_options.len() + 1;
        let ip_len = 20 + 8 + bootp_len;
        frame.push(0x45);
        frame.push(0x00);
        frame.extend_from_slice(&(ip_len as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0, 0]);
        frame.push(64);
        frame.push(17);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&Ipv4Addr::new(192, 168, 30, 1).octets());
        frame.extend_from_slice(&Ipv4Addr::BROADCAST.octets());

        // UDP 67 -> 68
        frame.extend_from_slice(&SERVER_PORT.to_be_bytes());
        frame.extend_from_slice(&CLIENT_PORT.to_be_bytes());
        frame.extend_from_slice(&((8 + bootp_len) as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0]);

        // BOOTP fixed header
        frame.push(0x02); // op: BOOTREPLY
        frame.push(0x01);
        frame.push(0x06);
        frame.push(0x00);
        frame.extend_from_slice(&xid.to_be_bytes());
        frame.extend_from_slice(&[0u8; 8]); // secs, flags, ciaddr
        frame.extend_from_slice(&yiaddr.octets());
        frame.extend_from_slice(&[0u8; 8]); // siaddr, giaddr
        frame.extend_from_slice(&MAC);
        frame.extend_from_slice(&[0u8; 10]);
        frame.extend_from_slice(&[0u8; 192]);
        frame.extend_from_slice(&DHCP_MAGIC.to_be_bytes());

        // Options
        frame.extend_from_slice(&[DhcpOption::MessageType as u8, 1, msg_type]);
        frame.extend_from_slice(extra_options);
        frame.push(DhcpOption::End as u8);

        frame
    }

    fn server_id_option(ip: Ipv4Addr) -> Vec<u8> {
        let mut opt = vec![DhcpOption::ServerIdentifier as u8, 4];
        opt.extend_from_slice(&ip.octets());
        opt
    }

    #[test]
    fn test_discover_wire_format() {
        let mut session = DhcpSession::new(MAC);
        let frame = session.start();

        assert_eq!(session.state(), DhcpState::Selecting);
        assert_eq!(frame.len(), BOOTP_MIN_FRAME);

        // Ethernet: broadcast from our MAC, IPv4
        assert_eq!(&frame[0..6], &BROADCAST_MAC);
        assert_eq!(&frame[6..12], &MAC);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);

        // IPv4: 0.0.0.0 -> 255.255.255.255, UDP, TTL 64
        assert_eq!(frame[14], 0x45);
        assert_eq!(frame[22], 64);
        assert_eq!(frame[23], 17);
        assert_eq!(&frame[26..30], &[0, 0, 0, 0]);
        assert_eq!(&frame[30..34], &[0xFF, 0xFF, 0xFF, 0xFF]);

        // The stored checksum validates the header
        assert_eq!(ip_header_checksum(&frame[14..34]), 0);

        // UDP 68 -> 67
        assert_eq!(u16::from_be_bytes([frame[34], frame[35]]), CLIENT_PORT);
        assert_eq!(u16::from_be_bytes([frame[36], frame[37]]), SERVER_PORT);

        // BOOTP: BOOTREQUEST over Ethernet, our chaddr, magic cookie
        assert_eq!(frame[42], 0x01);
        assert_eq!(frame[43], 0x01);
        assert_eq!(frame[44], 0x06);
        assert_eq!(u32::from_be_bytes([frame[46], frame[47], frame[48], frame[49]]), session.xid());
        assert_eq!(&frame[70..76], &MAC);
        assert_eq!(&frame[278..282], &[0x63, 0x82, 0x53, 0x63]);

        // Message type DISCOVER, parameter request includes lease time,
        // terminated options
        let options = &frame[282..];
        assert_eq!(&options[0..3], &[0x35, 0x01, 0x01]);
        assert!(options
            .windows(6)
            .any(|w| w == [0x37, 4, 1, 3, 6, 51]));
        assert!(options.contains(&0xFF));
    }

    #[test]
    fn test_offer_produces_request() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let server = Ipv4Addr::new(192, 168, 30, 1);
        let offered = Ipv4Addr::new(192, 168, 30, 5);
        let offer = server_reply(session.xid(), 2, offered, &server_id_option(server));

        let request = session.process_frame(&offer).expect("REQUEST expected");
        assert_eq!(session.state(), DhcpState::Requesting);

        // Options carry requested IP (50) and server id (54)
        let mut requested = vec![DhcpOption::RequestedIp as u8, 4];
        requested.extend_from_slice(&offered.octets());
        let server_opt = server_id_option(server);
        assert!(request.windows(6).any(|w| w == &requested[..]));
        assert!(request.windows(6).any(|w| w == &server_opt[..]));
        assert!(request.windows(3).any(|w| w == [0x35, 0x01, 0x03]));
    }

    #[test]
    fn test_offer_without_server_id_is_ignored() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let offer = server_reply(session.xid(), 2, Ipv4Addr::new(192, 168, 30, 5), &[]);
        assert!(session.process_frame(&offer).is_none());
        assert_eq!(session.state(), DhcpState::Selecting);
    }

    #[test]
    fn test_ack_binds_with_lease_defaults() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let server = Ipv4Addr::new(192, 168, 30, 1);
        let offered = Ipv4Addr::new(192, 168, 30, 5);
        let offer = server_reply(session.xid(), 2, offered, &server_id_option(server));
        session.process_frame(&offer);

        // ACK with subnet mask, router, DNS, lease time; no T1/T2
        let mut opts = server_id_option(server);
        opts.extend_from_slice(&[1, 4, 255, 255, 255, 0]);
        opts.extend_from_slice(&[3, 4, 192, 168, 30, 1]);
        opts.extend_from_slice(&[6, 8, 8, 8, 8, 8, 8, 8, 4, 4]);
        opts.extend_from_slice(&[51, 4, 0, 0, 0x0E, 0x10]); // 3600 s
        let ack = server_reply(session.xid(), 5, offered, &opts);

        assert!(session.process_frame(&ack).is_none());
        assert_eq!(session.state(), DhcpState::Bound);

        let lease = session.lease().expect("lease");
        assert_eq!(lease.ip, offered);
        assert_eq!(lease.netmask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(lease.gateway, Some(server));
        assert_eq!(
            lease.dns,
            vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]
        );
        assert_eq!(lease.server_id, Some(server));
        assert_eq!(lease.lease_time, 3600);
        assert_eq!(lease.renewal_time, 1800);
        assert_eq!(lease.rebinding_time, 3150);
        assert!(!lease.is_expired());
        assert!(!lease.needs_renewal());
        assert!(!lease.needs_rebinding());
    }

    #[test]
    fn test_ack_without_lease_options_uses_one_day() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let server = Ipv4Addr::new(10, 0, 0, 1);
        let offered = Ipv4Addr::new(10, 0, 0, 7);
        session.process_frame(&server_reply(
            session.xid(),
            2,
            offered,
            &server_id_option(server),
        ));
        session.process_frame(&server_reply(session.xid(), 5, offered, &[]));

        let lease = session.lease().expect("lease");
        assert_eq!(lease.lease_time, 86_400);
        assert_eq!(lease.renewal_time, 43_200);
        assert_eq!(lease.rebinding_time, 75_600);
        // Server id remembered from the OFFER
        assert_eq!(lease.server_id, Some(server));
    }

    #[test]
    fn test_nak_returns_to_idle() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let server = Ipv4Addr::new(10, 0, 0, 1);
        session.process_frame(&server_reply(
            session.xid(),
            2,
            Ipv4Addr::new(10, 0, 0, 7),
            &server_id_option(server),
        ));
        assert_eq!(session.state(), DhcpState::Requesting);

        session.process_frame(&server_reply(
            session.xid(),
            6,
            Ipv4Addr::UNSPECIFIED,
            &[],
        ));
        assert_eq!(session.state(), DhcpState::Idle);
        assert!(session.lease().is_none());
    }

    #[test]
    fn test_foreign_xid_is_ignored() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let offer = server_reply(
            session.xid() ^ 1,
            2,
            Ipv4Addr::new(10, 0, 0, 7),
            &server_id_option(Ipv4Addr::new(10, 0, 0, 1)),
        );
        assert!(session.process_frame(&offer).is_none());
        assert_eq!(session.state(), DhcpState::Selecting);
    }

    #[test]
    fn test_truncated_option_halts_parse() {
        // Option 54 claims 4 bytes but the region ends after 2
        let options = [0x35, 0x01, 0x02, 54, 4, 192, 168];
        let fields = parse_options(&options);
        assert_eq!(fields.message_type, Some(DhcpMessageType::Offer));
        assert!(fields.server_id.is_none());
    }

    #[test]
    fn test_pad_options_are_skipped() {
        let options = [0, 0, 0, 0x35, 0x01, 0x05, 0, 0xFF];
        let fields = parse_options(&options);
        assert_eq!(fields.message_type, Some(DhcpMessageType::Ack));
    }

    #[test]
    fn test_release_resets_session() {
        let mut session = DhcpSession::new(MAC);
        session.start();

        let server = Ipv4Addr::new(10, 0, 0, 1);
        let offered = Ipv4Addr::new(10, 0, 0, 7);
        session.process_frame(&server_reply(
            session.xid(),
            2,
            offered,
            &server_id_option(server),
        ));
        session.process_frame(&server_reply(session.xid(), 5, offered, &[]));
        assert_eq!(session.state(), DhcpState::Bound);

        let gw_mac = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        let release = session.release(offered, server, gw_mac);
        assert_eq!(session.state(), DhcpState::Idle);

        // Unicast to the server via the gateway, sourced from our lease IP
        assert_eq!(&release[0..6], &gw_mac);
        assert_eq!(&release[26..30], &offered.octets());
        assert_eq!(&release[30..34], &server.octets());
        assert!(release.windows(3).any(|w| w == [0x35, 0x01, 0x07]));
    }

    #[test]
    fn test_lease_predicates_after_elapse() {
        let lease = DhcpLease {
            ip: Ipv4Addr::new(10, 0, 0, 7),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: None,
            dns: Vec::new(),
            server_id: None,
            lease_time: 10,
            renewal_time: 2,
            rebinding_time: 5,
            obtained_at: Instant::now() - Duration::from_secs(3),
        };
        assert!(lease.needs_renewal());
        assert!(!lease.needs_rebinding());
        assert!(!lease.is_expired());
    }

    #[test]
    fn test_ip_header_checksum() {
        // Example header from RFC 1071 style worked examples
        let header: [u8; 20] = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xC0, 0xA8,
            0x00, 0x01, 0xC0, 0xA8, 0x00, 0xC7,
        ];
        let checksum = ip_header_checksum(&header);
        assert_eq!(checksum, 0xB861);
    }
}
