//! L2↔L3 protocol translator.
//!
//! Bidirectional conversion between Layer 2 (Ethernet frames) and Layer 3
//! (IP packets), for using TUN devices (L3) with transports that expect
//! TAP devices (L2).
//!
//! Responsibilities:
//! - Convert IP packets → Ethernet frames for the L2 transport
//! - Convert Ethernet frames → IP packets for the TUN device
//! - Learn our IP from egress traffic, the gateway MAC from ingress
//! - Answer ARP requests for our address, queueing the replies
//! - Drive an initiating DHCP conversation over the same channel

use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::arp::{self, ArpOperation};
use crate::dhcp::{self, DhcpSession, DhcpState};
use crate::error::{Error, Result};
use crate::ethernet::{self, EtherType, BROADCAST_MAC, HEADER_SIZE};

/// Upper bound on queued ARP replies.
pub const MAX_ARP_QUEUE: usize = 10;

/// Configuration options for the translator.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Our MAC address. Must be unicast; locally administered recommended.
    pub our_mac: [u8; 6],
    /// Learn our IP from the source of outgoing packets.
    pub learn_ip: bool,
    /// Learn the gateway MAC from the source of incoming packets.
    pub learn_gateway_mac: bool,
    /// Consume ingress ARP internally instead of exposing it.
    pub handle_arp: bool,
    /// Reserved for ARP cache aging; unused by the current logic.
    pub arp_timeout_ms: u64,
    /// Verbose per-packet logging.
    pub verbose: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            our_mac: [0x5E, 0x00, 0x53, 0x01, 0x02, 0x03],
            learn_ip: true,
            learn_gateway_mac: true,
            handle_arp: true,
            arp_timeout_ms: 0,
            verbose: false,
        }
    }
}

/// Counters for the translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslatorStats {
    pub l2_to_l3: u64,
    pub l3_to_l2: u64,
    pub arp_handled: u64,
    pub arp_learned: u64,
}

/// L2/L3 protocol translator.
///
/// Single-threaded and I/O-free: every operation is a pure transformation
/// over the supplied buffer plus internal state, and completes before it
/// returns. Frames handed out are exclusively owned by the caller.
pub struct Translator {
    config: TranslatorConfig,

    // Learned network information
    our_ip: Option<Ipv4Addr>,
    gateway_ip: Option<Ipv4Addr>,
    gateway_mac: Option<[u8; 6]>,
    started_at: Instant,
    last_gateway_learn: Option<u64>,

    // ARP reply queue with its deduplication keys (the ARP target IPs of
    // the queued frames)
    arp_reply_queue: VecDeque<Bytes>,
    pending_arp_ips: HashSet<Ipv4Addr>,

    // DHCP conversation
    dhcp: DhcpSession,
    dhcp_queue: VecDeque<Bytes>,

    // Statistics
    packets_translated_l2_to_l3: u64,
    packets_translated_l3_to_l2: u64,
    arp_requests_handled: u64,
    arp_replies_learned: u64,
}

impl Translator {
    /// Create a new translator.
    ///
    /// Fails with [`Error::InvalidMac`] if the configured MAC is not a
    /// usable unicast address.
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        if !ethernet::is_unicast(&config.our_mac) {
            return Err(Error::InvalidMac);
        }

        let our_mac = config.our_mac;
        Ok(Self {
            config,
            our_ip: None,
            gateway_ip: None,
            gateway_mac: None,
            started_at: Instant::now(),
            last_gateway_learn: None,
            arp_reply_queue: VecDeque::new(),
            pending_arp_ips: HashSet::new(),
            dhcp: DhcpSession::new(our_mac),
            dhcp_queue: VecDeque::new(),
            packets_translated_l2_to_l3: 0,
            packets_translated_l3_to_l2: 0,
            arp_requests_handled: 0,
            arp_replies_learned: 0,
        })
    }

    /// Manually set our IP address (e.g. from external configuration).
    pub fn set_our_ip(&mut self, ip: Ipv4Addr) {
        debug!(%ip, "setting our IP");
        self.our_ip = Some(ip);
    }

    /// Set the gateway IP address the ingress learner compares against.
    pub fn set_gateway_ip(&mut self, ip: Ipv4Addr) {
        debug!(%ip, "setting gateway IP");
        self.gateway_ip = Some(ip);
    }

    /// Our IP address, learned or assigned.
    pub fn learned_ip(&self) -> Option<Ipv4Addr> {
        self.our_ip
    }

    /// The learned gateway MAC address.
    pub fn gateway_mac(&self) -> Option<[u8; 6]> {
        self.gateway_mac
    }

    /// Gateway IP and MAC together, once both are known.
    pub fn gateway_info(&self) -> Option<(Ipv4Addr, [u8; 6])> {
        match (self.gateway_ip, self.gateway_mac) {
            (Some(ip), Some(mac)) => Some((ip, mac)),
            _ => None,
        }
    }

    /// Milliseconds since construction at which the gateway MAC last
    /// changed.
    pub fn last_gateway_learn_ms(&self) -> Option<u64> {
        self.last_gateway_learn
    }

    /// Counters.
    pub fn stats(&self) -> TranslatorStats {
        TranslatorStats {
            l2_to_l3: self.packets_translated_l2_to_l3,
            l3_to_l2: self.packets_translated_l3_to_l2,
            arp_handled: self.arp_requests_handled,
            arp_learned: self.arp_replies_learned,
        }
    }

    /// Convert an IP packet (L3) into an Ethernet frame (L2).
    ///
    /// IPv4 frames are addressed to the learned gateway MAC, broadcast
    /// until one is known. IPv6 is always broadcast (no neighbor
    /// discovery here). The payload is carried verbatim.
    pub fn ip_to_ethernet(&mut self, ip_packet: &[u8]) -> Result<Bytes> {
        if ip_packet.is_empty() {
            return Err(Error::invalid_packet("empty IP packet"));
        }

        let version = ip_packet[0] >> 4;
        let (ethertype, dest_mac) = match version {
            4 => {
                self.learn_our_ip(ip_packet);
                (EtherType::Ipv4, self.gateway_mac.unwrap_or(BROADCAST_MAC))
            }
            6 => (EtherType::Ipv6, BROADCAST_MAC),
            v => {
                return Err(Error::invalid_packet(format!("invalid IP version: {}", v)));
            }
        };

        let mut frame = Vec::with_capacity(HEADER_SIZE + ip_packet.len());
        frame.extend_from_slice(&dest_mac);
        frame.extend_from_slice(&self.config.our_mac);
        frame.extend_from_slice(&(ethertype as u16).to_be_bytes());
        frame.extend_from_slice(ip_packet);

        self.packets_translated_l3_to_l2 = self.packets_translated_l3_to_l2.saturating_add(1);

        if self.config.verbose {
            trace!(
                ip_len = ip_packet.len(),
                frame_len = frame.len(),
                ethertype = %format_args!("{:04x}", ethertype as u16),
                "L3→L2"
            );
        }

        Ok(Bytes::from(frame))
    }

    /// Convert an Ethernet frame (L2) into an IP packet (L3).
    ///
    /// Returns `Ok(Some(packet))` for IPv4/IPv6 payloads, `Ok(None)` when
    /// the frame was consumed internally (ARP) or carries an EtherType we
    /// do not forward.
    pub fn ethernet_to_ip(&mut self, frame: &[u8]) -> Result<Option<Bytes>> {
        if frame.len() < HEADER_SIZE {
            return Err(Error::invalid_packet(format!(
                "Ethernet frame too short: {} bytes",
                frame.len()
            )));
        }

        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        let payload = &frame[14..];

        match EtherType::from_u16(ethertype) {
            Some(EtherType::Arp) => {
                if self.config.handle_arp {
                    self.handle_arp_frame(frame);
                }
                Ok(None)
            }
            Some(EtherType::Ipv4) => {
                self.learn_gateway_from_ingress(frame, payload);
                self.offer_to_dhcp(frame);

                self.packets_translated_l2_to_l3 =
                    self.packets_translated_l2_to_l3.saturating_add(1);

                if self.config.verbose {
                    trace!(frame_len = frame.len(), ip_len = payload.len(), "L2→L3 IPv4");
                }

                Ok(Some(Bytes::copy_from_slice(payload)))
            }
            Some(EtherType::Ipv6) => {
                self.packets_translated_l2_to_l3 =
                    self.packets_translated_l2_to_l3.saturating_add(1);

                if self.config.verbose {
                    trace!(frame_len = frame.len(), ip_len = payload.len(), "L2→L3 IPv6");
                }

                Ok(Some(Bytes::copy_from_slice(payload)))
            }
            None => {
                trace!(
                    ethertype = %format_args!("{:04x}", ethertype),
                    "ignoring unknown EtherType"
                );
                Ok(None)
            }
        }
    }

    /// Begin (or restart) a DHCP conversation; the DISCOVER frame lands
    /// on the DHCP queue.
    pub fn start_dhcp(&mut self) {
        let discover = self.dhcp.start();
        self.dhcp_queue.push_back(discover);
    }

    /// Release the current lease.
    ///
    /// When bound and the server is known, a unicast RELEASE frame is
    /// queued (via the learned gateway MAC, broadcast as a fallback). The
    /// session returns to idle either way. A learned IP survives release.
    pub fn release_dhcp(&mut self) {
        let server = self.dhcp.lease().and_then(|lease| lease.server_id);
        if self.dhcp.state() == DhcpState::Bound {
            if let (Some(ip), Some(server)) = (self.our_ip, server) {
                let dest = self.gateway_mac.unwrap_or(BROADCAST_MAC);
                let release = self.dhcp.release(ip, server, dest);
                self.dhcp_queue.push_back(release);
                return;
            }
        }
        self.dhcp.reset();
    }

    /// Current DHCP conversation state.
    pub fn dhcp_state(&self) -> DhcpState {
        self.dhcp.state()
    }

    /// The lease from the most recent ACK, if any.
    pub fn dhcp_lease(&self) -> Option<&dhcp::DhcpLease> {
        self.dhcp.lease()
    }

    /// Check if there are queued ARP replies.
    pub fn has_pending_arp_reply(&self) -> bool {
        !self.arp_reply_queue.is_empty()
    }

    /// Check if there are queued DHCP frames.
    pub fn has_pending_dhcp(&self) -> bool {
        !self.dhcp_queue.is_empty()
    }

    /// Take the next queued ARP reply, oldest first.
    pub fn pop_arp_reply(&mut self) -> Option<Bytes> {
        let frame = self.arp_reply_queue.pop_front()?;
        if let Some(ip) = arp::reply_target_ip(&frame) {
            self.pending_arp_ips.remove(&ip);
        }
        Some(frame)
    }

    /// Take the next queued DHCP frame, oldest first.
    pub fn pop_dhcp_packet(&mut self) -> Option<Bytes> {
        self.dhcp_queue.pop_front()
    }

    /// A broadcast ARP request for the gateway, once both addresses are
    /// known. The caller transmits it; any reply flows back through
    /// [`Self::ethernet_to_ip`].
    pub fn gateway_arp_request(&self) -> Option<Bytes> {
        let our_ip = self.our_ip?;
        let gateway_ip = self.gateway_ip?;
        Some(arp::build_request(self.config.our_mac, our_ip, gateway_ip))
    }

    /// A gratuitous ARP announcing our address, once known.
    pub fn gratuitous_arp(&self) -> Option<Bytes> {
        let our_ip = self.our_ip?;
        Some(arp::build_gratuitous(self.config.our_mac, our_ip))
    }

    /// Learn our IP from an egress IPv4 source address. First packet
    /// wins; link-local sources are ignored.
    fn learn_our_ip(&mut self, ip_packet: &[u8]) {
        if !self.config.learn_ip || self.our_ip.is_some() {
            return;
        }
        if ip_packet.len() < 20 {
            return;
        }

        let src_ip = Ipv4Addr::new(ip_packet[12], ip_packet[13], ip_packet[14], ip_packet[15]);
        if src_ip.is_link_local() {
            return;
        }

        self.our_ip = Some(src_ip);
        info!(ip = %src_ip, "learned our IP from egress traffic");
    }

    /// Learn the gateway MAC from the Ethernet source of any ingress IPv4
    /// packet whose source IP is the gateway. Peers that never answer ARP
    /// still reveal their MAC this way.
    fn learn_gateway_from_ingress(&mut self, frame: &[u8], payload: &[u8]) {
        if !self.config.learn_gateway_mac {
            return;
        }
        let Some(gateway_ip) = self.gateway_ip else {
            return;
        };
        if payload.len() < 20 {
            return;
        }

        let src_ip = Ipv4Addr::new(payload[12], payload[13], payload[14], payload[15]);
        if src_ip != gateway_ip {
            return;
        }

        let src_mac: [u8; 6] = match frame[6..12].try_into() {
            Ok(mac) => mac,
            Err(_) => return,
        };
        if self.gateway_mac == Some(src_mac) {
            return;
        }

        self.gateway_mac = Some(src_mac);
        self.last_gateway_learn = Some(self.uptime_ms());
        info!(
            mac = %ethernet::format_mac(&src_mac),
            ip = %src_ip,
            "learned gateway MAC from ingress traffic"
        );
    }

    /// Feed a DHCP server reply to the session while a conversation is in
    /// progress; a produced REQUEST lands on the DHCP queue, and an ACK
    /// adopts the leased address and router.
    fn offer_to_dhcp(&mut self, frame: &[u8]) {
        if !matches!(
            self.dhcp.state(),
            DhcpState::Selecting | DhcpState::Requesting
        ) {
            return;
        }

        if let Some(out) = self.dhcp.process_frame(frame) {
            self.dhcp_queue.push_back(out);
        }

        if self.dhcp.state() == DhcpState::Bound {
            if let Some(lease) = self.dhcp.lease() {
                self.our_ip = Some(lease.ip);
                if let Some(gateway) = lease.gateway {
                    self.gateway_ip = Some(gateway);
                }
            }
        }
    }

    /// Handle an ingress ARP frame. Malformed ARP and unknown opcodes are
    /// dropped without side effects.
    fn handle_arp_frame(&mut self, frame: &[u8]) {
        let Some(fields) = arp::parse(frame) else {
            return;
        };

        match ArpOperation::try_from(fields.operation) {
            Ok(ArpOperation::Request) => {
                let Some(our_ip) = self.our_ip else {
                    return;
                };
                if fields.target_ip != our_ip {
                    return;
                }

                self.arp_requests_handled = self.arp_requests_handled.saturating_add(1);

                if self.config.verbose {
                    debug!(
                        asker = %fields.sender_ip,
                        target = %fields.target_ip,
                        "answering ARP request"
                    );
                }

                let reply = arp::build_reply(
                    self.config.our_mac,
                    our_ip,
                    fields.sender_mac,
                    fields.sender_ip,
                );
                self.enqueue_arp_reply(reply, fields.sender_ip);
            }
            Ok(ArpOperation::Reply) => {
                if self.gateway_ip != Some(fields.sender_ip) {
                    return;
                }

                self.arp_replies_learned = self.arp_replies_learned.saturating_add(1);

                if self.gateway_mac != Some(fields.sender_mac) {
                    self.gateway_mac = Some(fields.sender_mac);
                    self.last_gateway_learn = Some(self.uptime_ms());
                    info!(
                        mac = %ethernet::format_mac(&fields.sender_mac),
                        "learned gateway MAC from ARP reply"
                    );
                }
            }
            Err(_) => {
                trace!(operation = fields.operation, "ignoring unknown ARP operation");
            }
        }
    }

    /// Queue a composed reply unless one for the same target is already
    /// waiting or the queue is at capacity.
    fn enqueue_arp_reply(&mut self, reply: Bytes, target_ip: Ipv4Addr) {
        if self.pending_arp_ips.contains(&target_ip) {
            debug!(%target_ip, "ARP reply already queued, dropping duplicate");
            return;
        }
        if self.arp_reply_queue.len() >= MAX_ARP_QUEUE {
            warn!("ARP reply queue full, dropping reply");
            return;
        }

        self.arp_reply_queue.push_back(reply);
        self.pending_arp_ips.insert(target_ip);
    }

    fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
