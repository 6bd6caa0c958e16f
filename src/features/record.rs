//! Parsed packet fields, as delivered by the upstream parser, and their
//! reduction to extractor inputs.

use super::{FlowInputs, Transport};
use serde::{Deserialize, Serialize};

/// One parsed packet. Absent protocol layers are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketRecord {
    /// Seconds
    pub ts: f64,
    /// Frame length in bytes
    pub len: u32,
    pub src_mac: String,
    pub dst_mac: String,
    pub ip_src: Option<String>,
    pub ip_dst: Option<String>,
    pub ipv6_src: Option<String>,
    pub ipv6_dst: Option<String>,
    pub tcp_sport: Option<u16>,
    pub tcp_dport: Option<u16>,
    pub udp_sport: Option<u16>,
    pub udp_dport: Option<u16>,
    /// Set for any ICMP / ICMPv6 packet
    pub icmp_type: Option<u8>,
    /// Set for any ARP packet
    pub arp_opcode: Option<u16>,
    pub arp_src_ip: Option<String>,
    pub arp_dst_ip: Option<String>,
}

impl PacketRecord {
    /// Picks the address pair and transport identity the extractor keys on.
    ///
    /// IPv4 wins over IPv6; TCP over UDP over ICMP over ARP. ARP packets
    /// carry their sender/target protocol addresses, and anything else
    /// without an IP layer is keyed by its MAC pair.
    pub fn resolve(&self) -> FlowInputs {
        let (mut src_ip, mut dst_ip) = match (&self.ip_src, &self.ip_dst) {
            (Some(s), Some(d)) => (s.clone(), d.clone()),
            _ => (
                self.ipv6_src.clone().unwrap_or_default(),
                self.ipv6_dst.clone().unwrap_or_default(),
            ),
        };

        let transport = if let (Some(src), Some(dst)) = (self.tcp_sport, self.tcp_dport) {
            Transport::Ports { src, dst }
        } else if let (Some(src), Some(dst)) = (self.udp_sport, self.udp_dport) {
            Transport::Ports { src, dst }
        } else if self.icmp_type.is_some() {
            Transport::Icmp
        } else if self.arp_opcode.is_some() {
            src_ip = self.arp_src_ip.clone().unwrap_or_default();
            dst_ip = self.arp_dst_ip.clone().unwrap_or_default();
            Transport::Arp
        } else {
            src_ip = self.src_mac.clone();
            dst_ip = self.dst_mac.clone();
            Transport::Other
        };

        FlowInputs {
            src_mac: self.src_mac.clone(),
            dst_mac: self.dst_mac.clone(),
            src_ip,
            dst_ip,
            transport,
            size: f64::from(self.len),
            ts: self.ts,
        }
    }
}
