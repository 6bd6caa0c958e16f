//! Flow key hashing for the flow table.

use std::net::IpAddr;

/// Seed shared by every flow key hash.
pub const FH_SEED: u64 = 0x2d31e867;

const M: u64 = 0x880355f21e6d1965;

fn compress(mut h: u64) -> u64 {
    h ^= h >> 23;
    h = h.wrapping_mul(0x2127599bf4325c37);
    h ^= h >> 47;
    h
}

/// fasthash64 over `buf`, reading 8-byte little-endian words.
pub fn fasthash64(buf: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (buf.len() as u64).wrapping_mul(M);
    let mut words = buf.chunks_exact(8);
    for chunk in &mut words {
        let mut w = [0u8; 8];
        w.copy_from_slice(chunk);
        h ^= compress(u64::from_le_bytes(w));
        h = h.wrapping_mul(M);
    }
    let tail = words.remainder();
    if !tail.is_empty() {
        let mut w = [0u8; 8];
        w[..tail.len()].copy_from_slice(tail);
        h ^= compress(u64::from_le_bytes(w));
        h = h.wrapping_mul(M);
    }
    compress(h)
}

/// Folds a 64-bit hash to 32 bits keeping both halves.
pub fn fold32(h: u64) -> u32 {
    h.wrapping_sub(h >> 32) as u32
}

pub fn fasthash32(buf: &[u8], seed: u32) -> u32 {
    fold32(fasthash64(buf, u64::from(seed)))
}

/// Order-dependent combination of two hashes.
pub fn hash_mix(a: u64, b: u64) -> u64 {
    a ^ b
        .wrapping_add(0x9e3779b97f4a7c15)
        .wrapping_add(a << 6)
        .wrapping_add(a >> 2)
}

fn ip_hash(ip: &IpAddr) -> u64 {
    match ip {
        IpAddr::V4(v4) => fasthash64(&v4.octets(), FH_SEED),
        IpAddr::V6(v6) => fasthash64(&v6.octets(), FH_SEED),
    }
}

/// The four 32-bit table keys derived from one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowHashes {
    pub src_ip: u32,
    pub src_mac_ip: u32,
    pub src_ip_dst_ip: u32,
    /// Source and destination address and port
    pub full: u32,
}

impl FlowHashes {
    pub fn compute(
        src_mac: &[u8; 6],
        src_ip: &IpAddr,
        dst_ip: &IpAddr,
        src_port: u16,
        dst_port: u16,
    ) -> Self {
        let mac = fasthash64(src_mac, FH_SEED);
        let sport = fasthash64(&src_port.to_le_bytes(), FH_SEED);
        let dport = fasthash64(&dst_port.to_le_bytes(), FH_SEED);

        let h_src = hash_mix(0, ip_hash(src_ip));
        let h_mac = hash_mix(h_src, mac);
        let h_pair = hash_mix(h_src, ip_hash(dst_ip));
        let h_full = hash_mix(hash_mix(h_pair, sport), dport);

        Self {
            src_ip: fold32(h_src),
            src_mac_ip: fold32(h_mac),
            src_ip_dst_ip: fold32(h_pair),
            full: fold32(h_full),
        }
    }
}
