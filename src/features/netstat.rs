//! Composite extractor: four stream databases keyed by different flow
//! granularities, concatenated into one vector per packet.

use super::FeatureVector;
use crate::config::ExtractorConfig;
use crate::error::{ConfigError, Result, StatsError};
use crate::numeric::Numeric;
use crate::stats::{IncStatDB, StreamKind, Timescales};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Transport identity used by the socket-level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    Ports { src: u16, dst: u16 },
    Icmp,
    /// Address resolution; the socket table falls back to the MAC pair
    Arp,
    Other,
}

impl Transport {
    /// Suffixes appended to the source and destination address.
    fn markers(&self) -> (String, String) {
        match self {
            Transport::Ports { src, dst } => (src.to_string(), dst.to_string()),
            Transport::Icmp => ("icmp".into(), "icmp".into()),
            Transport::Arp => ("arp".into(), "arp".into()),
            Transport::Other => (String::new(), String::new()),
        }
    }
}

/// Per-packet input to [`NetStat`], as produced by the packet parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInputs {
    pub src_mac: String,
    pub dst_mac: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub transport: Transport,
    /// Frame length in bytes
    pub size: f64,
    /// Seconds
    pub ts: f64,
}

/// Table widths in units of the timescale count, in output order.
const LAYOUT: [(&str, usize); 4] = [("mac_ip", 3), ("host", 7), ("jitter", 3), ("socket", 7)];

pub struct NetStat<S: Numeric> {
    lambdas: Timescales<S>,
    size_scale: f64,
    /// Source MAC+IP association and bandwidth
    mac_ip: IncStatDB<S>,
    /// Host send bandwidth and host-pair relationship
    host: IncStatDB<S>,
    /// Host-pair inter-arrival times
    jitter: IncStatDB<S>,
    /// Socket-level bandwidth and relationship
    socket: IncStatDB<S>,
}

impl<S: Numeric> NetStat<S> {
    pub fn new(lambdas: Timescales<S>) -> Self {
        Self {
            mac_ip: IncStatDB::new(LAYOUT[0].0, lambdas.clone()),
            host: IncStatDB::new(LAYOUT[1].0, lambdas.clone()),
            jitter: IncStatDB::new(LAYOUT[2].0, lambdas.clone()),
            socket: IncStatDB::new(LAYOUT[3].0, lambdas.clone()),
            size_scale: 1.0,
            lambdas,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(Timescales::new(config.timescales.iter().copied()))
            .with_max_streams(config.max_streams)
            .with_size_scale(config.size_scale))
    }

    /// Bounds every table to `limit` streams.
    pub fn with_max_streams(mut self, limit: Option<usize>) -> Self {
        self.mac_ip = self.mac_ip.with_max_streams(limit);
        self.host = self.host.with_max_streams(limit);
        self.jitter = self.jitter.with_max_streams(limit);
        self.socket = self.socket.with_max_streams(limit);
        self
    }

    /// Packet sizes are multiplied by `scale` before accumulation. The
    /// fixed-point domain needs sizes well below 2^15 once squared, so
    /// scale bytes down to kilobytes or megabytes there.
    pub fn with_size_scale(mut self, scale: f64) -> Self {
        self.size_scale = scale;
        self
    }

    pub fn timescale_count(&self) -> usize {
        self.lambdas.len()
    }

    /// Width of every output vector.
    pub fn vector_size(&self) -> usize {
        LAYOUT.iter().map(|(_, w)| w).sum::<usize>() * self.timescale_count()
    }

    pub fn mac_ip(&self) -> &IncStatDB<S> {
        &self.mac_ip
    }

    pub fn host(&self) -> &IncStatDB<S> {
        &self.host
    }

    pub fn jitter(&self) -> &IncStatDB<S> {
        &self.jitter
    }

    pub fn socket(&self) -> &IncStatDB<S> {
        &self.socket
    }

    /// Updates all four tables and returns the concatenated vector.
    ///
    /// A failing table does not stop the others; its error is returned
    /// after every table has seen the packet.
    pub fn update_and_get_stats(&mut self, flow: &FlowInputs) -> Result<FeatureVector> {
        let mut values = Vec::with_capacity(self.vector_size());
        self.update_into(flow, &mut values)?;
        Ok(FeatureVector {
            dim: values.len(),
            values,
            ts: flow.ts,
        })
    }

    /// Appends exactly [`vector_size`](Self::vector_size) values to `out`.
    ///
    /// The slot of a table that failed is zero-filled so the layout stays
    /// fixed; the first such failure is returned.
    pub fn update_into(&mut self, flow: &FlowInputs, out: &mut Vec<f64>) -> Result<()> {
        let t = S::time_from_secs(flow.ts);
        let size = S::from_f64(flow.size * self.size_scale);
        let n = self.timescale_count();
        let mut first_err: Option<StatsError> = None;

        let mut record = |table: usize, start: usize, res: Result<usize>, out: &mut Vec<f64>| {
            if let Err(e) = res {
                let (name, width) = LAYOUT[table];
                warn!(table = name, error = %e, "packet dropped from table");
                out.truncate(start);
                out.resize(start + width * n, 0.0);
                first_err.get_or_insert(e);
            }
        };

        let start = out.len();
        let mac_ip_key = format!("{}{}", flow.src_mac, flow.src_ip);
        let res = self.mac_ip.update_get_1d(&mac_ip_key, t, size, StreamKind::Value, out);
        record(0, start, res, out);

        let start = out.len();
        let res = self
            .host
            .update_get_1d2d(&flow.src_ip, &flow.dst_ip, t, size, StreamKind::Value, out);
        record(1, start, res, out);

        let start = out.len();
        let jitter_key = format!("{}{}", flow.src_ip, flow.dst_ip);
        let res = self
            .jitter
            .update_get_1d(&jitter_key, t, S::ZERO, StreamKind::Temporal, out);
        record(2, start, res, out);

        let start = out.len();
        let res = match &flow.transport {
            Transport::Arp => self.socket.update_get_1d2d(
                &flow.src_mac,
                &flow.dst_mac,
                t,
                size,
                StreamKind::Value,
                out,
            ),
            transport => {
                let (src_port, dst_port) = transport.markers();
                let src = format!("{}{}", flow.src_ip, src_port);
                let dst = format!("{}{}", flow.dst_ip, dst_port);
                self.socket
                    .update_get_1d2d(&src, &dst, t, size, StreamKind::Value, out)
            }
        };
        record(3, start, res, out);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
