//! Per-packet feature extraction over damped flow statistics.

mod netstat;
mod record;

pub use netstat::{FlowInputs, NetStat, Transport};
pub use record::PacketRecord;

use serde::{Deserialize, Serialize};

/// Fixed-size feature vector for the anomaly scorer (20 values per timescale)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dim: usize,
    pub values: Vec<f64>,
    /// Packet timestamp, seconds
    pub ts: f64,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.dim.min(self.values.len())]
    }
}
