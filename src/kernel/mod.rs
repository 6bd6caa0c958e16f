//! Constrained-domain extractor state: fixed-point flow records keyed by
//! hashed flow identity, with a hard entry bound and bounded locking.

mod flow_table;
mod hash;

pub use flow_table::{FlowRecord, FlowStats, FlowTable};
pub use hash::{fasthash32, fasthash64, fold32, hash_mix, FlowHashes, FH_SEED};

use crate::numeric::Fx;

/// Timescales per flow record.
pub const N_INC_STATS: usize = 5;

/// The default timescales (5, 3, 1, 0.1, 0.01) in s15.16.
pub const FX_LAMBDAS: [Fx; N_INC_STATS] = [
    Fx::from_raw(327680),
    Fx::from_raw(196608),
    Fx::from_raw(65536),
    Fx::from_raw(6554),
    Fx::from_raw(655),
];

/// Frame length in megabytes, truncated to the s15.16 grid.
pub fn megabytes(bytes: u32) -> Fx {
    Fx::from_raw(((u64::from(bytes) << 16) / 1_000_000) as i32)
}
