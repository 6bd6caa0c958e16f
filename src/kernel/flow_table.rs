//! Bounded, lock-protected table of fixed-point flow records.

use super::{FX_LAMBDAS, N_INC_STATS};
use crate::config::ExtractorConfig;
use crate::error::{ConfigError, KernelError, NumericError};
use crate::numeric::{Fx, Numeric};
use crate::stats::{decay_and_add, fill_moments, StreamKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{trace, warn};

/// One flow's 1-D accumulator in persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Nanoseconds
    pub last_t: u64,
    pub cf1: [Fx; N_INC_STATS],
    pub cf2: [Fx; N_INC_STATS],
    pub w: [Fx; N_INC_STATS],
    /// Accumulate inter-arrival time instead of the value
    pub temporal: bool,
}

/// Per-timescale statistics read out of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub weight: [f64; N_INC_STATS],
    pub mean: [f64; N_INC_STATS],
    pub var: [f64; N_INC_STATS],
}

impl FlowRecord {
    pub fn new(now: u64, temporal: bool) -> Self {
        Self {
            last_t: now,
            cf1: [Fx::ZERO; N_INC_STATS],
            cf2: [Fx::ZERO; N_INC_STATS],
            w: [Fx::EPSILON; N_INC_STATS],
            temporal,
        }
    }

    fn kind(&self) -> StreamKind {
        if self.temporal {
            StreamKind::Temporal
        } else {
            StreamKind::Value
        }
    }

    /// Decays to `t` and adds `value`. On error, overflow included, the
    /// record is unchanged.
    pub fn update(
        &mut self,
        lambdas: &[Fx; N_INC_STATS],
        value: Fx,
        t: u64,
    ) -> Result<(), NumericError> {
        let dt = Fx::span(self.last_t, t)?;
        let value = self.kind().observed(value, dt);
        let square = value.try_mul(value)?;
        if decay_and_add(
            lambdas,
            dt,
            [&mut self.cf1[..], &mut self.cf2[..], &mut self.w[..]],
            |_| Ok([value, square, Fx::ONE]),
        )? {
            self.last_t = t;
        }
        Ok(())
    }

    /// Rejects state no update sequence could have produced.
    pub fn validate(&self, key: u32, now: u64) -> Result<(), KernelError> {
        let malformed = |reason| KernelError::MalformedRecord { key, reason };
        if self.last_t > now {
            return Err(malformed("clock is ahead of now"));
        }
        if self.w.iter().any(|w| *w <= Fx::ZERO) {
            return Err(malformed("non-positive weight"));
        }
        if self.cf2.iter().any(|s| *s < Fx::ZERO) {
            return Err(malformed("negative square sum"));
        }
        Ok(())
    }

    pub fn stats(&self) -> FlowStats {
        let mut mean = [Fx::ZERO; N_INC_STATS];
        let mut var = [Fx::ZERO; N_INC_STATS];
        let mut std = [Fx::ZERO; N_INC_STATS];
        fill_moments(&self.cf1, &self.cf2, &self.w, &mut mean, &mut var, &mut std);
        FlowStats {
            weight: self.w.map(Fx::to_f64),
            mean: mean.map(Fx::to_f64),
            var: var.map(Fx::to_f64),
        }
    }
}

/// Keyed flow records with a hard entry bound.
///
/// Every lock acquisition is bounded by `lock_timeout`; contention turns
/// into [`KernelError::LockTimeout`] for that packet.
pub struct FlowTable {
    lambdas: [Fx; N_INC_STATS],
    max_entries: usize,
    lock_timeout: Duration,
    records: RwLock<HashMap<u32, Mutex<FlowRecord>>>,
}

impl FlowTable {
    pub fn new(max_entries: usize, lock_timeout: Duration) -> Self {
        Self {
            lambdas: FX_LAMBDAS,
            max_entries,
            lock_timeout,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.timescales.len() != N_INC_STATS {
            return Err(ConfigError::TimescaleCount {
                expected: N_INC_STATS,
                got: config.timescales.len(),
            });
        }
        let mut lambdas = [Fx::ZERO; N_INC_STATS];
        for (dst, &l) in lambdas.iter_mut().zip(&config.timescales) {
            *dst = Fx::from_f64(l);
        }
        Ok(Self {
            lambdas,
            ..Self::new(config.flow_table.max_entries, config.lock_timeout())
        })
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of records. Takes the map lock without a bound.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds one packet into the record for `key`, creating it if the
    /// table has room.
    pub fn insert(&self, key: u32, value: Fx, t: u64, temporal: bool) -> Result<(), KernelError> {
        let timeout = KernelError::LockTimeout { key };
        {
            let map = self.records.try_read_for(self.lock_timeout).ok_or(timeout.clone())?;
            if let Some(rec) = map.get(&key) {
                let mut rec = rec.try_lock_for(self.lock_timeout).ok_or(timeout)?;
                return self.apply(key, &mut rec, value, t);
            }
        }

        let mut map = self.records.try_write_for(self.lock_timeout).ok_or(timeout)?;
        // another writer may have created it in between
        if let Some(rec) = map.get_mut(&key) {
            return self.apply(key, rec.get_mut(), value, t);
        }
        if map.len() >= self.max_entries {
            warn!(key, limit = self.max_entries, "flow table full, packet dropped");
            return Err(KernelError::CapacityExhausted {
                limit: self.max_entries,
            });
        }
        let mut rec = FlowRecord::new(t, temporal);
        self.apply(key, &mut rec, value, t)?;
        map.insert(key, Mutex::new(rec));
        trace!(key, "new flow record");
        Ok(())
    }

    fn apply(&self, key: u32, rec: &mut FlowRecord, value: Fx, t: u64) -> Result<(), KernelError> {
        rec.update(&self.lambdas, value, t).map_err(|e| {
            warn!(key, error = %e, "flow record update rejected");
            KernelError::from(e)
        })
    }

    /// Installs a persisted record after validating it.
    pub fn load(&self, key: u32, record: FlowRecord, now: u64) -> Result<(), KernelError> {
        record.validate(key, now)?;
        let mut map = self
            .records
            .try_write_for(self.lock_timeout)
            .ok_or(KernelError::LockTimeout { key })?;
        if !map.contains_key(&key) && map.len() >= self.max_entries {
            return Err(KernelError::CapacityExhausted {
                limit: self.max_entries,
            });
        }
        map.insert(key, Mutex::new(record));
        Ok(())
    }

    /// Copy of the record for `key`.
    pub fn record(&self, key: u32) -> Result<Option<FlowRecord>, KernelError> {
        let map = self
            .records
            .try_read_for(self.lock_timeout)
            .ok_or(KernelError::LockTimeout { key })?;
        match map.get(&key) {
            Some(rec) => {
                let rec = rec
                    .try_lock_for(self.lock_timeout)
                    .ok_or(KernelError::LockTimeout { key })?;
                Ok(Some(rec.clone()))
            }
            None => Ok(None),
        }
    }

    pub fn snapshot(&self, key: u32) -> Result<Option<FlowStats>, KernelError> {
        Ok(self.record(key)?.map(|r| r.stats()))
    }

    pub fn remove(&self, key: u32) -> Result<Option<FlowRecord>, KernelError> {
        let mut map = self
            .records
            .try_write_for(self.lock_timeout)
            .ok_or(KernelError::LockTimeout { key })?;
        Ok(map.remove(&key).map(Mutex::into_inner))
    }
}
