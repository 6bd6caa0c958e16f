//! Keyed collection of streams and the graph of 2-D accumulators between them.
//!
//! Streams and edges live in two arenas owned by the database. A stream
//! refers to its edges by index and an edge to its endpoints by index, so
//! an edge shared by two streams is stored, updated and dropped exactly
//! once.
//!
//! A stream or edge whose clock is too far behind an update to be decayed
//! (fixed point: Δt above 32767 s, or λ·Δt above 32767, about 6553 s at
//! λ = 5) is evicted when that update is rejected. The rejection is
//! reported for that one call; the next update recreates the state at its
//! own timestamp.

use super::cov::{IncStatCov, Side};
use super::incstat::{IncStat, StreamKind};
use super::Timescales;
use crate::error::{NumericError, Result, StatsError};
use crate::numeric::Numeric;
use std::collections::HashMap;
use tracing::{trace, warn};

pub struct IncStatDB<S: Numeric> {
    name: &'static str,
    lambdas: Timescales<S>,
    max_streams: Option<usize>,
    index: HashMap<String, usize>,
    streams: Vec<IncStat<S>>,
    covs: Vec<IncStatCov<S>>,
}

impl<S: Numeric> IncStatDB<S> {
    pub fn new(name: &'static str, lambdas: Timescales<S>) -> Self {
        Self {
            name,
            lambdas,
            max_streams: None,
            index: HashMap::new(),
            streams: Vec::new(),
            covs: Vec::new(),
        }
    }

    /// Refuse new keys once `limit` streams exist.
    pub fn with_max_streams(mut self, limit: Option<usize>) -> Self {
        self.max_streams = limit;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of 2-D accumulators.
    pub fn cov_count(&self) -> usize {
        self.covs.len()
    }

    pub fn get(&self, key: &str) -> Option<&IncStat<S>> {
        self.index.get(key).map(|&id| &self.streams[id])
    }

    /// The 2-D accumulator between two keys, in either order.
    pub fn cov(&self, key_a: &str, key_b: &str) -> Option<&IncStatCov<S>> {
        let a = *self.index.get(key_a)?;
        let b = *self.index.get(key_b)?;
        self.find_link(a, b).map(|cid| &self.covs[cid])
    }

    fn find_link(&self, a: usize, b: usize) -> Option<usize> {
        self.streams[a]
            .links
            .iter()
            .copied()
            .find(|&cid| self.joins(cid, a, b))
    }

    /// Whether edge `cid` runs between exactly `a` and `b`.
    fn joins(&self, cid: usize, a: usize, b: usize) -> bool {
        let [p, q] = self.covs[cid].endpoints();
        (p == a && q == b) || (p == b && q == a)
    }

    fn admit(&self, new_keys: usize) -> Result<()> {
        match self.max_streams {
            Some(limit) if self.streams.len() + new_keys > limit => {
                warn!(table = self.name, limit, "stream capacity exhausted");
                Err(StatsError::CapacityExhausted {
                    table: self.name,
                    limit,
                })
            }
            _ => Ok(()),
        }
    }

    /// Looks up `key`, creating the stream with its clock at `t` if unseen.
    fn ensure(&mut self, key: &str, t: S::Time, kind: StreamKind) -> usize {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = self.streams.len();
        self.streams
            .push(IncStat::new(key, self.lambdas.clone(), t, kind));
        self.index.insert(key.to_owned(), id);
        trace!(table = self.name, key, "new stream");
        id
    }

    /// Updates the stream for `key` and appends its weight, mean and
    /// variance per timescale.
    pub fn update_get_1d(
        &mut self,
        key: &str,
        t: S::Time,
        value: S,
        kind: StreamKind,
        out: &mut Vec<f64>,
    ) -> Result<usize> {
        if !self.index.contains_key(key) {
            self.admit(1)?;
        }
        let id = self.ensure(key, t, kind);
        if let Err(e) = self.streams[id].insert(value, t) {
            if e.is_time_range() {
                warn!(table = self.name, key, error = %e, "stale stream evicted");
                self.remove(key);
            }
            return Err(e.into());
        }
        Ok(self.streams[id].emit_1d(out))
    }

    /// Propagates an update of `key_a` to every edge touching it, creating
    /// the `key_a`-`key_b` edge if missing, and appends that edge's
    /// radius, magnitude, covariance and correlation.
    ///
    /// Must follow the 1-D insert of `value_a` into `key_a`. A failure on
    /// an edge to some third stream is logged and does not affect the
    /// result for this pair.
    pub fn update_get_2d(
        &mut self,
        key_a: &str,
        key_b: &str,
        t: S::Time,
        value_a: S,
        kind: StreamKind,
        out: &mut Vec<f64>,
    ) -> Result<usize> {
        let missing_a = !self.index.contains_key(key_a);
        let missing_b = key_a != key_b && !self.index.contains_key(key_b);
        self.admit(missing_a as usize + missing_b as usize)?;
        let a = self.ensure(key_a, t, kind);
        let b = self.ensure(key_b, t, kind);

        let mut edge = None;
        let mut pair_err = None;
        let mut stale = Vec::new();
        for k in 0..self.streams[a].links.len() {
            let cid = self.streams[a].links[k];
            let is_pair = self.joins(cid, a, b);
            if let Err(e) = self.update_edge(cid, a, value_a, t) {
                if e.is_time_range() {
                    stale.push(cid);
                }
                if is_pair {
                    pair_err.get_or_insert(e);
                } else {
                    warn!(table = self.name, key = key_a, error = %e, "edge update skipped");
                }
            }
            if is_pair && edge.is_none() {
                edge = Some(cid);
            }
        }

        let result = match pair_err {
            Some(e) => Err(e.into()),
            None => self.emit_pair(edge, a, b, value_a, t, out),
        };
        self.drop_stale_edges(stale);
        result
    }

    fn emit_pair(
        &mut self,
        edge: Option<usize>,
        a: usize,
        b: usize,
        value_a: S,
        t: S::Time,
        out: &mut Vec<f64>,
    ) -> Result<usize> {
        let cid = match edge {
            Some(cid) => cid,
            None => {
                let cid = self.link(a, b, t);
                self.update_edge(cid, a, value_a, t)?;
                cid
            }
        };

        let [p, q] = self.covs[cid].endpoints();
        self.streams[p].refresh();
        self.streams[q].refresh();
        Ok(self.covs[cid].emit_2d(
            self.streams[p].cached_moments(),
            self.streams[q].cached_moments(),
            out,
        ))
    }

    /// 1-D update of `key_a` followed by the 2-D update of the pair.
    pub fn update_get_1d2d(
        &mut self,
        key_a: &str,
        key_b: &str,
        t: S::Time,
        value_a: S,
        kind: StreamKind,
        out: &mut Vec<f64>,
    ) -> Result<usize> {
        let n = self.update_get_1d(key_a, t, value_a, kind, out)?;
        Ok(n + self.update_get_2d(key_a, key_b, t, value_a, kind, out)?)
    }

    fn link(&mut self, a: usize, b: usize, t: S::Time) -> usize {
        let cid = self.covs.len();
        self.covs
            .push(IncStatCov::new(a, b, self.lambdas.clone(), t));
        self.streams[a].links.push(cid);
        if a != b {
            self.streams[b].links.push(cid);
        }
        trace!(
            table = self.name,
            first = self.streams[a].id(),
            second = self.streams[b].id(),
            "new edge"
        );
        cid
    }

    /// Drops the stream for `key` together with every edge touching it.
    ///
    /// Returns whether the key existed. Handles of the streams and edges
    /// moved to fill the gaps are rewritten.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(id) = self.index.remove(key) else {
            return false;
        };
        let mut links = std::mem::take(&mut self.streams[id].links);
        links.sort_unstable_by(|x, y| y.cmp(x));
        for cid in links {
            self.drop_edge(cid);
        }

        let last = self.streams.len() - 1;
        self.streams.swap_remove(id);
        if id != last {
            let moved = &self.streams[id];
            self.index.insert(moved.id().to_owned(), id);
            for &cid in &moved.links {
                self.covs[cid].relabel(last, id);
            }
        }
        trace!(table = self.name, key, "stream removed");
        true
    }

    /// Edges must arrive in descending order so no pending handle moves.
    fn drop_stale_edges(&mut self, mut stale: Vec<usize>) {
        if stale.is_empty() {
            return;
        }
        stale.sort_unstable_by(|x, y| y.cmp(x));
        stale.dedup();
        warn!(table = self.name, count = stale.len(), "stale edges evicted");
        for cid in stale {
            self.drop_edge(cid);
        }
    }

    fn drop_edge(&mut self, cid: usize) {
        for end in self.covs[cid].endpoints() {
            self.streams[end].links.retain(|&c| c != cid);
        }
        let last = self.covs.len() - 1;
        self.covs.swap_remove(cid);
        if cid != last {
            for end in self.covs[cid].endpoints() {
                for link in self.streams[end].links.iter_mut() {
                    if *link == last {
                        *link = cid;
                    }
                }
            }
        }
    }

    fn update_edge(
        &mut self,
        cid: usize,
        origin: usize,
        value: S,
        t: S::Time,
    ) -> std::result::Result<(), NumericError> {
        let [p, q] = self.covs[cid].endpoints();
        self.streams[p].refresh();
        self.streams[q].refresh();
        let side = if p == origin { Side::First } else { Side::Second };
        let cov = &mut self.covs[cid];
        cov.update_cov(
            side,
            value,
            t,
            self.streams[p].cached_moments(),
            self.streams[q].cached_moments(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Fx;

    fn db(lambdas: &[f64]) -> IncStatDB<f64> {
        IncStatDB::new("test", Timescales::new(lambdas.iter().copied()))
    }

    #[test]
    fn creates_stream_on_first_use() {
        let mut d = db(&[1.0]);
        let mut out = vec![];
        assert_eq!(d.update_get_1d("A", 0.0, 10.0, StreamKind::Value, &mut out).unwrap(), 3);
        assert_eq!(d.update_get_1d("A", 0.0, 20.0, StreamKind::Value, &mut out).unwrap(), 3);
        assert_eq!(d.len(), 1);
        assert!((out[3] - 2.0).abs() < 1e-9);
        assert!((out[4] - 15.0).abs() < 1e-9);
        assert!((out[5] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn new_stream_clock_is_seeded_at_first_time() {
        let mut d = db(&[1.0]);
        let mut out = vec![];
        d.update_get_1d("A", 100.0, 1.0, StreamKind::Value, &mut out).unwrap();
        let s = d.get("A").unwrap();
        assert_eq!(s.last_update(), 100.0);
        assert!((s.weight()[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pair_gets_exactly_one_edge() {
        let mut d = db(&[0.0]);
        let mut out = vec![];
        d.update_get_1d2d("h1", "h2", 0.0, 100.0, StreamKind::Value, &mut out).unwrap();
        d.update_get_1d2d("h1", "h2", 5.0, 50.0, StreamKind::Value, &mut out).unwrap();
        assert_eq!(d.cov_count(), 1);
        let cov = d.cov("h1", "h2").unwrap();
        assert!((cov.weight()[0] - 2.0).abs() < 1e-9);
        assert_eq!(d.get("h1").unwrap().link_count(), 1);
        assert_eq!(d.get("h2").unwrap().link_count(), 1);
    }

    #[test]
    fn reverse_direction_reuses_edge() {
        let mut d = db(&[0.0]);
        let mut out = vec![];
        d.update_get_1d2d("h1", "h2", 0.0, 100.0, StreamKind::Value, &mut out).unwrap();
        d.update_get_1d2d("h2", "h1", 1.0, 40.0, StreamKind::Value, &mut out).unwrap();
        assert_eq!(d.cov_count(), 1);
        assert!(d.cov("h2", "h1").is_some());
        assert!((d.cov("h1", "h2").unwrap().weight()[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn update_propagates_to_every_edge_of_origin() {
        let mut d = db(&[0.0]);
        let mut out = vec![];
        d.update_get_1d2d("a", "b", 0.0, 1.0, StreamKind::Value, &mut out).unwrap();
        d.update_get_1d2d("a", "c", 1.0, 1.0, StreamKind::Value, &mut out).unwrap();
        assert_eq!(d.cov_count(), 2);
        // the a-b edge saw both of a's updates
        assert!((d.cov("a", "b").unwrap().weight()[0] - 2.0).abs() < 1e-9);
        assert!((d.cov("a", "c").unwrap().weight()[0] - 1.0).abs() < 1e-9);
        assert!(d.cov("b", "c").is_none());
    }

    #[test]
    fn output_widths() {
        let mut d = db(&[5.0, 3.0, 1.0, 0.1, 0.01]);
        let mut out = vec![];
        let n = d.update_get_1d2d("x", "y", 0.0, 60.0, StreamKind::Value, &mut out).unwrap();
        assert_eq!(n, 35);
        assert_eq!(out.len(), 35);
    }

    #[test]
    fn self_pair_is_linked_once() {
        let mut d = db(&[0.0]);
        let mut out = vec![];
        d.update_get_1d2d("x", "x", 0.0, 1.0, StreamKind::Value, &mut out).unwrap();
        d.update_get_1d2d("x", "x", 1.0, 1.0, StreamKind::Value, &mut out).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.cov_count(), 1);
        assert_eq!(d.get("x").unwrap().link_count(), 1);
    }

    #[test]
    fn capacity_exhaustion_is_reported_and_isolated() {
        let mut d = db(&[1.0]).with_max_streams(Some(2));
        let mut out = vec![];
        d.update_get_1d2d("a", "b", 0.0, 1.0, StreamKind::Value, &mut out).unwrap();
        let before = out.len();
        let err = d
            .update_get_1d("c", 1.0, 1.0, StreamKind::Value, &mut out)
            .unwrap_err();
        assert_eq!(err, StatsError::CapacityExhausted { table: "test", limit: 2 });
        assert_eq!(out.len(), before);
        assert!(d.get("c").is_none());
        // known keys keep working
        d.update_get_1d("a", 1.0, 2.0, StreamKind::Value, &mut out).unwrap();
    }

    #[test]
    fn pair_admission_checks_both_keys_first() {
        let mut d = db(&[1.0]).with_max_streams(Some(2));
        let mut out = vec![];
        d.update_get_1d("a", 0.0, 1.0, StreamKind::Value, &mut out).unwrap();
        assert!(d.update_get_2d("b", "c", 0.0, 1.0, StreamKind::Value, &mut out).is_err());
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn numeric_failure_leaves_other_keys_untouched() {
        let mut d: IncStatDB<Fx> = IncStatDB::new("fx", Timescales::default());
        let mut out = vec![];
        d.update_get_1d("a", 0, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        d.update_get_1d("b", 0, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        let far = 40_000 * 1_000_000_000;
        assert!(d.update_get_1d("a", far, Fx::ONE, StreamKind::Value, &mut out).is_err());
        let b_weight = d.get("b").unwrap().weight().to_vec();
        d.update_get_1d("b", 1_000_000_000, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        assert!(d.get("b").unwrap().weight()[4] > b_weight[4]);
    }

    #[test]
    fn idle_fixed_point_stream_recovers_after_one_rejection() {
        const SEC: u64 = 1_000_000_000;
        let mut d: IncStatDB<Fx> = IncStatDB::new("fx", Timescales::default());
        let mut out = vec![];
        d.update_get_1d2d("a", "b", 0, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        for t in [3_000 * SEC, 6_000 * SEC] {
            d.update_get_1d("b", t, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        }

        // λ = 5 over 7000 s is past the s15.16 exponent range
        let err = d
            .update_get_1d2d("a", "b", 7_000 * SEC, Fx::ONE, StreamKind::Value, &mut out)
            .unwrap_err();
        assert_eq!(err, StatsError::Numeric(NumericError::ExponentOutOfRange));
        assert!(d.get("a").is_none());
        assert_eq!(d.cov_count(), 0);
        assert_eq!(d.get("b").unwrap().link_count(), 0);

        d.update_get_1d2d("a", "b", 7_001 * SEC, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        let a = d.get("a").unwrap();
        assert_eq!(a.last_update(), 7_001 * SEC);
        assert!((a.weight()[0].to_f64() - 1.0).abs() < 1e-3);
        assert_eq!(d.cov_count(), 1);
    }

    #[test]
    fn stale_pair_edge_is_rebuilt_on_next_update() {
        const SEC: u64 = 1_000_000_000;
        let mut d: IncStatDB<Fx> = IncStatDB::new("fx", Timescales::default());
        let mut out = vec![];
        d.update_get_1d2d("a", "b", 0, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        assert!(d
            .update_get_2d("a", "b", 7_000 * SEC, Fx::ONE, StreamKind::Value, &mut out)
            .is_err());
        assert_eq!(d.cov_count(), 0);
        d.update_get_2d("a", "b", 7_000 * SEC, Fx::ONE, StreamKind::Value, &mut out).unwrap();
        assert_eq!(d.cov_count(), 1);
        assert_eq!(d.get("a").unwrap().link_count(), 1);
        assert_eq!(d.get("b").unwrap().link_count(), 1);
    }

    #[test]
    fn remove_rewrites_moved_handles() {
        let mut d = db(&[0.0]);
        let mut out = vec![];
        for (a, b) in [("a", "b"), ("b", "c"), ("c", "d"), ("a", "d")] {
            d.update_get_1d2d(a, b, 0.0, 1.0, StreamKind::Value, &mut out).unwrap();
        }
        assert_eq!(d.cov_count(), 4);
        assert!(d.remove("a"));
        assert!(!d.remove("a"));

        assert_eq!(d.len(), 3);
        assert_eq!(d.cov_count(), 2);
        assert!(d.cov("a", "b").is_none());
        assert_eq!(d.get("d").unwrap().link_count(), 1);
        let links: usize = ["b", "c", "d"]
            .iter()
            .map(|k| d.get(k).unwrap().link_count())
            .sum();
        assert_eq!(links, 2 * d.cov_count());

        // d moved into a's slot and still updates its own edge
        let before = d.cov("c", "d").unwrap().weight()[0];
        d.update_get_1d2d("d", "c", 1.0, 1.0, StreamKind::Value, &mut out).unwrap();
        assert!((d.cov("c", "d").unwrap().weight()[0] - before - 1.0).abs() < 1e-9);
        assert_eq!(d.cov_count(), 2);
        assert_eq!(d.get("d").unwrap().last_update(), 1.0);
    }

    #[test]
    fn dropping_database_releases_shared_edges() {
        let mut d = db(&[1.0]);
        let mut out = vec![];
        for (a, b) in [("a", "b"), ("b", "c"), ("c", "a"), ("a", "b")] {
            d.update_get_1d2d(a, b, 0.0, 1.0, StreamKind::Value, &mut out).unwrap();
        }
        assert_eq!(d.cov_count(), 3);
        let links: usize = ["a", "b", "c"]
            .iter()
            .map(|k| d.get(k).unwrap().link_count())
            .sum();
        // each edge is referenced by exactly its two endpoints
        assert_eq!(links, 2 * d.cov_count());
        drop(d);
    }
}
