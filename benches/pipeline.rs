//! Per-packet extractor benchmark in both numeric domains.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowstat::features::{FlowInputs, NetStat, Transport};
use flowstat::stats::Timescales;
use flowstat::Fx;

fn make_flows(n: usize) -> Vec<FlowInputs> {
    (0..n)
        .map(|i| {
            let host = i % 50;
            FlowInputs {
                src_mac: format!("02:00:00:00:00:{:02x}", host),
                dst_mac: "02:00:00:00:00:ff".to_string(),
                src_ip: format!("10.0.0.{}", host),
                dst_ip: format!("10.0.1.{}", i % 7),
                transport: Transport::Ports {
                    src: 40000 + host as u16,
                    dst: 443,
                },
                size: 64.0 + (i % 1400) as f64,
                ts: i as f64 * 0.001,
            }
        })
        .collect()
}

fn bench_netstat_float(c: &mut Criterion) {
    let flows = make_flows(1000);
    c.bench_function("netstat_f64_1000_packets", |b| {
        b.iter(|| {
            let mut ns: NetStat<f64> = NetStat::new(Timescales::default());
            for f in &flows {
                black_box(ns.update_and_get_stats(f).ok());
            }
        })
    });
}

fn bench_netstat_fixed(c: &mut Criterion) {
    let flows = make_flows(1000);
    c.bench_function("netstat_fx_1000_packets", |b| {
        b.iter(|| {
            let mut ns: NetStat<Fx> = NetStat::new(Timescales::default()).with_size_scale(1e-3);
            for f in &flows {
                black_box(ns.update_and_get_stats(f).ok());
            }
        })
    });
}

fn bench_warm_update(c: &mut Criterion) {
    let flows = make_flows(1000);
    let mut ns: NetStat<f64> = NetStat::new(Timescales::default());
    for f in &flows {
        let _ = ns.update_and_get_stats(f);
    }
    let mut out = Vec::with_capacity(ns.vector_size());
    let mut next = flows[0].clone();
    c.bench_function("netstat_f64_warm_single_packet", |b| {
        b.iter(|| {
            next.ts += 0.001;
            out.clear();
            black_box(ns.update_into(&next, &mut out).ok());
        })
    });
}

criterion_group!(benches, bench_netstat_float, bench_netstat_fixed, bench_warm_update);
criterion_main!(benches);
