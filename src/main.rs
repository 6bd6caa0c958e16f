//! flowstat entrypoint: reads parsed packets as ndjson on stdin and writes
//! one feature vector per packet as ndjson on stdout.

use flowstat::{config::ExtractorConfig, logging::StructuredLogger, NetStat, PacketRecord};
use std::io::{BufRead, BufWriter, Write};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("FLOWSTAT_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("flowstat.json"));
    let config = ExtractorConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    let mut netstat: NetStat<f64> = NetStat::from_config(&config)?;
    info!(
        timescales = netstat.timescale_count(),
        width = netstat.vector_size(),
        "flowstat starting"
    );

    let stdin = std::io::stdin();
    let mut out = BufWriter::new(std::io::stdout().lock());
    let (mut packets, mut skipped) = (0u64, 0u64);

    for (lineno, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: PacketRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "malformed packet record");
                skipped += 1;
                continue;
            }
        };
        match netstat.update_and_get_stats(&record.resolve()) {
            Ok(v) => {
                StructuredLogger::emit_json(&v, &mut out)?;
                packets += 1;
            }
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "packet skipped");
                skipped += 1;
            }
        }
    }
    out.flush()?;

    info!(packets, skipped, "flowstat done");
    Ok(())
}
