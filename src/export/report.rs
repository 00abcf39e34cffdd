use std::io::Write;
use std::time::Duration;

use crate::state::{HopSnapshot, ResultSnapshot};

fn ms(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1000.0)
}

fn host_column(hop: &HopSnapshot) -> String {
    match (&hop.hostname, hop.addr) {
        (Some(name), Some(ip)) => format!("{} ({})", name, ip),
        (_, Some(ip)) => ip.to_string(),
        _ => "???".to_string(),
    }
}

/// Generate a text report similar to mtr --report
///
/// Only hops up to the destination are listed once it has answered.
pub fn generate_report<W: Write>(snapshot: &ResultSnapshot, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "hoptrace report for {} ({})", snapshot.target, snapshot.resolved)?;
    writeln!(
        writer,
        "Started: {}  Cycles: {}  Elapsed: {:.1}s",
        snapshot.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.cycles,
        snapshot.duration.as_secs_f64()
    )?;
    writeln!(writer)?;

    // Header
    writeln!(
        writer,
        "{:>3}  {:<40} {:>6} {:>5} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "#", "Host", "Loss%", "Snt", "Rcv", "Last", "Avg", "Best", "Wrst", "StDev"
    )?;
    writeln!(writer, "{}", "-".repeat(110))?;

    for hop in snapshot.path() {
        if hop.sent == 0 {
            continue;
        }

        let (last, avg, min, max, stddev) = if hop.received > 0 {
            (ms(hop.last_rtt), ms(hop.avg_rtt), ms(hop.min_rtt), ms(hop.max_rtt), ms(hop.stddev))
        } else {
            ("-".into(), "-".into(), "-".into(), "-".into(), "-".into())
        };

        writeln!(
            writer,
            "{:>3}  {:<40} {:>5.1}% {:>5} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8}",
            hop.hop,
            host_column(hop),
            hop.loss_pct,
            hop.sent,
            hop.received,
            last,
            avg,
            min,
            max,
            stddev
        )?;
    }

    Ok(())
}

/// Generate report to string
pub fn generate_report_string(snapshot: &ResultSnapshot) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = generate_report(snapshot, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
