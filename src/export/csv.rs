use std::borrow::Cow;
use std::io::Write;
use std::time::Duration;

use crate::state::ResultSnapshot;

fn ms(d: Duration) -> String {
    format!("{:.2}", d.as_secs_f64() * 1000.0)
}

/// Export snapshot to CSV format
pub fn export_csv<W: Write>(snapshot: &ResultSnapshot, mut writer: W) -> std::io::Result<()> {
    writeln!(
        writer,
        "hop,ip,hostname,loss_pct,sent,recv,last_ms,avg_ms,min_ms,max_ms,stddev_ms"
    )?;

    for hop in snapshot.path() {
        if hop.sent == 0 {
            continue;
        }

        let ip = hop.addr.map(|ip| ip.to_string()).unwrap_or_else(|| "*".to_string());
        let hostname = hop.hostname.clone().unwrap_or_default();
        let (last, avg, min, max, stddev) = if hop.received > 0 {
            (ms(hop.last_rtt), ms(hop.avg_rtt), ms(hop.min_rtt), ms(hop.max_rtt), ms(hop.stddev))
        } else {
            Default::default()
        };

        writeln!(
            writer,
            "{},{},{},{:.1},{},{},{},{},{},{},{}",
            hop.hop,
            ip,
            quote_field(&hostname),
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

/// Quote a field when it would otherwise split the row
fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MtrResult;
    use std::net::Ipv4Addr;

    #[test]
    fn test_hostname_quoting() {
        assert_eq!(quote_field("core1.example.net"), "core1.example.net");
        assert_eq!(quote_field("a,b"), "\"a,b\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert!(matches!(quote_field("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rows() {
        let result = MtrResult::new("t".to_string(), Ipv4Addr::new(8, 8, 8, 8), 2);
        for hop in result.hops() {
            hop.lock().record_sent();
        }
        result
            .hop(2)
            .unwrap()
            .lock()
            .record_reply(Ipv4Addr::new(8, 8, 8, 8), Duration::from_millis(4));
        for hop in result.hops() {
            hop.lock().finalize();
        }

        let mut out = Vec::new();
        export_csv(&result.snapshot(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,*,,100.0,1,0,,,,,");
        assert_eq!(lines[2], "2,8.8.8.8,,0.0,1,1,4.00,4.00,4.00,4.00,0.00");
    }
}
