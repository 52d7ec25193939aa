//! Cumulative interface byte counters from /proc/net/dev.

use std::path::PathBuf;

use super::{ProbeError, ThroughputReader};

/// Reads rx/tx byte totals across all non-loopback interfaces.
pub struct ProcNetDevReader {
    path: PathBuf,
}

impl ProcNetDevReader {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/proc/net/dev"),
        }
    }

    #[cfg(test)]
    fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Default for ProcNetDevReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputReader for ProcNetDevReader {
    fn read(&self) -> Result<(u64, u64), ProbeError> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(parse_proc_net_dev(&contents))
    }
}

/// Sum rx/tx bytes over all interfaces except loopback.
///
/// Line format after the two header lines:
/// `  eth0: rx_bytes rx_packets ... (8 fields) tx_bytes tx_packets ...`
fn parse_proc_net_dev(contents: &str) -> (u64, u64) {
    let mut rx_total = 0u64;
    let mut tx_total = 0u64;

    for line in contents.lines().skip(2) {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        if name.trim() == "lo" {
            continue;
        }

        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        if let (Ok(rx), Ok(tx)) = (fields[0].parse::<u64>(), fields[8].parse::<u64>()) {
            rx_total += rx;
            tx_total += tx;
        }
    }

    (rx_total, tx_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PROC_NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  999999    1000    0    0    0     0          0         0   999999    1000    0    0    0     0       0          0
  eth0: 1000000    5000    0    0    0     0          0         0  2000000    4000    0    0    0     0       0          0
 wlan0:  500000    2500    0    0    0     0          0         0   250000    2000    0    0    0     0       0          0
";

    #[test]
    fn test_parse_sums_non_loopback() {
        let (rx, tx) = parse_proc_net_dev(PROC_NET_DEV);
        assert_eq!(rx, 1_500_000);
        assert_eq!(tx, 2_250_000);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_proc_net_dev(""), (0, 0));
    }

    #[test]
    fn test_reader_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(PROC_NET_DEV.as_bytes()).unwrap();

        let reader = ProcNetDevReader::with_path(tmp.path().to_path_buf());
        let (rx, tx) = reader.read().unwrap();
        assert_eq!(rx, 1_500_000);
        assert_eq!(tx, 2_250_000);
    }
}
