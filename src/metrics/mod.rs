pub mod collector;
pub mod snapshot;

pub use collector::MetricsCollector;
pub use snapshot::MetricsSnapshot;

/// Resident set size in MiB, read from `/proc/self/status`. `None` off Linux.
pub fn resident_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<f64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_vm_rss_in_mib() {
        let status = "Name:\tseo-enricher\nVmPeak:\t  9000 kB\nVmRSS:\t    2048 kB\n";
        assert_eq!(parse_vm_rss(status), Some(2.0));
        assert_eq!(parse_vm_rss("Name:\tx\n"), None);
    }
}
