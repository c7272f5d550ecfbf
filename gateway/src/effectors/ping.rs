//! Platform ping effector: spawns the system `ping`, parses packet loss and
//! latency out of its output, and decides reachability from the exit status
//! combined with the parsed statistics.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;

const PING_COUNT: u32 = 4;
const SNIPPET_LIMIT: usize = 500;

static HOSTNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,253}$").expect("hostname pattern"));

// Locale-independent: a decimal straight after `time=` (Linux, macOS, and
// Windows outputs all carry it in that shape).
static LATENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=([0-9]+(?:\.[0-9]+)?)").expect("latency pattern"));

static PACKET_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)%\s*(?:packet\s+)?loss").expect("loss pattern"));

/// Argument gate, checked before any subprocess is spawned.
pub fn hostname_is_valid(hostname: &str) -> bool {
    HOSTNAME.is_match(hostname)
}

#[derive(Debug)]
pub struct PingOutcome {
    pub host: String,
    pub reachable: bool,
    pub avg_latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub raw_snippet: String,
}

impl PingOutcome {
    pub fn into_value(self) -> Value {
        json!({
            "host": self.host,
            "reachable": self.reachable,
            "avg_latency_ms": self.avg_latency_ms,
            "packet_loss_pct": self.packet_loss_pct,
            "raw_snippet": self.raw_snippet,
        })
    }
}

/// Run the system ping. The caller enforces the deadline; hostname validity
/// is the validator's job and is asserted here as a last line of defense.
pub async fn ping(hostname: &str) -> Result<PingOutcome, String> {
    if !hostname_is_valid(hostname) {
        return Err(format!("invalid hostname '{hostname}'"));
    }

    let count_flag = if cfg!(windows) { "-n" } else { "-c" };
    let output = Command::new("ping")
        .arg(count_flag)
        .arg(PING_COUNT.to_string())
        .arg(hostname)
        .output()
        .await
        .map_err(|err| format!("failed to spawn ping: {err}"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        text.push('\n');
        text.push_str(stderr.trim());
    }

    Ok(parse_output(hostname, output.status.success(), &text))
}

fn parse_output(hostname: &str, exit_ok: bool, output: &str) -> PingOutcome {
    let packet_loss_pct = PACKET_LOSS
        .captures(output)
        .and_then(|caps| caps[1].parse::<f64>().ok());

    // Exit status and statistics must agree: a zero exit with total loss is
    // still unreachable, and a parse miss falls back to the exit status.
    let reachable = exit_ok && packet_loss_pct.map(|loss| loss < 100.0).unwrap_or(true);

    let latencies: Vec<f64> = LATENCY
        .captures_iter(output)
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .collect();
    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    };

    let raw_snippet = if output.len() > SNIPPET_LIMIT {
        let mut end = SNIPPET_LIMIT;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        output[..end].to_string()
    } else {
        output.to_string()
    };

    PingOutcome {
        host: hostname.to_string(),
        reachable,
        avg_latency_ms,
        packet_loss_pct,
        raw_snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_OK: &str = "\
PING example.com (93.184.216.34) 56(84) bytes of data.
64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.8 ms
64 bytes from 93.184.216.34: icmp_seq=2 ttl=56 time=12.2 ms
64 bytes from 93.184.216.34: icmp_seq=3 ttl=56 time=11.6 ms
64 bytes from 93.184.216.34: icmp_seq=4 ttl=56 time=12.4 ms

--- example.com ping statistics ---
4 packets transmitted, 4 received, 0% packet loss, time 3004ms
rtt min/avg/max/mdev = 11.642/12.012/12.431/0.311 ms";

    const LINUX_PARTIAL_LOSS: &str = "\
--- flaky.example ping statistics ---
4 packets transmitted, 2 received, 50% packet loss, time 3012ms
64 bytes from 10.0.0.9: icmp_seq=1 ttl=64 time=3.1 ms
64 bytes from 10.0.0.9: icmp_seq=3 ttl=64 time=2.9 ms";

    const WINDOWS_OK: &str = "\
Pinging example.com [93.184.216.34] with 32 bytes of data:
Reply from 93.184.216.34: bytes=32 time=12ms TTL=56
Reply from 93.184.216.34: bytes=32 time=14ms TTL=56

Ping statistics for 93.184.216.34:
    Packets: Sent = 2, Received = 2, Lost = 0 (0% loss),";

    #[test]
    fn hostname_pattern_accepts_normal_names() {
        assert!(hostname_is_valid("example.com"));
        assert!(hostname_is_valid("10.0.0.1"));
        assert!(hostname_is_valid("my_host-01.local"));
    }

    #[test]
    fn hostname_pattern_rejects_shell_metacharacters() {
        assert!(!hostname_is_valid("example.com; rm -rf /"));
        assert!(!hostname_is_valid("host name"));
        assert!(!hostname_is_valid(""));
        assert!(!hostname_is_valid("a$b"));
    }

    #[test]
    fn hostname_length_boundary_is_253() {
        let max = "a".repeat(253);
        let over = "a".repeat(254);
        assert!(hostname_is_valid(&max));
        assert!(!hostname_is_valid(&over));
    }

    #[test]
    fn parses_linux_output() {
        let outcome = parse_output("example.com", true, LINUX_OK);
        assert!(outcome.reachable);
        assert_eq!(outcome.packet_loss_pct, Some(0.0));
        let avg = outcome.avg_latency_ms.unwrap();
        assert!((avg - 12.0).abs() < 0.1);
    }

    #[test]
    fn parses_windows_output() {
        let outcome = parse_output("example.com", true, WINDOWS_OK);
        assert!(outcome.reachable);
        assert_eq!(outcome.packet_loss_pct, Some(0.0));
        assert_eq!(outcome.avg_latency_ms, Some(13.0));
    }

    #[test]
    fn partial_loss_is_still_reachable() {
        let outcome = parse_output("flaky.example", true, LINUX_PARTIAL_LOSS);
        assert!(outcome.reachable);
        assert_eq!(outcome.packet_loss_pct, Some(50.0));
        assert!(outcome.avg_latency_ms.is_some());
    }

    #[test]
    fn total_loss_is_unreachable_even_on_zero_exit() {
        let output = "4 packets transmitted, 0 received, 100% packet loss, time 3100ms";
        let outcome = parse_output("down.example", true, output);
        assert!(!outcome.reachable);
        assert_eq!(outcome.packet_loss_pct, Some(100.0));
        assert_eq!(outcome.avg_latency_ms, None);
    }

    #[test]
    fn nonzero_exit_is_unreachable() {
        let outcome = parse_output("nxdomain.example", false, "ping: unknown host");
        assert!(!outcome.reachable);
        assert_eq!(outcome.packet_loss_pct, None);
        assert_eq!(outcome.avg_latency_ms, None);
    }

    #[test]
    fn latency_may_be_null_while_reachable() {
        let output = "4 packets transmitted, 4 received, 0% packet loss, time 3000ms";
        let outcome = parse_output("quiet.example", true, output);
        assert!(outcome.reachable);
        assert_eq!(outcome.avg_latency_ms, None);
    }

    #[test]
    fn snippet_is_capped() {
        let long = "x".repeat(2000);
        let outcome = parse_output("example.com", true, &long);
        assert_eq!(outcome.raw_snippet.len(), SNIPPET_LIMIT);
    }
}
