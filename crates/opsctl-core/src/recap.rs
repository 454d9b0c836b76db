//! Extraction of per-host statistics from playbook output.
//!
//! Ansible ends every playbook run with a block like:
//! ```text
//! PLAY RECAP *********************************************************
//! host1 : ok=2 changed=1 unreachable=0 failed=0
//! host2 : ok=2 changed=0 unreachable=0 failed=1
//! ```
//! [`parse`] turns that block into a `host -> stat -> count` map. It is a
//! best-effort pass over free text: it never fails, and degrades to an empty
//! or partial map when the block is missing or malformed.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Line prefix that opens the recap block.
pub const RECAP_MARKER: &str = "PLAY RECAP";

/// Per-host statistics keyed by host name, then by stat name.
pub type Summary = BTreeMap<String, BTreeMap<String, u64>>;

static HOST_LINE_RE: OnceLock<Regex> = OnceLock::new();
static STAT_RE: OnceLock<Regex> = OnceLock::new();

fn host_line_re() -> &'static Regex {
    HOST_LINE_RE.get_or_init(|| {
        Regex::new(r"^\s*(\S+?)\s*:\s*((?:[A-Za-z0-9_]+=\d+\s*)+)$").unwrap()
    })
}

fn stat_re() -> &'static Regex {
    STAT_RE.get_or_init(|| Regex::new(r"([A-Za-z0-9_]+)=(\d+)").unwrap())
}

/// Parse the recap block out of `raw`.
///
/// The block starts at the first line beginning with [`RECAP_MARKER`] and ends
/// at the first blank line or end of input. Lines inside it that are not of
/// the form `name : key=value ...` are skipped. A host listed twice keeps its
/// last line.
pub fn parse(raw: &str) -> Summary {
    let mut summary = Summary::new();

    let mut lines = raw.lines();
    if !lines.by_ref().any(|l| l.trim_start().starts_with(RECAP_MARKER)) {
        return summary;
    }

    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((host, stats)) = parse_host_line(line) {
            summary.insert(host, stats);
        }
    }

    summary
}

fn parse_host_line(line: &str) -> Option<(String, BTreeMap<String, u64>)> {
    let caps = host_line_re().captures(line.trim_end())?;
    let host = caps.get(1)?.as_str().to_string();
    let mut stats = BTreeMap::new();
    for kv in stat_re().captures_iter(caps.get(2)?.as_str()) {
        // A value too large for u64 disqualifies the whole line.
        let value = kv[2].parse::<u64>().ok()?;
        stats.insert(kv[1].to_string(), value);
    }
    Some((host, stats))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn parses_standard_recap_block() {
        let raw = "\
PLAY [all] *********************************************************

TASK [ping] ********************************************************
ok: [host1]
ok: [host2]

PLAY RECAP *********************************************************
host1 : ok=2 changed=1 unreachable=0 failed=0
host2 : ok=2 changed=0 unreachable=0 failed=1

";
        let summary = parse(raw);
        assert_eq!(summary.len(), 2);
        assert_eq!(
            summary["host1"],
            stats(&[("ok", 2), ("changed", 1), ("unreachable", 0), ("failed", 0)])
        );
        assert_eq!(
            summary["host2"],
            stats(&[("ok", 2), ("changed", 0), ("unreachable", 0), ("failed", 1)])
        );
    }

    #[test]
    fn missing_marker_yields_empty_map() {
        let raw = "ERROR! the playbook: ping.yml could not be found\n";
        assert!(parse(raw).is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn block_ends_at_first_blank_line() {
        let raw = "PLAY RECAP ***\nweb1 : ok=1 failed=0\n\nweb2 : ok=3 failed=0\n";
        let summary = parse(raw);
        assert_eq!(summary.len(), 1);
        assert!(summary.contains_key("web1"));
    }

    #[test]
    fn block_ends_at_end_of_input() {
        let raw = "PLAY RECAP ***\nweb1 : ok=1 failed=0";
        assert_eq!(parse(raw)["web1"], stats(&[("ok", 1), ("failed", 0)]));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let raw = "\
PLAY RECAP ***
web1 : ok=1 failed=0
this line is noise
web2 : ok=one failed=0
web3 ok=1
web4 : ok=5 skipped=2 rescued=0 ignored=0
";
        let summary = parse(raw);
        let hosts: Vec<&str> = summary.keys().map(String::as_str).collect();
        assert_eq!(hosts, vec!["web1", "web4"]);
        assert_eq!(summary["web4"]["skipped"], 2);
    }

    #[test]
    fn duplicate_host_keeps_last_line() {
        let raw = "PLAY RECAP ***\nweb1 : ok=1 failed=1\nweb1 : ok=4 failed=0\n";
        assert_eq!(parse(raw)["web1"], stats(&[("ok", 4), ("failed", 0)]));
    }

    #[test]
    fn overflowing_value_drops_the_line() {
        let raw = "PLAY RECAP ***\nweb1 : ok=99999999999999999999999\nweb2 : ok=1\n";
        let summary = parse(raw);
        assert!(!summary.contains_key("web1"));
        assert_eq!(summary["web2"]["ok"], 1);
    }

    #[test]
    fn tolerates_missing_space_before_colon_and_crlf() {
        let raw = "PLAY RECAP ***\r\n10.0.0.1: ok=2 changed=0\r\n";
        assert_eq!(
            parse(raw)["10.0.0.1"],
            stats(&[("ok", 2), ("changed", 0)])
        );
    }
}
