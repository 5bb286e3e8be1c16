//! `multipath -ll` output parsing.
//!
//! # Responsibilities
//! - Extract world-wide identifiers
//! - Extract configuration keyword errors
//! - Count paths per multipath device for monitoring
//!
//! # Design Decisions
//! - Pure and total: any text, including empty text, parses
//! - WWIDs and errors are matched across the whole text, independently
//! - Only the first WWID feeds Fibre Channel aliasing (one LUN per host);
//!   further devices are reported but never aliased

use std::sync::LazyLock;

use regex::Regex;

/// A parenthesized alphanumeric token, as printed after a device alias.
static WWID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([0-9A-Za-z_]+)\)").expect("wwid regex is valid"));

static KEYWORD_ERROR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"invalid\skeyword:\s[0-9A-Za-z_]+").expect("keyword error regex is valid")
});

/// `alias (wwid) dm-N ...` or `wwid dm-N ...`
static DEVICE_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\S+)\s+\(([0-9A-Za-z_]+)\)|([0-9A-Za-z_]+))\s+dm-\d+")
        .expect("device header regex is valid")
});

/// `H:C:T:L sdX MAJ:MIN`
static PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+:\d+:\d+:\d+\s+\S+\s+\d+:\d+").expect("path regex is valid")
});

/// One multipath map and the number of paths listed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipathDevice {
    /// User friendly name; equals the WWID when maps are unaliased.
    pub alias: String,
    pub wwid: String,
    pub paths: usize,
}

/// Parse result of one `multipath -ll` run. Never cached across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipathTopology {
    /// Every WWID, in order of appearance.
    pub wwids: Vec<String>,
    /// Every `invalid keyword: <word>` complaint, verbatim.
    pub errors: Vec<String>,
    pub devices: Vec<MultipathDevice>,
}

impl MultipathTopology {
    /// The WWID used for Fibre Channel LUN aliasing.
    pub fn primary_wwid(&self) -> Option<&str> {
        self.wwids.first().map(String::as_str)
    }

    /// Whether multipathd complained about its configuration.
    pub fn is_malformed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parse raw `multipath -ll` text.
pub fn parse(text: &str) -> MultipathTopology {
    let wwids = WWID_REGEX
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    let errors = KEYWORD_ERROR_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    MultipathTopology {
        wwids,
        errors,
        devices: parse_devices(text),
    }
}

fn parse_devices(text: &str) -> Vec<MultipathDevice> {
    let mut devices: Vec<MultipathDevice> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(caps) = DEVICE_HEADER_REGEX.captures(trimmed) {
            let (alias, wwid) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(alias), Some(wwid), _) => (alias.as_str(), wwid.as_str()),
                (_, _, Some(wwid)) => (wwid.as_str(), wwid.as_str()),
                _ => continue,
            };
            devices.push(MultipathDevice {
                alias: alias.to_string(),
                wwid: wwid.to_string(),
                paths: 0,
            });
        } else if PATH_REGEX.is_match(trimmed) {
            if let Some(device) = devices.last_mut() {
                device.paths += 1;
            }
        }
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_TOPOLOGY: &str = r"diskname (360014380056efd060000d00000510000) dm-3 Vendor,StorageModel
    [size=1.0G][features=1 queue_if_no_path][hwhandler=0][rw]
    \_ round-robin 0 [prio=100][active]
    \_ 0:0:0:1 sda 8:0   [active][ready]
    \_ 1:0:1:1 sdd 8:48  [active][ready]
    \_ round-robin 0 [prio=20][enabled]
    \_ 0:0:1:1 sdb 8:16  [active][ready]
    \_ 1:0:0:1 sdc 8:32  [active][ready]";

    const MODERN_TOPOLOGY: &str = "mpatha (3600a098038303634722b4d59614f4b6f) dm-0 NETAPP,LUN C-Mode
size=10G features='3 queue_if_no_path pg_init_retries 50' hwhandler='1 alua' wp=rw
|-+- policy='service-time 0' prio=50 status=active
| `- 7:0:0:0 sdb 8:16 active ready running
`-+- policy='service-time 0' prio=10 status=enabled
  `- 8:0:0:0 sdc 8:32 active ready running
36001405e3c2841d1c5e4ba6a6bd2b8a5 dm-1 LIO-ORG,disk0
size=1.0G features='0' hwhandler='1 alua' wp=rw
`-+- policy='service-time 0' prio=50 status=active
  `- 9:0:0:1 sdd 8:48 active ready running
";

    #[test]
    fn test_single_wwid() {
        let topology = parse(LEGACY_TOPOLOGY);
        assert_eq!(topology.wwids, vec!["360014380056efd060000d00000510000"]);
        assert_eq!(topology.primary_wwid(), Some("360014380056efd060000d00000510000"));
        assert!(!topology.is_malformed());
    }

    #[test]
    fn test_keyword_error() {
        let topology = parse(
            "Feb 28 10:00:00 | /etc/multipath/conf.d/x.conf line 3, invalid keyword: user_friendly_name\n",
        );
        assert_eq!(topology.errors, vec!["invalid keyword: user_friendly_name"]);
        assert!(topology.wwids.is_empty());
        assert!(topology.is_malformed());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse(""), MultipathTopology::default());
        assert_eq!(parse("").primary_wwid(), None);
    }

    #[test]
    fn test_errors_independent_of_wwids() {
        let text = format!("invalid keyword: foo\n{}", LEGACY_TOPOLOGY);
        let topology = parse(&text);
        assert_eq!(topology.errors.len(), 1);
        assert_eq!(topology.wwids.len(), 1);
    }

    #[test]
    fn test_multiple_devices_first_wins() {
        let topology = parse(MODERN_TOPOLOGY);
        // the unaliased map has no parenthesized token
        assert_eq!(topology.wwids, vec!["3600a098038303634722b4d59614f4b6f"]);
        assert_eq!(
            topology.devices,
            vec![
                MultipathDevice {
                    alias: "mpatha".into(),
                    wwid: "3600a098038303634722b4d59614f4b6f".into(),
                    paths: 2,
                },
                MultipathDevice {
                    alias: "36001405e3c2841d1c5e4ba6a6bd2b8a5".into(),
                    wwid: "36001405e3c2841d1c5e4ba6a6bd2b8a5".into(),
                    paths: 1,
                },
            ]
        );
    }

    #[test]
    fn test_legacy_path_count() {
        let topology = parse(LEGACY_TOPOLOGY);
        assert_eq!(topology.devices.len(), 1);
        assert_eq!(topology.devices[0].alias, "diskname");
        assert_eq!(topology.devices[0].paths, 4);
    }
}
