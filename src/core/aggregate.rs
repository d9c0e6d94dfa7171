// src/core/aggregate.rs

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::core::decode::ResultSet;
use crate::core::models::{SeverityCounts, Subdomain, ToolCatalog};

/// Headline numbers for one scan, derived purely from decoded records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Raw record count across every category, unknown severities included.
    pub total_results: u64,
    pub vulnerability_counts: SeverityCounts,
    /// Distinct network addresses seen across subdomains and ports.
    pub assets_count: u64,
}

/// Summarize a decoded result set.
///
/// `total_results` counts records, not buckets, so a vulnerability with a
/// severity outside the known scale still counts toward the total while
/// appearing in no severity bucket.
pub fn summarize(records: &ResultSet) -> ScanSummary {
    let mut vulnerability_counts = SeverityCounts::default();
    for vuln in &records.vulnerabilities {
        if let Some(severity) = vuln.severity_level() {
            vulnerability_counts.add(severity);
        }
    }

    let addresses = dedupe_ips(
        records
            .subdomains
            .iter()
            .map(|sub| sub.ip.clone())
            .chain(records.ports.iter().map(|port| port.host())),
    );

    ScanSummary {
        total_results: records.record_count() as u64,
        vulnerability_counts,
        assets_count: addresses.len() as u64,
    }
}

/// A subdomain record in display order, tagged with whether it is the first
/// row carrying its IP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortedHost {
    #[serde(flatten)]
    pub record: Subdomain,
    pub is_first_ip: bool,
}

/// Order records for host-centric display.
///
/// Records with an IP come first, ordered by numeric octet comparison so
/// that 9.x sorts before 10.x; ties and IP-less records fall back to the
/// domain name. The sort is stable: equal keys keep their input order. The
/// first record of each distinct IP is flagged so renderers can group rows
/// without repeating the address.
pub fn sort_hosts(records: Vec<Subdomain>) -> Vec<SortedHost> {
    let mut sorted = records;
    sorted.sort_by(host_order);

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .map(|record| {
            let is_first_ip = record.has_ip() && seen.insert(record.ip.clone());
            SortedHost {
                record,
                is_first_ip,
            }
        })
        .collect()
}

fn host_order(a: &Subdomain, b: &Subdomain) -> Ordering {
    match (a.has_ip(), b.has_ip()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.domain.cmp(&b.domain),
        (true, true) => ip_octets(&a.ip)
            .cmp(&ip_octets(&b.ip))
            .then_with(|| a.domain.cmp(&b.domain)),
    }
}

/// Split an IPv4-looking string into comparable octets. Unparseable parts
/// read as zero so odd values still order deterministically.
fn ip_octets(ip: &str) -> [u32; 4] {
    let mut octets = [0u32; 4];
    for (i, part) in ip.split('.').take(4).enumerate() {
        octets[i] = part.trim().parse().unwrap_or(0);
    }
    octets
}

/// One tool row after flattening the catalog, tagged with its category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatTool {
    pub name: String,
    pub available: bool,
    pub category: String,
}

/// Flatten a tool catalog into one row per tool, preserving catalog order
/// both across and within categories.
pub fn flatten_tools(catalog: &ToolCatalog) -> Vec<FlatTool> {
    catalog
        .groups()
        .iter()
        .flat_map(|group| {
            group.tools.iter().map(|tool| FlatTool {
                name: tool.name.clone(),
                available: tool.available,
                category: group.category.clone(),
            })
        })
        .collect()
}

/// Unique non-empty addresses in first-seen order.
pub fn dedupe_ips<I, S>(ips: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();
    for ip in ips {
        let ip = ip.as_ref();
        if ip.is_empty() || seen.contains(ip) {
            continue;
        }
        seen.insert(ip.to_string());
        unique.push(ip.to_string());
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decode::decode_ports;
    use crate::core::models::{RawEntry, Tool, ToolGroup, Vulnerability};
    use serde_json::json;

    fn sub(domain: &str, ip: &str) -> Subdomain {
        Subdomain {
            id: format!("id-{domain}"),
            domain: domain.to_string(),
            ip: ip.to_string(),
            ..Subdomain::default()
        }
    }

    fn vuln(severity: &str) -> Vulnerability {
        Vulnerability {
            severity: severity.to_string(),
            ..Vulnerability::default()
        }
    }

    #[test]
    fn summarize_counts_records_and_buckets_severities() {
        let records = ResultSet {
            subdomains: vec![sub("a.example.com", "10.0.0.1"), sub("b.example.com", "")],
            ports: decode_ports(
                &serde_json::from_value::<Vec<RawEntry>>(json!([
                    {"_id": "p1", "number": 80, "host": "10.0.0.1"},
                    {"_id": "p2", "number": 443, "host": "10.0.0.9"}
                ]))
                .unwrap(),
            ),
            paths: Vec::new(),
            vulnerabilities: vec![vuln("critical"), vuln("high"), vuln("nonsense")],
        };

        let summary = summarize(&records);
        assert_eq!(summary.total_results, 7);
        assert_eq!(summary.vulnerability_counts.critical, 1);
        assert_eq!(summary.vulnerability_counts.high, 1);
        assert_eq!(summary.vulnerability_counts.bucket_total(), 2);
        // 10.0.0.1 appears as both a subdomain IP and a port host.
        assert_eq!(summary.assets_count, 2);
    }

    #[test]
    fn summarize_empty_set_is_all_zero() {
        let summary = summarize(&ResultSet::default());
        assert_eq!(summary, ScanSummary::default());
    }

    #[test]
    fn summarize_total_ignores_bucket_gaps() {
        let records = ResultSet {
            vulnerabilities: vec![
                vuln("critical"),
                vuln("critical"),
                vuln("high"),
                vuln("high"),
                vuln("high"),
                vuln("unrated"),
            ],
            ..ResultSet::default()
        };

        let summary = summarize(&records);
        assert_eq!(summary.vulnerability_counts.critical, 2);
        assert_eq!(summary.vulnerability_counts.high, 3);
        assert_eq!(summary.vulnerability_counts.medium, 0);
        assert_eq!(summary.vulnerability_counts.bucket_total(), 5);
        assert_eq!(summary.total_results, 6);
    }

    #[test]
    fn sort_hosts_compares_octets_numerically() {
        // Lexicographic ordering would put "10.1.1.1" first.
        let sorted = sort_hosts(vec![
            sub("b.example.com", "10.1.1.1"),
            sub("a.example.com", "2.2.2.2"),
        ]);
        assert_eq!(sorted[0].record.ip, "2.2.2.2");
        assert_eq!(sorted[1].record.ip, "10.1.1.1");
    }

    #[test]
    fn sort_hosts_orders_by_octets_then_domain() {
        let sorted = sort_hosts(vec![
            sub("z.example.com", "10.0.0.2"),
            sub("a.example.com", "9.0.0.1"),
            sub("m.example.com", "10.0.0.2"),
            sub("b.example.com", "10.0.0.10"),
        ]);

        let order: Vec<(&str, &str)> = sorted
            .iter()
            .map(|h| (h.record.ip.as_str(), h.record.domain.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("9.0.0.1", "a.example.com"),
                ("10.0.0.2", "m.example.com"),
                ("10.0.0.2", "z.example.com"),
                ("10.0.0.10", "b.example.com"),
            ]
        );
    }

    #[test]
    fn sort_hosts_puts_ip_less_records_last() {
        let sorted = sort_hosts(vec![
            sub("no-ip-b.example.com", ""),
            sub("with-ip.example.com", "10.0.0.1"),
            sub("no-ip-a.example.com", ""),
        ]);

        assert_eq!(sorted[0].record.domain, "with-ip.example.com");
        assert_eq!(sorted[1].record.domain, "no-ip-a.example.com");
        assert_eq!(sorted[2].record.domain, "no-ip-b.example.com");
        assert!(!sorted[1].is_first_ip);
        assert!(!sorted[2].is_first_ip);
    }

    #[test]
    fn sort_hosts_flags_only_the_first_row_per_ip() {
        let sorted = sort_hosts(vec![
            sub("a.example.com", "10.0.0.1"),
            sub("b.example.com", "10.0.0.1"),
            sub("c.example.com", "10.0.0.2"),
        ]);

        let flags: Vec<bool> = sorted.iter().map(|h| h.is_first_ip).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn sort_hosts_is_stable_for_equal_keys() {
        let sorted = sort_hosts(vec![
            Subdomain {
                id: "first".into(),
                domain: "same.example.com".into(),
                ip: "10.0.0.1".into(),
                ..Subdomain::default()
            },
            Subdomain {
                id: "second".into(),
                domain: "same.example.com".into(),
                ip: "10.0.0.1".into(),
                ..Subdomain::default()
            },
        ]);
        assert_eq!(sorted[0].record.id, "first");
        assert_eq!(sorted[1].record.id, "second");
    }

    #[test]
    fn flatten_tools_preserves_order_and_tags_categories() {
        let catalog = ToolCatalog::new(vec![
            ToolGroup {
                category: "subdomain".into(),
                tools: vec![
                    Tool {
                        name: "subfinder".into(),
                        available: true,
                    },
                    Tool {
                        name: "amass".into(),
                        available: false,
                    },
                ],
            },
            ToolGroup {
                category: "port".into(),
                tools: vec![Tool {
                    name: "nmap".into(),
                    available: true,
                }],
            },
        ]);

        let flat = flatten_tools(&catalog);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].name, "subfinder");
        assert_eq!(flat[0].category, "subdomain");
        assert_eq!(flat[1].name, "amass");
        assert_eq!(flat[2].category, "port");
    }

    #[test]
    fn flatten_tools_empty_catalog_is_empty() {
        assert!(flatten_tools(&ToolCatalog::default()).is_empty());
    }

    #[test]
    fn dedupe_ips_keeps_first_seen_order_and_drops_empties() {
        let unique = dedupe_ips(["10.0.0.2", "", "10.0.0.1", "10.0.0.2", "10.0.0.1"]);
        assert_eq!(unique, vec!["10.0.0.2", "10.0.0.1"]);
    }
}
