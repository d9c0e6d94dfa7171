// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use strum::{Display, EnumString};

// --- Remote Job State ---

/// Lifecycle state of a scan job as reported by the backend.
///
/// Transitions are driven entirely by the remote system; this client only
/// observes them through polling. State strings the client does not know
/// decode to [`JobState::Unknown`], which is never active, so a newer
/// backend cannot wedge a poller into an endless loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    #[default]
    Unknown,
}

impl JobState {
    /// Whether the job may still make progress and is worth polling.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Running)
    }

    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }
}

impl<'de> Deserialize<'de> for JobState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.trim().parse().unwrap_or(JobState::Unknown))
    }
}

/// A scan job as reported by the status endpoint.
///
/// Only `id`, `state` and `target_id` are load-bearing for the client; the
/// remaining fields are metadata the backend may or may not send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub target_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub target_address: Option<String>,
    pub pipeline_name: Option<String>,
    pub project_id: Option<String>,
    pub error_message: Option<String>,
}

impl ScanJob {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Advisory progress percentage for display purposes.
    ///
    /// The backend reports no progress figure, so running jobs get a
    /// time-based estimate that climbs toward 95% over roughly ten minutes
    /// and never reaches 100 until the job actually finishes. The value is
    /// not authoritative and must not drive control decisions.
    pub fn progress_hint(&self, now: DateTime<Utc>) -> u8 {
        match self.state {
            JobState::Pending | JobState::Unknown => 0,
            JobState::Running => {
                let elapsed = self
                    .created_at
                    .map(|started| (now - started).num_seconds().max(0))
                    .unwrap_or(0);
                let estimate = 5.0 + 90.0 * (elapsed as f64 / 600.0);
                estimate.min(95.0) as u8
            }
            JobState::Completed | JobState::Failed | JobState::Stopped => 100,
        }
    }
}

// --- Key/Value Tree Wire Format ---

/// One `{Key, Value}` pair inside a raw result entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: Value,
}

/// One backend-reported record in wire form.
///
/// The backend serializes records either as an ordered array of
/// [`RawField`] pairs or as a plain JSON object, depending on which storage
/// path produced them. Both shapes must be accepted. Anything else is kept
/// verbatim in `Other` and simply yields no fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    Fields(Vec<RawField>),
    Object(serde_json::Map<String, Value>),
    Other(Value),
}

impl RawEntry {
    /// Look up a field value by key. A key appears at most once per entry;
    /// the first match wins and a missing key is simply `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            RawEntry::Fields(fields) => fields.iter().find(|f| f.key == key).map(|f| &f.value),
            RawEntry::Object(map) => map.get(key),
            RawEntry::Other(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawEntry::Fields(fields) => fields.is_empty(),
            RawEntry::Object(map) => map.is_empty(),
            RawEntry::Other(_) => true,
        }
    }
}

/// One category of findings: a category name plus its raw entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResultGroup {
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Value", default, deserialize_with = "null_to_default")]
    pub value: Vec<RawEntry>,
}

/// The full result document for one scan target.
///
/// `data` holds one [`RawResultGroup`] per category; any other top-level
/// fields the backend sends are preserved untouched in `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResultPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub data: Vec<RawResultGroup>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, Value>,
}

impl ScanResultPayload {
    /// Find a category group by name.
    ///
    /// Returning `Option` lets callers distinguish "no such category" from
    /// "category present but empty"; the typed decoders intentionally do not.
    pub fn group(&self, category: &str) -> Option<&RawResultGroup> {
        self.data.iter().find(|group| group.key == category)
    }

    /// Raw entries for a category, or an empty slice when the category is
    /// absent.
    pub fn entries(&self, category: &str) -> &[RawEntry] {
        self.group(category)
            .map(|group| group.value.as_slice())
            .unwrap_or(&[])
    }
}

/// The backend sends `null` instead of an empty list for categories without
/// rows yet; map both onto the default.
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Normalized Records ---

/// A decoded subdomain finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subdomain {
    pub id: String,
    pub domain: String,
    pub ip: String,
    pub is_read: bool,
    pub http_status: Option<i64>,
    pub http_title: String,
}

impl Subdomain {
    pub fn has_ip(&self) -> bool {
        !self.ip.is_empty()
    }
}

/// A decoded port finding.
///
/// Ports keep their wire form and expose typed accessors instead of copying
/// into a fixed struct, because scanners attach tool-specific extras here
/// that callers may still want to reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortEntry {
    raw: RawEntry,
}

impl PortEntry {
    pub fn new(raw: RawEntry) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &RawEntry {
        &self.raw
    }

    pub fn id(&self) -> String {
        self.string_field("_id")
    }

    pub fn number(&self) -> Option<u16> {
        self.raw
            .get("number")
            .and_then(coerce_i64)
            .and_then(|n| u16::try_from(n).ok())
    }

    pub fn host(&self) -> String {
        self.string_field("host")
    }

    pub fn service(&self) -> String {
        self.string_field("service")
    }

    pub fn is_read(&self) -> bool {
        self.raw
            .get("is_read")
            .and_then(coerce_bool)
            .unwrap_or(false)
    }

    fn string_field(&self, key: &str) -> String {
        self.raw.get(key).and_then(coerce_string).unwrap_or_default()
    }
}

/// A decoded path (content discovery) finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub id: String,
    pub path: String,
    pub status: String,
    pub is_read: bool,
}

/// A vulnerability record.
///
/// `severity` stays the raw backend string; [`Vulnerability::severity_level`]
/// maps it onto the known scale and leaves unknown values unbucketed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, deserialize_with = "loose_f64")]
    pub cvss: Option<f64>,
    pub location: Option<String>,
    pub cve_id: Option<String>,
}

impl Vulnerability {
    pub fn severity_level(&self) -> Option<Severity> {
        self.severity.trim().parse().ok()
    }
}

/// Some scanners report CVSS as a number, others as a string.
fn loose_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_f64))
}

// --- Severity Scale ---

/// Severity level for vulnerability findings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// Per-severity tallies, matching the backend's stats endpoint shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub high: u64,
    #[serde(default)]
    pub medium: u64,
    #[serde(default)]
    pub low: u64,
    #[serde(default)]
    pub info: u64,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    /// Sum of all bucketed findings. Records with an unknown severity are in
    /// no bucket, so this can be less than the record count.
    pub fn bucket_total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low + self.info
    }

    pub fn high_risk(&self) -> u64 {
        self.critical + self.high
    }
}

// --- Tool Catalog ---

/// One scanner tool as advertised by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub available: bool,
}

/// Tools of one category, in backend order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolGroup {
    pub category: String,
    pub tools: Vec<Tool>,
}

/// The backend's tool listing: a JSON object mapping category name to a
/// tool list. Category order carries meaning for display, so the catalog is
/// decoded by hand into a vector instead of through a map type that would
/// reorder keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    groups: Vec<ToolGroup>,
}

impl ToolCatalog {
    pub fn new(groups: Vec<ToolGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[ToolGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Serialize for ToolCatalog {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(&group.category, &group.tools)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ToolCatalog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CatalogVisitor;

        impl<'de> Visitor<'de> for CatalogVisitor {
            type Value = ToolCatalog;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category name to tool list")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut groups = Vec::new();
                while let Some((category, value)) = access.next_entry::<String, Value>()? {
                    let tools = serde_json::from_value(value).unwrap_or_default();
                    groups.push(ToolGroup { category, tools });
                }
                Ok(ToolCatalog { groups })
            }
        }

        deserializer.deserialize_map(CatalogVisitor)
    }
}

// --- Value Coercion ---
// Shared by the decoder and the port accessors. The wire format carries no
// schema, so typed reads degrade to None on a type mismatch instead of
// failing the whole document.

pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn job_state_parses_known_and_unknown_strings() {
        let job: ScanJob = serde_json::from_value(json!({
            "id": "scan123",
            "state": "running",
            "target_id": "target123"
        }))
        .unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.is_active());

        let odd: ScanJob = serde_json::from_value(json!({
            "id": "scan123",
            "state": "paused-for-maintenance"
        }))
        .unwrap();
        assert_eq!(odd.state, JobState::Unknown);
        assert!(!odd.is_active());
    }

    #[test]
    fn job_state_display_is_lowercase() {
        assert_eq!(JobState::Completed.to_string(), "completed");
        assert_eq!("STOPPED".parse::<JobState>().unwrap(), JobState::Stopped);
    }

    #[test]
    fn scan_job_tolerates_missing_fields() {
        let job: ScanJob = serde_json::from_value(json!({})).unwrap();
        assert_eq!(job.state, JobState::Unknown);
        assert!(job.id.is_empty());
        assert!(job.created_at.is_none());
    }

    #[test]
    fn progress_hint_is_bounded_and_terminal_states_are_full() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut job = ScanJob {
            state: JobState::Running,
            created_at: Some(now - chrono::Duration::minutes(5)),
            ..ScanJob::default()
        };
        let hint = job.progress_hint(now);
        assert!(hint > 0 && hint < 100, "got {hint}");

        job.created_at = Some(now - chrono::Duration::hours(6));
        assert_eq!(job.progress_hint(now), 95);

        job.state = JobState::Completed;
        assert_eq!(job.progress_hint(now), 100);
        job.state = JobState::Failed;
        assert_eq!(job.progress_hint(now), 100);
        job.state = JobState::Pending;
        assert_eq!(job.progress_hint(now), 0);
    }

    #[test]
    fn raw_entry_supports_both_wire_shapes() {
        let pair_form: RawEntry = serde_json::from_value(json!([
            {"Key": "_id", "Value": "p1"},
            {"Key": "number", "Value": 443}
        ]))
        .unwrap();
        assert_eq!(pair_form.get("_id"), Some(&json!("p1")));
        assert_eq!(pair_form.get("number"), Some(&json!(443)));
        assert_eq!(pair_form.get("missing"), None);

        let object_form: RawEntry =
            serde_json::from_value(json!({"_id": "p2", "number": 80})).unwrap();
        assert_eq!(object_form.get("_id"), Some(&json!("p2")));

        let scalar: RawEntry = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(scalar.get("_id"), None);
        assert!(scalar.is_empty());
    }

    #[test]
    fn payload_distinguishes_missing_from_empty_category() {
        let payload: ScanResultPayload = serde_json::from_value(json!({
            "id": "r1",
            "target_id": "t1",
            "data": [
                {"Key": "subdomains", "Value": []},
                {"Key": "ports", "Value": null}
            ]
        }))
        .unwrap();

        assert!(payload.group("subdomains").is_some());
        assert!(payload.entries("subdomains").is_empty());
        assert!(payload.group("ports").is_some());
        assert!(payload.group("paths").is_none());
        assert!(payload.entries("paths").is_empty());
    }

    #[test]
    fn payload_preserves_unknown_metadata() {
        let payload: ScanResultPayload = serde_json::from_value(json!({
            "id": "r1",
            "target_id": "t1",
            "data": [],
            "scanned_at": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            payload.metadata.get("scanned_at"),
            Some(&json!("2024-01-01T10:00:00Z"))
        );
    }

    #[test]
    fn port_entry_accessors_degrade_to_defaults() {
        let port = PortEntry::new(
            serde_json::from_value(json!([
                {"Key": "_id", "Value": "p1"},
                {"Key": "number", "Value": "8080"},
                {"Key": "host", "Value": "10.0.0.1"},
                {"Key": "is_read", "Value": true}
            ]))
            .unwrap(),
        );
        assert_eq!(port.id(), "p1");
        assert_eq!(port.number(), Some(8080));
        assert_eq!(port.host(), "10.0.0.1");
        assert_eq!(port.service(), "");
        assert!(port.is_read());

        let odd = PortEntry::new(
            serde_json::from_value(json!({"number": {"nested": true}, "is_read": "yes"})).unwrap(),
        );
        assert_eq!(odd.number(), None);
        assert!(!odd.is_read());
    }

    #[test]
    fn vulnerability_severity_is_parsed_loosely() {
        let vuln: Vulnerability = serde_json::from_value(json!({
            "id": "v1",
            "title": "SQL Injection",
            "severity": "HIGH",
            "cvss": "8.5"
        }))
        .unwrap();
        assert_eq!(vuln.severity_level(), Some(Severity::High));
        assert_eq!(vuln.cvss, Some(8.5));

        let unknown: Vulnerability =
            serde_json::from_value(json!({"severity": "catastrophic"})).unwrap();
        assert_eq!(unknown.severity_level(), None);
    }

    #[test]
    fn severity_counts_add_and_totals() {
        let mut counts = SeverityCounts::default();
        counts.add(Severity::Critical);
        counts.add(Severity::High);
        counts.add(Severity::High);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.high, 2);
        assert_eq!(counts.bucket_total(), 3);
        assert_eq!(counts.high_risk(), 3);
    }

    #[test]
    fn tool_catalog_preserves_category_order() {
        // Parsed from a string on purpose: going through a Value would
        // re-sort the keys before the visitor ever sees them.
        let raw = r#"{
            "subdomain": [{"name": "subfinder", "available": true}],
            "port": [{"name": "nmap", "available": false}],
            "vulnerability": [{"name": "nuclei", "available": true}]
        }"#;
        let catalog: ToolCatalog = serde_json::from_str(raw).unwrap();

        let order: Vec<&str> = catalog
            .groups()
            .iter()
            .map(|g| g.category.as_str())
            .collect();
        assert_eq!(order, vec!["subdomain", "port", "vulnerability"]);
        assert_eq!(catalog.groups()[0].tools[0].name, "subfinder");
    }

    #[test]
    fn tool_catalog_tolerates_malformed_groups() {
        let raw = r#"{
            "subdomain": [{"name": "subfinder", "available": true}],
            "broken": "not-a-list"
        }"#;
        let catalog: ToolCatalog = serde_json::from_str(raw).unwrap();
        assert_eq!(catalog.groups().len(), 2);
        assert_eq!(catalog.groups()[1].category, "broken");
        assert!(catalog.groups()[1].tools.is_empty());
    }
}
