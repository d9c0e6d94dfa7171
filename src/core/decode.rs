// src/core/decode.rs

use serde_json::Value;

use crate::core::models::{
    coerce_bool, coerce_f64, coerce_i64, coerce_string, PathEntry, PortEntry, RawEntry,
    ScanResultPayload, Subdomain, Vulnerability,
};

// Category names used by the backend's result tree.
pub const CATEGORY_SUBDOMAINS: &str = "subdomains";
pub const CATEGORY_PORTS: &str = "ports";
pub const CATEGORY_PATHS: &str = "paths";
pub const CATEGORY_VULNERABILITIES: &str = "vulnerabilities";

/// Default applied when a source key is missing from an entry.
///
/// Every field carries exactly one of these; the decoder never infers a
/// default from the value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    EmptyString,
    False,
    Null,
}

impl FieldDefault {
    fn value(self) -> Value {
        match self {
            FieldDefault::EmptyString => Value::String(String::new()),
            FieldDefault::False => Value::Bool(false),
            FieldDefault::Null => Value::Null,
        }
    }
}

/// One output field of a decode: where it comes from on the wire and what it
/// falls back to.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: &'static str,
    pub source: &'static str,
    pub default: FieldDefault,
}

impl FieldSpec {
    const fn new(field: &'static str, source: &'static str, default: FieldDefault) -> Self {
        Self {
            field,
            source,
            default,
        }
    }
}

pub const SUBDOMAIN_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "_id", FieldDefault::EmptyString),
    FieldSpec::new("domain", "domain", FieldDefault::EmptyString),
    FieldSpec::new("ip", "ip", FieldDefault::EmptyString),
    FieldSpec::new("is_read", "is_read", FieldDefault::False),
    FieldSpec::new("http_status", "http_status", FieldDefault::Null),
    FieldSpec::new("http_title", "http_title", FieldDefault::EmptyString),
];

pub const PATH_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "_id", FieldDefault::EmptyString),
    FieldSpec::new("path", "path", FieldDefault::EmptyString),
    FieldSpec::new("status", "status", FieldDefault::EmptyString),
    FieldSpec::new("is_read", "is_read", FieldDefault::False),
];

pub const VULNERABILITY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "_id", FieldDefault::EmptyString),
    FieldSpec::new("title", "title", FieldDefault::EmptyString),
    FieldSpec::new("description", "description", FieldDefault::EmptyString),
    FieldSpec::new("severity", "severity", FieldDefault::EmptyString),
    FieldSpec::new("cvss", "cvss", FieldDefault::Null),
    FieldSpec::new("location", "location", FieldDefault::Null),
    FieldSpec::new("cve_id", "cve_id", FieldDefault::Null),
];

/// One decoded record: output field name to value, in field-map order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    values: Vec<(&'static str, Value)>,
}

impl DecodedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// String view of a field. Numbers and booleans are rendered; anything
    /// else reads as the empty string.
    pub fn str_field(&self, field: &str) -> String {
        self.get(field).and_then(coerce_string).unwrap_or_default()
    }

    pub fn bool_field(&self, field: &str) -> bool {
        self.get(field).and_then(coerce_bool).unwrap_or(false)
    }

    pub fn int_field(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(coerce_i64)
    }

    pub fn float_field(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(coerce_f64)
    }

    pub fn opt_str_field(&self, field: &str) -> Option<String> {
        self.get(field).and_then(coerce_string)
    }
}

/// Decode raw entries against a field map.
///
/// Produces exactly one record per input entry. For each field the entry is
/// searched for the source key; a present value is taken as-is, a missing
/// one gets the field's declared default. Malformed entries therefore decode
/// to all-defaults records rather than aborting the batch.
pub fn decode(entries: &[RawEntry], fields: &[FieldSpec]) -> Vec<DecodedRecord> {
    entries
        .iter()
        .map(|entry| {
            let values = fields
                .iter()
                .map(|spec| {
                    let value = entry
                        .get(spec.source)
                        .cloned()
                        .unwrap_or_else(|| spec.default.value());
                    (spec.field, value)
                })
                .collect();
            DecodedRecord { values }
        })
        .collect()
}

pub fn decode_subdomains(entries: &[RawEntry]) -> Vec<Subdomain> {
    decode(entries, SUBDOMAIN_FIELDS)
        .iter()
        .map(|rec| Subdomain {
            id: rec.str_field("id"),
            domain: rec.str_field("domain"),
            ip: rec.str_field("ip"),
            is_read: rec.bool_field("is_read"),
            http_status: rec.int_field("http_status"),
            http_title: rec.str_field("http_title"),
        })
        .collect()
}

/// Ports keep their raw wire form; see [`PortEntry`].
pub fn decode_ports(entries: &[RawEntry]) -> Vec<PortEntry> {
    entries.iter().cloned().map(PortEntry::new).collect()
}

pub fn decode_paths(entries: &[RawEntry]) -> Vec<PathEntry> {
    decode(entries, PATH_FIELDS)
        .iter()
        .map(|rec| PathEntry {
            id: rec.str_field("id"),
            path: rec.str_field("path"),
            status: rec.str_field("status"),
            is_read: rec.bool_field("is_read"),
        })
        .collect()
}

pub fn decode_vulnerabilities(entries: &[RawEntry]) -> Vec<Vulnerability> {
    decode(entries, VULNERABILITY_FIELDS)
        .iter()
        .map(|rec| Vulnerability {
            id: rec.str_field("id"),
            title: rec.str_field("title"),
            description: rec.str_field("description"),
            severity: rec.str_field("severity"),
            cvss: rec.float_field("cvss"),
            location: rec.opt_str_field("location"),
            cve_id: rec.opt_str_field("cve_id"),
        })
        .collect()
}

/// All categories of one scan result, decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub subdomains: Vec<Subdomain>,
    pub ports: Vec<PortEntry>,
    pub paths: Vec<PathEntry>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl ResultSet {
    /// Decode every known category of a payload. Categories the payload does
    /// not carry come out empty.
    pub fn from_payload(payload: &ScanResultPayload) -> Self {
        Self {
            subdomains: decode_subdomains(payload.entries(CATEGORY_SUBDOMAINS)),
            ports: decode_ports(payload.entries(CATEGORY_PORTS)),
            paths: decode_paths(payload.entries(CATEGORY_PATHS)),
            vulnerabilities: decode_vulnerabilities(payload.entries(CATEGORY_VULNERABILITIES)),
        }
    }

    /// Replace the vulnerability list with records fetched from the project
    /// endpoint, which is authoritative when present.
    pub fn with_vulnerabilities(mut self, vulnerabilities: Vec<Vulnerability>) -> Self {
        self.vulnerabilities = vulnerabilities;
        self
    }

    pub fn record_count(&self) -> usize {
        self.subdomains.len() + self.ports.len() + self.paths.len() + self.vulnerabilities.len()
    }
}
