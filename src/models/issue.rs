use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// Jira search fields requested for every issue.
pub const SEARCH_FIELDS: [&str; 5] = [
    "resolution",
    "description",
    "summary",
    "resolutiondate",
    "duedate",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JiraIssue {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(
        rename = "resolutiondate",
        default,
        deserialize_with = "deserialize_timestamp"
    )]
    pub resolution_date: Option<DateTime<FixedOffset>>,
    #[serde(rename = "duedate", default, deserialize_with = "deserialize_day")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct Resolution {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    pub total: u32,
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

impl JiraIssue {
    pub fn is_resolved(&self) -> bool {
        self.fields.resolution.is_some()
    }
}

/// Parses the timestamp shapes Jira and Google hand out: RFC 3339
/// (`2024-01-05T10:00:00.000Z`) and Jira's compact offset
/// (`2024-01-05T10:00:00.000+0000`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// Calendar day of a date or timestamp, taken in the timestamp's own offset.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.date_naive()))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
    }
}

fn deserialize_day<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_day(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", s))),
    }
}
