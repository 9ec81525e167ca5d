//! Domain records collected from external sources and persisted to Postgres.
//!
//! Each record type carries a natural key used for within-run deduplication:
//! patents dedup on publication number, legal cases on case number, and
//! regulatory updates on a composite of source, normalized title and
//! publication date (the same formula the duplicate check in the store
//! uses, so the two can never disagree).

use crate::collector::NaturalKeyed;
use chrono::NaiveDate;
use serde::Serialize;

/// A regulatory update (guidance document, regulation or safety alert).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RegulatoryUpdate {
    /// Storage id, assigned on insert. Absent on freshly collected records.
    #[sqlx(default)]
    pub id: Option<String>,
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub document_url: Option<String>,
    pub source_url: Option<String>,
    /// One of `guidance`, `regulation`, `alert`.
    pub update_type: String,
    pub jurisdiction: Option<String>,
    pub tags: Vec<String>,
    pub published_date: Option<NaiveDate>,
}

/// A court case or legal decision.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LegalCase {
    #[sqlx(default)]
    pub id: Option<String>,
    pub case_number: String,
    pub title: String,
    pub court: String,
    pub jurisdiction: String,
    pub region: Option<String>,
    pub filed_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub document_url: Option<String>,
    pub source_id: String,
    pub case_type: Option<String>,
}

/// A patent publication.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Patent {
    #[sqlx(default)]
    pub id: Option<String>,
    pub publication_number: String,
    pub title: String,
    #[sqlx(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub applicant: Option<String>,
    pub inventors: Vec<String>,
    pub publication_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub jurisdiction: Option<String>,
    pub cpc_codes: Vec<String>,
    pub document_url: Option<String>,
    pub source: Option<String>,
}

/// Normalize a title for duplicate detection: lowercase, collapse every run
/// of non-alphanumeric characters into a single space, trim the ends.
pub fn normalized_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;
    for c in title.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

impl NaturalKeyed for RegulatoryUpdate {
    fn natural_key(&self) -> String {
        let date = self
            .published_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        format!("{}|{}|{}", self.source_id, normalized_title(&self.title), date)
    }
}

impl NaturalKeyed for LegalCase {
    fn natural_key(&self) -> String {
        self.case_number.clone()
    }
}

impl NaturalKeyed for Patent {
    fn natural_key(&self) -> String {
        self.publication_number.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_title_collapses_punctuation_and_case() {
        assert_eq!(
            normalized_title("FDA  510(k): Clearance -- Update!"),
            "fda 510 k clearance update"
        );
        assert_eq!(normalized_title("  ..  "), "");
        assert_eq!(normalized_title("Plain title"), "plain title");
    }

    #[test]
    fn regulatory_natural_key_ignores_title_formatting() {
        let a = RegulatoryUpdate {
            id: None,
            source_id: "mhra_alerts".into(),
            title: "Device Alert: Infusion Pumps".into(),
            description: None,
            document_url: None,
            source_url: None,
            update_type: "alert".into(),
            jurisdiction: Some("UK".into()),
            tags: vec![],
            published_date: NaiveDate::from_ymd_opt(2026, 3, 14),
        };
        let mut b = a.clone();
        b.title = "device alert:  infusion pumps?".into();
        assert_eq!(a.natural_key(), b.natural_key());

        let mut c = a.clone();
        c.source_id = "fda_enforcement".into();
        assert_ne!(a.natural_key(), c.natural_key());
    }
}
