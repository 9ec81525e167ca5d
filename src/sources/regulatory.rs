//! Regulatory update sources: openFDA device enforcement, EU MDCG guidance
//! and MHRA device safety alerts.

use crate::data::models::RegulatoryUpdate;
use crate::sources::{FetchOutcome, SourceAdapter, get_json, get_text};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use html_scraper::{Html, Selector};
use regex::Regex;
use serde::Deserialize;
use url::Url;

const FDA_ENFORCEMENT_URL: &str = "https://api.fda.gov/device/enforcement.json";
const FDA_LANDING_URL: &str = "https://www.fda.gov/medical-devices";
const MDCG_BASE_URL: &str = "https://health.ec.europa.eu/mdcg_en";
const MHRA_ALERTS_URL: &str = "https://www.gov.uk/government/collections/device-alerts";

fn anchor_selector() -> Selector {
    Selector::parse("a").expect("static selector")
}

/// Truncate to at most `max` characters without splitting a code point.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

/// Device recall / enforcement reports from the openFDA API.
pub struct FdaEnforcementAdapter {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FdaEnforcementResponse {
    #[serde(default)]
    results: Vec<FdaEnforcementReport>,
}

#[derive(Debug, Deserialize)]
struct FdaEnforcementReport {
    product_description: Option<String>,
    reason_for_recall: Option<String>,
    classification: Option<String>,
    /// openFDA dates are compact `YYYYMMDD` strings.
    report_date: Option<String>,
    more_code_info: Option<String>,
}

impl FdaEnforcementAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter<RegulatoryUpdate> for FdaEnforcementAdapter {
    fn name(&self) -> &'static str {
        "fda_enforcement"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<RegulatoryUpdate>> {
        let url = format!(
            "{FDA_ENFORCEMENT_URL}?search=reason_for_recall:%22device%22&limit={limit}"
        );
        let response: FdaEnforcementResponse = get_json(&self.client, &url).await?;

        let updates = response
            .results
            .into_iter()
            .map(|report| {
                let title = report
                    .product_description
                    .as_deref()
                    .map(|d| truncate(d, 180))
                    .unwrap_or_else(|| "FDA Device Enforcement".to_owned());
                let description = format!(
                    "{} - Classification: {}",
                    report.reason_for_recall.as_deref().unwrap_or("Recall"),
                    report.classification.as_deref().unwrap_or("N/A"),
                );
                RegulatoryUpdate {
                    id: None,
                    source_id: "fda_enforcement".to_owned(),
                    title,
                    description: Some(description),
                    document_url: Some(
                        report
                            .more_code_info
                            .unwrap_or_else(|| FDA_LANDING_URL.to_owned()),
                    ),
                    source_url: Some(FDA_LANDING_URL.to_owned()),
                    update_type: "alert".to_owned(),
                    jurisdiction: Some("US".to_owned()),
                    tags: vec![
                        "recall".to_owned(),
                        "enforcement".to_owned(),
                        "post-market".to_owned(),
                    ],
                    published_date: report
                        .report_date
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y%m%d").ok()),
                }
            })
            .collect();

        Ok(FetchOutcome::Fetched(updates))
    }
}

/// MDCG guidance documents scraped from the EU Commission's listing page.
pub struct MdcgGuidanceAdapter {
    client: reqwest::Client,
    title_filter: Regex,
}

impl MdcgGuidanceAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            title_filter: Regex::new(r"(?i)MDCG\s?20\d{2}|MDCG Guidance").expect("static regex"),
        }
    }

    fn parse(&self, html: &str, limit: u32) -> Vec<RegulatoryUpdate> {
        let base = Url::parse(MDCG_BASE_URL).expect("static url");
        let document = Html::parse_document(html);
        let mut updates = Vec::new();

        for anchor in document.select(&anchor_selector()) {
            let text = anchor.text().collect::<String>().trim().to_owned();
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if text.is_empty() || !self.title_filter.is_match(&text) {
                continue;
            }
            let absolute = match base.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };
            let is_pdf = href.ends_with(".pdf");
            let mut tags = vec!["mdcg".to_owned(), "guidance".to_owned()];
            if is_pdf {
                tags.push("pdf".to_owned());
            }
            updates.push(RegulatoryUpdate {
                id: None,
                source_id: "mdcg_guidance".to_owned(),
                title: truncate(&text, 240),
                description: Some("MDCG guidance document".to_owned()),
                document_url: Some(absolute),
                source_url: Some(MDCG_BASE_URL.to_owned()),
                update_type: "guidance".to_owned(),
                jurisdiction: Some("EU".to_owned()),
                tags,
                published_date: None,
            });
            if updates.len() >= limit as usize {
                break;
            }
        }
        updates
    }
}

#[async_trait]
impl SourceAdapter<RegulatoryUpdate> for MdcgGuidanceAdapter {
    fn name(&self) -> &'static str {
        "mdcg_guidance"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<RegulatoryUpdate>> {
        let html = get_text(&self.client, MDCG_BASE_URL).await?;
        Ok(FetchOutcome::Fetched(self.parse(&html, limit)))
    }
}

/// MHRA device safety alerts scraped from the gov.uk collection page.
pub struct MhraAlertsAdapter {
    client: reqwest::Client,
    title_filter: Regex,
}

impl MhraAlertsAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            title_filter: Regex::new(r"(?i)alert|safety|field safety").expect("static regex"),
        }
    }

    fn parse(&self, html: &str, limit: u32) -> Vec<RegulatoryUpdate> {
        let base = Url::parse(MHRA_ALERTS_URL).expect("static url");
        let document = Html::parse_document(html);
        let mut updates = Vec::new();

        for anchor in document.select(&anchor_selector()) {
            let text = anchor.text().collect::<String>().trim().to_owned();
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            // Short anchors ("Alerts", nav links) are noise, not alerts.
            if text.len() <= 10 || !self.title_filter.is_match(&text) {
                continue;
            }
            let absolute = match base.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };
            updates.push(RegulatoryUpdate {
                id: None,
                source_id: "mhra_alerts".to_owned(),
                title: truncate(&text, 220),
                description: Some("MHRA safety / device alert".to_owned()),
                document_url: Some(absolute),
                source_url: Some(MHRA_ALERTS_URL.to_owned()),
                update_type: "alert".to_owned(),
                jurisdiction: Some("UK".to_owned()),
                tags: vec![
                    "mhra".to_owned(),
                    "alert".to_owned(),
                    "safety".to_owned(),
                ],
                published_date: None,
            });
            if updates.len() >= limit as usize {
                break;
            }
        }
        updates
    }
}

#[async_trait]
impl SourceAdapter<RegulatoryUpdate> for MhraAlertsAdapter {
    fn name(&self) -> &'static str {
        "mhra_alerts"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<RegulatoryUpdate>> {
        let html = get_text(&self.client, MHRA_ALERTS_URL).await?;
        Ok(FetchOutcome::Fetched(self.parse(&html, limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn mdcg_parse_extracts_guidance_links() {
        let html = r##"
            <html><body>
              <a href="/documents/mdcg-2024-3.pdf">MDCG 2024-3 Clinical evaluation</a>
              <a href="/home">Home</a>
              <a href="https://example.eu/mdcg-guidance">MDCG Guidance overview</a>
            </body></html>
        "##;
        let adapter = MdcgGuidanceAdapter::new(client());
        let updates = adapter.parse(html, 25);

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].title, "MDCG 2024-3 Clinical evaluation");
        assert_eq!(
            updates[0].document_url.as_deref(),
            Some("https://health.ec.europa.eu/documents/mdcg-2024-3.pdf")
        );
        assert!(updates[0].tags.contains(&"pdf".to_owned()));
        assert_eq!(updates[1].jurisdiction.as_deref(), Some("EU"));
    }

    #[test]
    fn mdcg_parse_respects_the_limit() {
        let html = r##"
            <html><body>
              <a href="/a">MDCG 2023-1 one</a>
              <a href="/b">MDCG 2023-2 two</a>
              <a href="/c">MDCG 2023-3 three</a>
            </body></html>
        "##;
        let adapter = MdcgGuidanceAdapter::new(client());
        assert_eq!(adapter.parse(html, 2).len(), 2);
    }

    #[test]
    fn mhra_parse_skips_short_navigation_anchors() {
        let html = r##"
            <html><body>
              <a href="/alerts">Alerts</a>
              <a href="/alert/123">Field safety notice: infusion pump battery fault</a>
            </body></html>
        "##;
        let adapter = MhraAlertsAdapter::new(client());
        let updates = adapter.parse(html, 30);

        assert_eq!(updates.len(), 1);
        assert!(updates[0].title.starts_with("Field safety notice"));
        assert_eq!(updates[0].update_type, "alert");
    }

    #[test]
    fn fda_report_dates_parse_compact_format() {
        let body = r#"{
            "results": [{
                "product_description": "Infusion pump model X",
                "reason_for_recall": "Software defect in device",
                "classification": "Class II",
                "report_date": "20260114",
                "more_code_info": null
            }]
        }"#;
        let response: FdaEnforcementResponse =
            crate::sources::parse_json_with_context(body).unwrap();
        assert_eq!(response.results.len(), 1);
        let d = response.results[0].report_date.as_deref().unwrap();
        assert_eq!(
            NaiveDate::parse_from_str(d, "%Y%m%d").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 14).unwrap()
        );
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
