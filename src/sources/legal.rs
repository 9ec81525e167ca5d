//! Legal case sources: US federal opinions via the GovInfo API and an
//! opt-in EUR-Lex case-law search.
//!
//! GovInfo needs a (free) API key. The EUR-Lex adapter is a heuristic HTML
//! scan and stays disabled unless explicitly enabled in configuration.

use crate::data::models::LegalCase;
use crate::sources::{FetchOutcome, SourceAdapter, get_json, get_text};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use html_scraper::{Html, Selector};
use regex::Regex;
use serde::Deserialize;
use url::Url;

const GOVINFO_BASE: &str = "https://api.govinfo.gov";
const EURLEX_SEARCH_URL: &str = "https://eur-lex.europa.eu/search.html";

/// US federal court opinions from the GovInfo USCOURTS collection.
pub struct GovInfoAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    relevance: Regex,
}

#[derive(Debug, Deserialize)]
struct GovInfoResponse {
    #[serde(default)]
    packages: Vec<GovInfoPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GovInfoPackage {
    package_id: Option<String>,
    title: Option<String>,
    details_link: Option<String>,
    download: Option<GovInfoDownload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GovInfoDownload {
    pdf_link: Option<String>,
}

impl GovInfoAdapter {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            relevance: Regex::new(r"medical|device|fda|health|pharma|drug").expect("static regex"),
        }
    }

    fn map_packages(&self, packages: Vec<GovInfoPackage>, limit: u32) -> Vec<LegalCase> {
        let collected_on = Utc::now().date_naive();
        let mut cases = Vec::new();
        for (idx, pkg) in packages.into_iter().enumerate() {
            let Some(title) = pkg.title.filter(|t| !t.is_empty()) else {
                continue;
            };
            if !self.relevance.is_match(&title.to_lowercase()) {
                continue;
            }
            let document_url = pkg
                .download
                .and_then(|d| d.pdf_link)
                .or_else(|| pkg.details_link.clone())
                .unwrap_or_else(|| "https://www.govinfo.gov/".to_owned());
            cases.push(LegalCase {
                id: None,
                case_number: pkg.package_id.unwrap_or_else(|| format!("GOV-{idx}")),
                title: title.chars().take(200).collect(),
                court: "US Federal Court".to_owned(),
                jurisdiction: "USA".to_owned(),
                region: Some("North America".to_owned()),
                filed_date: Some(collected_on),
                status: Some("Published".to_owned()),
                description: pkg
                    .details_link
                    .or_else(|| Some("US federal court opinion (GovInfo)".to_owned())),
                document_url: Some(document_url),
                source_id: "govinfo-uscourts".to_owned(),
                case_type: Some("Regulatory / Device".to_owned()),
            });
            if cases.len() >= limit as usize {
                break;
            }
        }
        cases
    }
}

#[async_trait]
impl SourceAdapter<LegalCase> for GovInfoAdapter {
    fn name(&self) -> &'static str {
        "govinfo-uscourts"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<LegalCase>> {
        let Some(api_key) = &self.api_key else {
            return Ok(FetchOutcome::Skipped("GOVINFO_API_KEY not set"));
        };

        let year = Utc::now().year();
        let page_size = (limit * 2).min(50);
        let url = format!(
            "{GOVINFO_BASE}/collections/USCOURTS/{year}-01-01/{year}-12-31\
             ?offset=0&pageSize={page_size}&api_key={api_key}"
        );
        let response: GovInfoResponse = get_json(&self.client, &url).await?;
        Ok(FetchOutcome::Fetched(
            self.map_packages(response.packages, limit),
        ))
    }
}

/// Heuristic EUR-Lex case-law search, gated behind a configuration toggle.
pub struct EurLexAdapter {
    client: reqwest::Client,
    enabled: bool,
    year_filter: Regex,
    relevance: Regex,
    case_number: Regex,
}

impl EurLexAdapter {
    pub fn new(client: reqwest::Client, enabled: bool) -> Self {
        Self {
            client,
            enabled,
            year_filter: Regex::new(r"\b20[1-5]\d\b").expect("static regex"),
            relevance: Regex::new(r"(?i)device|medical|liability|safety").expect("static regex"),
            case_number: Regex::new(r"C-\d+").expect("static regex"),
        }
    }

    fn search_url() -> Result<Url> {
        let mut url = Url::parse(EURLEX_SEARCH_URL)?;
        url.query_pairs_mut()
            .append_pair("scope", "EURLEX")
            .append_pair("text", "medical device liability")
            .append_pair("type", "quick")
            .append_pair("lang", "en");
        Ok(url)
    }

    fn parse(&self, html: &str, limit: u32) -> Vec<LegalCase> {
        let base = Url::parse(EURLEX_SEARCH_URL).expect("static url");
        let selector = Selector::parse("a").expect("static selector");
        let document = Html::parse_document(html);
        let filed = Utc::now().date_naive();
        let mut cases = Vec::new();

        for anchor in document.select(&selector) {
            let text = anchor.text().collect::<String>().trim().to_owned();
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if text.is_empty()
                || !self.year_filter.is_match(&text)
                || !self.relevance.is_match(&text)
            {
                continue;
            }
            let url = match base.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };
            let case_number = self
                .case_number
                .find(&text)
                .map(|m| m.as_str().to_owned())
                .unwrap_or_else(|| format!("EU-{}", cases.len()));
            cases.push(LegalCase {
                id: None,
                case_number,
                title: text.chars().take(200).collect(),
                court: "CJEU / EU Courts".to_owned(),
                jurisdiction: "EU".to_owned(),
                region: Some("Europe".to_owned()),
                filed_date: Some(filed),
                status: Some("Published".to_owned()),
                description: Some("EU case law (heuristic extraction)".to_owned()),
                document_url: Some(url),
                source_id: "eurlex-search".to_owned(),
                case_type: Some("Medical Device / Liability".to_owned()),
            });
            if cases.len() >= limit as usize {
                break;
            }
        }
        cases
    }
}

#[async_trait]
impl SourceAdapter<LegalCase> for EurLexAdapter {
    fn name(&self) -> &'static str {
        "eurlex-search"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<LegalCase>> {
        if !self.enabled {
            return Ok(FetchOutcome::Skipped("ENABLE_EURLEX not set"));
        }
        let html = get_text(&self.client, Self::search_url()?.as_str()).await?;
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
    fn govinfo_filters_irrelevant_titles() {
        let adapter = GovInfoAdapter::new(client(), Some("key".into()));
        let packages = vec![
            GovInfoPackage {
                package_id: Some("USCOURTS-1".into()),
                title: Some("Smith v. Acme Medical Devices Inc.".into()),
                details_link: Some("https://www.govinfo.gov/pkg/1".into()),
                download: None,
            },
            GovInfoPackage {
                package_id: Some("USCOURTS-2".into()),
                title: Some("Tax dispute over farmland".into()),
                details_link: None,
                download: None,
            },
        ];
        let cases = adapter.map_packages(packages, 15);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].case_number, "USCOURTS-1");
        assert_eq!(cases[0].jurisdiction, "USA");
    }

    #[test]
    fn govinfo_prefers_the_pdf_download_link() {
        let adapter = GovInfoAdapter::new(client(), Some("key".into()));
        let packages = vec![GovInfoPackage {
            package_id: Some("USCOURTS-3".into()),
            title: Some("FDA enforcement appeal".into()),
            details_link: Some("https://www.govinfo.gov/pkg/3".into()),
            download: Some(GovInfoDownload {
                pdf_link: Some("https://www.govinfo.gov/pkg/3.pdf".into()),
            }),
        }];
        let cases = adapter.map_packages(packages, 15);
        assert_eq!(
            cases[0].document_url.as_deref(),
            Some("https://www.govinfo.gov/pkg/3.pdf")
        );
    }

    #[tokio::test]
    async fn govinfo_skips_without_api_key() {
        let adapter = GovInfoAdapter::new(client(), None);
        assert!(matches!(
            adapter.fetch(10).await.unwrap(),
            FetchOutcome::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn eurlex_skips_unless_enabled() {
        let adapter = EurLexAdapter::new(client(), false);
        assert!(matches!(
            adapter.fetch(10).await.unwrap(),
            FetchOutcome::Skipped(_)
        ));
    }

    #[test]
    fn eurlex_parse_extracts_case_numbers() {
        let html = r##"
            <html><body>
              <a href="/case/1">C-219 Medical device liability ruling (2023)</a>
              <a href="/case/2">Safety recall judgment 2024</a>
              <a href="/other">Unrelated press release</a>
            </body></html>
        "##;
        let adapter = EurLexAdapter::new(client(), true);
        let cases = adapter.parse(html, 15);

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].case_number, "C-219");
        assert_eq!(cases[1].case_number, "EU-1");
        assert_eq!(cases[1].court, "CJEU / EU Courts");
    }
}
