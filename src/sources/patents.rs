//! Patent sources: USPTO Open Data grants, the PatentsView search API and
//! the Lens.org GraphQL API.
//!
//! PatentsView and Lens.org require API credentials; without them the
//! adapters report a skip so scheduled runs degrade to the open sources.

use crate::data::models::Patent;
use crate::sources::{FetchOutcome, OneOrMany, SourceAdapter, get_json, parse_json_with_context};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use url::Url;

const USPTO_GRANTS_URL: &str = "https://developer.uspto.gov/ibd-api/v1/application/grants";
const USPTO_SEARCH_TEXT: &str = "medical device implant diagnostic surgical";
const PATENTSVIEW_URL: &str = "https://search.patentsview.org/api/v1/patents/query";
const LENS_GRAPHQL_URL: &str = "https://api.lens.org/graphql";

/// Title keywords used for the PatentsView relevance query.
const PATENTSVIEW_KEYWORDS: [&str; 5] = [
    "medical device",
    "in vitro diagnostic",
    "implantable",
    "surgical instrument",
    "wearable sensor",
];

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Granted patents from the USPTO Open Data Portal (no credentials needed).
pub struct UsptoOpenDataAdapter {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UsptoGrantsResponse {
    response: Option<UsptoGrantsDocs>,
    results: Option<Vec<UsptoGrant>>,
}

#[derive(Debug, Deserialize)]
struct UsptoGrantsDocs {
    #[serde(default)]
    docs: Vec<UsptoGrant>,
}

impl UsptoGrantsResponse {
    /// The portal has served both envelope shapes over time.
    fn into_docs(self) -> Vec<UsptoGrant> {
        match self.response {
            Some(r) => r.docs,
            None => self.results.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsptoGrant {
    patent_number: Option<String>,
    publication_number: Option<String>,
    invention_title: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    assignee_name: Option<String>,
    applicant_name: Option<String>,
    inventor_name: Option<OneOrMany<String>>,
    grant_date: Option<String>,
    publication_date: Option<String>,
    filing_date: Option<String>,
    application_date: Option<String>,
    cpc_classification_code: Option<OneOrMany<String>>,
}

impl UsptoOpenDataAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter<Patent> for UsptoOpenDataAdapter {
    fn name(&self) -> &'static str {
        "uspto_open_data"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<Patent>> {
        let mut url = Url::parse(USPTO_GRANTS_URL).context("invalid USPTO grants URL")?;
        url.query_pairs_mut()
            .append_pair("searchText", USPTO_SEARCH_TEXT)
            .append_pair("start", "0")
            .append_pair("rows", &limit.to_string());

        let response: UsptoGrantsResponse = get_json(&self.client, url.as_str()).await?;
        let patents = response
            .into_docs()
            .into_iter()
            .filter_map(|doc| {
                let publication_number =
                    doc.patent_number.or(doc.publication_number)?;
                let title = doc
                    .invention_title
                    .or(doc.title)
                    .unwrap_or_else(|| "Untitled Patent".to_owned());
                Some(Patent {
                    id: None,
                    document_url: Some(format!(
                        "https://patft.uspto.gov/netacgi/nph-Parser?patentnumber={publication_number}"
                    )),
                    publication_number,
                    title,
                    abstract_text: doc.abstract_text,
                    applicant: doc.assignee_name.or(doc.applicant_name),
                    inventors: doc.inventor_name.map(OneOrMany::into_vec).unwrap_or_default(),
                    publication_date: doc
                        .grant_date
                        .or(doc.publication_date)
                        .as_deref()
                        .and_then(parse_date),
                    filing_date: doc
                        .filing_date
                        .or(doc.application_date)
                        .as_deref()
                        .and_then(parse_date),
                    status: Some("granted".to_owned()),
                    jurisdiction: Some("US".to_owned()),
                    cpc_codes: doc
                        .cpc_classification_code
                        .map(OneOrMany::into_vec)
                        .unwrap_or_default(),
                    source: Some("USPTO Open Data".to_owned()),
                })
            })
            .collect();

        Ok(FetchOutcome::Fetched(patents))
    }
}

/// US patents via the PatentsView search API (requires an API key).
pub struct PatentsViewAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PatentsViewResponse {
    #[serde(default)]
    patents: Vec<PatentsViewPatent>,
}

#[derive(Debug, Deserialize)]
struct PatentsViewPatent {
    patent_number: Option<String>,
    patent_title: Option<String>,
    patent_date: Option<String>,
    application_date: Option<String>,
    patent_abstract: Option<String>,
    #[serde(default)]
    assignees: Vec<PatentsViewAssignee>,
    #[serde(default)]
    inventors: Vec<PatentsViewInventor>,
    #[serde(default)]
    cpcs: Vec<PatentsViewCpc>,
}

#[derive(Debug, Deserialize)]
struct PatentsViewAssignee {
    assignee_organization: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PatentsViewInventor {
    inventor_first_name: Option<String>,
    inventor_last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PatentsViewCpc {
    cpc_group_id: Option<String>,
}

impl PatentsViewAdapter {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    fn query_url(&self, limit: u32) -> Result<Url> {
        let q = serde_json::json!({
            "_or": PATENTSVIEW_KEYWORDS
                .iter()
                .map(|k| serde_json::json!({ "_text_all": { "patent_title": k } }))
                .collect::<Vec<_>>()
        });
        let f = serde_json::json!([
            "patent_number",
            "patent_title",
            "patent_date",
            "application_date",
            "assignee_organization",
            "inventor_first_name",
            "inventor_last_name",
            "cpc_group_id",
            "patent_abstract"
        ]);
        let o = serde_json::json!({ "per_page": limit, "page": 1 });

        let mut url = Url::parse(PATENTSVIEW_URL).context("invalid PatentsView URL")?;
        url.query_pairs_mut()
            .append_pair("q", &q.to_string())
            .append_pair("f", &f.to_string())
            .append_pair("o", &o.to_string());
        Ok(url)
    }
}

#[async_trait]
impl SourceAdapter<Patent> for PatentsViewAdapter {
    fn name(&self) -> &'static str {
        "patentsview"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<Patent>> {
        let Some(api_key) = &self.api_key else {
            return Ok(FetchOutcome::Skipped("PATENTSVIEW_API_KEY not set"));
        };

        let url = self.query_url(limit)?;
        let body = self
            .client
            .get(url)
            .header("X-Api-Key", api_key)
            .send()
            .await
            .context("PatentsView request failed")?
            .error_for_status()
            .context("PatentsView returned an error status")?
            .text()
            .await
            .context("failed to read PatentsView response")?;
        let response: PatentsViewResponse = parse_json_with_context(&body)?;

        let patents = response
            .patents
            .into_iter()
            .filter_map(|item| {
                let publication_number = item.patent_number?;
                let inventors = item
                    .inventors
                    .iter()
                    .filter_map(|inv| {
                        let name = [
                            inv.inventor_first_name.as_deref(),
                            inv.inventor_last_name.as_deref(),
                        ]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ");
                        (!name.is_empty()).then_some(name)
                    })
                    .collect();
                Some(Patent {
                    id: None,
                    document_url: Some(format!(
                        "https://patents.google.com/patent/US{publication_number}"
                    )),
                    title: item
                        .patent_title
                        .unwrap_or_else(|| "Untitled Patent".to_owned()),
                    abstract_text: item.patent_abstract,
                    applicant: item
                        .assignees
                        .into_iter()
                        .find_map(|a| a.assignee_organization),
                    inventors,
                    publication_date: item.patent_date.as_deref().and_then(parse_date),
                    filing_date: item.application_date.as_deref().and_then(parse_date),
                    status: Some("granted".to_owned()),
                    jurisdiction: Some("US".to_owned()),
                    cpc_codes: item.cpcs.into_iter().filter_map(|c| c.cpc_group_id).collect(),
                    source: Some("USPTO PatentsView".to_owned()),
                    publication_number,
                })
            })
            .collect();

        Ok(FetchOutcome::Fetched(patents))
    }
}

/// Worldwide patents via the Lens.org GraphQL API (requires a token).
pub struct LensAdapter {
    client: reqwest::Client,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LensResponse {
    data: Option<LensData>,
}

#[derive(Debug, Deserialize)]
struct LensData {
    #[serde(rename = "searchPatents")]
    search_patents: Option<LensPatents>,
}

#[derive(Debug, Deserialize)]
struct LensPatents {
    #[serde(default)]
    patents: Vec<LensPatent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LensPatent {
    publication_number: Option<String>,
    title: Option<String>,
    application_date: Option<String>,
    publication_date: Option<String>,
}

impl LensAdapter {
    pub fn new(client: reqwest::Client, api_token: Option<String>) -> Self {
        Self { client, api_token }
    }
}

#[async_trait]
impl SourceAdapter<Patent> for LensAdapter {
    fn name(&self) -> &'static str {
        "lens"
    }

    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<Patent>> {
        let Some(token) = &self.api_token else {
            return Ok(FetchOutcome::Skipped("LENS_API_TOKEN not set"));
        };

        let query = serde_json::json!({
            "query": "query Search($query: String!, $limit: Int!) { \
                searchPatents(query: $query, limit: $limit) { \
                    patents { publicationNumber title applicationDate publicationDate } } }",
            "variables": { "query": "medical device", "limit": limit },
        });
        let body = self
            .client
            .post(LENS_GRAPHQL_URL)
            .bearer_auth(token)
            .json(&query)
            .send()
            .await
            .context("Lens.org request failed")?
            .error_for_status()
            .context("Lens.org returned an error status")?
            .text()
            .await
            .context("failed to read Lens.org response")?;
        let response: LensResponse = parse_json_with_context(&body)?;

        let items = response
            .data
            .and_then(|d| d.search_patents)
            .map(|p| p.patents)
            .unwrap_or_default();
        let patents = items
            .into_iter()
            .filter_map(|item| {
                let publication_number = item.publication_number?;
                let jurisdiction = publication_number
                    .starts_with("US")
                    .then(|| "US".to_owned());
                Some(Patent {
                    id: None,
                    title: item.title.unwrap_or_else(|| "Untitled".to_owned()),
                    abstract_text: None,
                    applicant: None,
                    inventors: Vec::new(),
                    filing_date: item.application_date.as_deref().and_then(parse_date),
                    publication_date: item.publication_date.as_deref().and_then(parse_date),
                    status: Some("unknown".to_owned()),
                    jurisdiction,
                    cpc_codes: Vec::new(),
                    document_url: None,
                    source: Some("Lens.org".to_owned()),
                    publication_number,
                })
            })
            .collect();

        Ok(FetchOutcome::Fetched(patents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uspto_response_accepts_both_envelopes() {
        let nested = r#"{"response": {"docs": [{"patentNumber": "US123"}]}}"#;
        let response: UsptoGrantsResponse = parse_json_with_context(nested).unwrap();
        assert_eq!(response.into_docs().len(), 1);

        let flat = r#"{"results": [{"patentNumber": "US123"}, {"patentNumber": "US456"}]}"#;
        let response: UsptoGrantsResponse = parse_json_with_context(flat).unwrap();
        assert_eq!(response.into_docs().len(), 2);
    }

    #[test]
    fn uspto_grant_accepts_scalar_or_array_inventors() {
        let body = r#"{"patentNumber": "US1", "inventorName": "Ada Lovelace"}"#;
        let grant: UsptoGrant = parse_json_with_context(body).unwrap();
        assert_eq!(
            grant.inventor_name.unwrap().into_vec(),
            vec!["Ada Lovelace"]
        );

        let body = r#"{"patentNumber": "US1", "inventorName": ["Ada", "Grace"]}"#;
        let grant: UsptoGrant = parse_json_with_context(body).unwrap();
        assert_eq!(grant.inventor_name.unwrap().into_vec().len(), 2);
    }

    #[tokio::test]
    async fn credential_gated_adapters_skip_without_configuration() {
        let client = reqwest::Client::new();

        let lens = LensAdapter::new(client.clone(), None);
        assert!(matches!(
            lens.fetch(10).await.unwrap(),
            FetchOutcome::Skipped(_)
        ));

        let pv = PatentsViewAdapter::new(client, None);
        assert!(matches!(
            pv.fetch(10).await.unwrap(),
            FetchOutcome::Skipped(_)
        ));
    }

    #[test]
    fn patentsview_url_encodes_the_query_documents() {
        let adapter = PatentsViewAdapter::new(reqwest::Client::new(), Some("k".into()));
        let url = adapter.query_url(25).unwrap();
        let q: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(q.iter().any(|(k, v)| k == "q" && v.contains("_text_all")));
        assert!(q.iter().any(|(k, v)| k == "o" && v.contains("\"per_page\":25")));
    }
}
