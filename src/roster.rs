// 🏛️ Legislator Roster - Directory fetcher
// The core only ever sees Vec<LegislatorRecord>; where it comes from is
// behind the RosterSource trait (HTTP API, JSON file, or in-memory).

use crate::config::RosterConfig;
use crate::error::PipelineError;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

// ============================================================================
// LEGISLATOR RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegislatorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub full_name: String,
    pub party_code: String,
    pub region_code: String,
}

impl LegislatorRecord {
    pub fn new(full_name: &str, party_code: &str, region_code: &str) -> Self {
        LegislatorRecord {
            id: None,
            full_name: full_name.to_string(),
            party_code: party_code.to_string(),
            region_code: region_code.to_string(),
        }
    }
}

/// Wire shape of one `dados` entry. Everything optional: incomplete
/// entries are skipped, not fatal.
#[derive(Debug, Deserialize)]
struct ApiLegislator {
    id: Option<u64>,
    nome: Option<String>,
    #[serde(rename = "siglaPartido")]
    sigla_partido: Option<String>,
    #[serde(rename = "siglaUf")]
    sigla_uf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default)]
    dados: Vec<ApiLegislator>,
    #[serde(default)]
    links: Vec<ApiLink>,
}

/// One decoded page of roster data
#[derive(Debug, Default)]
pub struct RosterPage {
    pub records: Vec<LegislatorRecord>,
    pub skipped: usize,
    pub next: Option<String>,
}

/// Accepts `{"dados": [...], "links": [...]}` or a bare `[...]`
pub fn parse_roster_page(body: &serde_json::Value) -> Result<RosterPage, PipelineError> {
    let page: ApiPage = if body.is_array() {
        ApiPage {
            dados: serde_json::from_value(body.clone()).map_err(roster_error)?,
            links: Vec::new(),
        }
    } else {
        serde_json::from_value(body.clone()).map_err(roster_error)?
    };

    let mut out = RosterPage::default();
    for entry in page.dados {
        match (entry.nome, entry.sigla_partido, entry.sigla_uf) {
            (Some(nome), Some(partido), Some(uf)) if !nome.trim().is_empty() => {
                out.records.push(LegislatorRecord {
                    id: entry.id,
                    full_name: nome,
                    party_code: partido,
                    region_code: uf,
                });
            }
            _ => out.skipped += 1,
        }
    }
    out.next = page
        .links
        .into_iter()
        .find(|l| l.rel == "next")
        .map(|l| l.href);

    Ok(out)
}

fn roster_error(err: serde_json::Error) -> PipelineError {
    PipelineError::Roster {
        message: err.to_string(),
    }
}

// ============================================================================
// ROSTER SOURCE
// ============================================================================

pub trait RosterSource {
    fn fetch_roster(&self) -> Result<Vec<LegislatorRecord>, PipelineError>;

    /// Where the roster comes from, for logs and run summaries
    fn describe(&self) -> String;
}

/// Pre-fetched roster held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoster {
    pub records: Vec<LegislatorRecord>,
}

impl InMemoryRoster {
    pub fn new(records: Vec<LegislatorRecord>) -> Self {
        InMemoryRoster { records }
    }
}

impl RosterSource for InMemoryRoster {
    fn fetch_roster(&self) -> Result<Vec<LegislatorRecord>, PipelineError> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory roster ({} entries)", self.records.len())
    }
}

/// Roster saved to disk in the API's JSON shape
#[derive(Debug, Clone)]
pub struct FileRosterSource {
    path: PathBuf,
}

impl FileRosterSource {
    pub fn new(path: &Path) -> Self {
        FileRosterSource {
            path: path.to_path_buf(),
        }
    }
}

impl RosterSource for FileRosterSource {
    fn fetch_roster(&self) -> Result<Vec<LegislatorRecord>, PipelineError> {
        if !self.path.exists() {
            return Err(PipelineError::SourceNotFound {
                path: self.path.clone(),
            });
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| PipelineError::io(format!("reading {}", self.path.display()), e))?;
        let body: serde_json::Value =
            serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(roster_error)?;
        let page = parse_roster_page(&body)?;
        if page.skipped > 0 {
            warn!("Skipped {} incomplete roster entries", page.skipped);
        }
        info!("Loaded {} legislators from {}", page.records.len(), self.path.display());
        Ok(page.records)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// Blocking client for the open-data `/deputados` endpoint.
/// Owns its connection pool; construct one per run.
pub struct HttpRosterClient {
    http: Client,
    config: RosterConfig,
}

impl HttpRosterClient {
    pub fn new(config: RosterConfig) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Network {
                url: config.base_url.clone(),
                attempts: 0,
                message: format!("building HTTP client: {}", e),
            })?;
        Ok(HttpRosterClient { http, config })
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    fn first_page_url(&self) -> String {
        let mut url = format!("{}/deputados", self.config.base_url.trim_end_matches('/'));
        if let Some(size) = self.config.page_size {
            url.push_str(&format!("?itens={}", size));
        }
        url
    }

    /// GET + JSON decode. Transport errors, 429 and 5xx are retried with a
    /// fixed delay; other statuses fail on the spot.
    fn get_json_with_retry(&self, url: &str) -> Result<serde_json::Value, PipelineError> {
        let attempts_allowed = self.config.max_retries + 1;
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts_allowed {
            debug!("GET {} (attempt {}/{})", url, attempt, attempts_allowed);

            match self.http.get(url).header(ACCEPT, "application/json").send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        match resp.text() {
                            Ok(text) => {
                                let trimmed = text.trim_start_matches('\u{feff}');
                                return serde_json::from_str(trimmed).map_err(|e| {
                                    PipelineError::Roster {
                                        message: format!(
                                            "{} (body: {})",
                                            e,
                                            trimmed.chars().take(200).collect::<String>()
                                        ),
                                    }
                                });
                            }
                            // Connection dropped mid-body: transient
                            Err(e) => last_error = format!("reading response body: {}", e),
                        }
                    } else if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("HTTP {}", status.as_u16());
                    } else {
                        return Err(PipelineError::Network {
                            url: url.to_string(),
                            attempts: attempt,
                            message: format!("HTTP {}", status.as_u16()),
                        });
                    }
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        format!("timed out after {}s", self.config.timeout_secs)
                    } else {
                        e.to_string()
                    };
                }
            }

            if attempt < attempts_allowed {
                warn!(
                    "Roster fetch attempt {}/{} failed ({}); retrying in {}ms",
                    attempt, attempts_allowed, last_error, self.config.retry_delay_ms
                );
                thread::sleep(delay);
            }
        }

        Err(PipelineError::Network {
            url: url.to_string(),
            attempts: attempts_allowed,
            message: last_error,
        })
    }
}

impl RosterSource for HttpRosterClient {
    fn fetch_roster(&self) -> Result<Vec<LegislatorRecord>, PipelineError> {
        let mut records = Vec::new();
        let mut skipped = 0;
        let mut visited = HashSet::new();
        let mut next = Some(self.first_page_url());
        let mut pages = 0u32;

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                warn!("Pagination loop detected at {}; stopping", url);
                break;
            }

            let body = self.get_json_with_retry(&url)?;
            let page = parse_roster_page(&body)?;
            pages += 1;
            skipped += page.skipped;
            records.extend(page.records);

            if self.config.follow_pagination && pages < self.config.max_pages {
                next = page.next;
            } else if page.next.is_some() {
                debug!("Not following next page after {} page(s)", pages);
            }
        }

        if skipped > 0 {
            warn!("Skipped {} incomplete roster entries", skipped);
        }
        info!("Fetched {} legislators in {} page(s)", records.len(), pages);

        Ok(records)
    }

    fn describe(&self) -> String {
        self.first_page_url()
    }
}

// ============================================================================
// ROSTER SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSummary {
    pub legislators: usize,
    pub parties: usize,
    pub regions: usize,
    /// (party_code, legislators), count desc then code asc
    pub per_party: Vec<(String, usize)>,
}

impl RosterSummary {
    pub fn from_records(records: &[LegislatorRecord]) -> Self {
        let mut per_party: BTreeMap<&str, usize> = BTreeMap::new();
        let mut regions = HashSet::new();
        for r in records {
            *per_party.entry(r.party_code.as_str()).or_default() += 1;
            regions.insert(r.region_code.as_str());
        }

        let mut per_party: Vec<(String, usize)> = per_party
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        // BTreeMap order is key asc; stable sort keeps it for equal counts
        per_party.sort_by(|a, b| b.1.cmp(&a.1));

        RosterSummary {
            legislators: records.len(),
            parties: per_party.len(),
            regions: regions.len(),
            per_party,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_api_page() {
        let body = json!({
            "dados": [
                {"id": 1, "nome": "José Silva", "siglaPartido": "PA", "siglaUf": "SP", "email": null},
                {"id": 2, "nome": "Ana Lima", "siglaPartido": "PB", "siglaUf": "RJ"},
                {"id": 3, "nome": "Sem Partido", "siglaPartido": null, "siglaUf": "MG"},
                {"id": 4, "nome": "  ", "siglaPartido": "PC", "siglaUf": "MG"}
            ],
            "links": [
                {"rel": "self", "href": "http://x/deputados?pagina=1"},
                {"rel": "next", "href": "http://x/deputados?pagina=2"}
            ]
        });

        let page = parse_roster_page(&body).unwrap();

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.skipped, 2);
        assert_eq!(page.records[0].id, Some(1));
        assert_eq!(page.records[0].full_name, "José Silva");
        assert_eq!(page.records[1].region_code, "RJ");
        assert_eq!(page.next.as_deref(), Some("http://x/deputados?pagina=2"));
    }

    #[test]
    fn test_parse_bare_array() {
        let body = json!([{"nome": "Ana", "siglaPartido": "PB", "siglaUf": "RJ"}]);
        let page = parse_roster_page(&body).unwrap();
        assert_eq!(page.records, vec![LegislatorRecord::new("Ana", "PB", "RJ")]);
        assert!(page.next.is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = parse_roster_page(&json!({"dados": "nope"})).unwrap_err();
        assert!(matches!(err, PipelineError::Roster { .. }));
    }

    #[test]
    fn test_roster_summary() {
        let records = vec![
            LegislatorRecord::new("A", "PB", "SP"),
            LegislatorRecord::new("B", "PA", "SP"),
            LegislatorRecord::new("C", "PB", "RJ"),
            LegislatorRecord::new("D", "PC", "MG"),
        ];
        let summary = RosterSummary::from_records(&records);

        assert_eq!(summary.legislators, 4);
        assert_eq!(summary.parties, 3);
        assert_eq!(summary.regions, 3);
        assert_eq!(
            summary.per_party,
            vec![
                ("PB".to_string(), 2),
                ("PA".to_string(), 1),
                ("PC".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(
            &path,
            r#"{"dados":[{"nome":"José Silva","siglaPartido":"PA","siglaUf":"SP"}]}"#,
        )
        .unwrap();

        let source = FileRosterSource::new(&path);
        let records = source.fetch_roster().unwrap();
        assert_eq!(records, vec![LegislatorRecord::new("José Silva", "PA", "SP")]);
        assert!(source.describe().contains("roster.json"));
    }

    #[test]
    fn test_file_source_missing() {
        let source = FileRosterSource::new(Path::new("/no/such/roster.json"));
        assert!(matches!(
            source.fetch_roster().unwrap_err(),
            PipelineError::SourceNotFound { .. }
        ));
    }

    #[test]
    fn test_first_page_url() {
        let client = HttpRosterClient::new(RosterConfig {
            base_url: "http://localhost:1234/api/v2/".to_string(),
            page_size: Some(100),
            ..RosterConfig::default()
        })
        .unwrap();
        assert_eq!(client.describe(), "http://localhost:1234/api/v2/deputados?itens=100");
    }
}
