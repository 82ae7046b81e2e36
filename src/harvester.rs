use reqwest::header::USER_AGENT;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::error::{Result, ScanError};
use crate::http::random_user_agent;
use crate::search_engine::{ResultLinkParser, SearchEngine};

/// Coleta links únicos percorrendo as páginas de resultado de um motor
pub struct LinkHarvester {
    client: reqwest::Client,
    engine: SearchEngine,
    parser: Box<dyn ResultLinkParser>,
    base_url: String,
    delay: Duration,
}

impl LinkHarvester {
    pub fn new(client: reqwest::Client, engine: SearchEngine) -> Self {
        Self {
            client,
            engine,
            parser: engine.parser(),
            base_url: engine.base_url().to_string(),
            delay: Duration::from_secs(2),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Pausa antes de cada página (politeness)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Busca uma página de resultados e retorna o HTML bruto
    pub async fn fetch_page(&self, query: &str, page: usize, links_per_page: usize) -> Result<String> {
        let url = self.engine.page_url(&self.base_url, query, page, links_per_page);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScanError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.text().await?)
    }

    /// Percorre até `pages` páginas acumulando links únicos.
    ///
    /// Para na primeira página que não acrescenta link novo ou na primeira
    /// falha de requisição; nesses casos devolve o que já foi coletado.
    pub async fn harvest(
        &self,
        query: &str,
        pages: usize,
        links_per_page: usize,
        max_links: Option<usize>,
    ) -> Vec<String> {
        let engine = self.engine.as_str();
        let start_time = Instant::now();
        let mut links: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        log::info!("[Harvester:{}] Iniciando coleta: {} página(s) x {} links", engine, pages, links_per_page);
        log::debug!("[Harvester:{}] Query: '{}'", engine, query);

        for page in 0..pages {
            if max_links.is_some_and(|cap| links.len() >= cap) {
                break;
            }

            tokio::time::sleep(self.delay).await;

            let html = match self.fetch_page(query, page, links_per_page).await {
                Ok(html) => html,
                Err(e) => {
                    log::warn!("[Harvester:{}] Falha na página {}: {}. Encerrando busca", engine, page + 1, e);
                    break;
                }
            };

            let before = links.len();
            for link in self.parser.parse(&html, links_per_page) {
                if seen.insert(link.clone()) {
                    links.push(link);
                }
            }

            let added = links.len() - before;
            if added == 0 {
                log::warn!("[Harvester:{}] Sem resultados novos na página {}. Encerrando busca", engine, page + 1);
                break;
            }
            log::debug!("[Harvester:{}] Página {}: +{} links ({} no total)", engine, page + 1, added, links.len());
        }

        if let Some(cap) = max_links {
            links.truncate(cap);
        }

        log::info!(
            "[Harvester:{}] Coleta concluída. Total de links extraídos: {} ({}ms)",
            engine,
            links.len(),
            start_time.elapsed().as_millis()
        );
        links
    }
}
