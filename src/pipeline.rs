use chrono::{Local, Timelike};
use std::time::{Duration, Instant};

use crate::aggregator::RiskAggregator;
use crate::article_fetcher::ArticleFetcher;
use crate::block_detector::BlockDetector;
use crate::config::{AppConfig, SearchSettings};
use crate::error::{Result, ScanError};
use crate::extractor::ArticleExtractor;
use crate::harvester::LinkHarvester;
use crate::http::build_scraping_client;
use crate::llm::{LanguageModel, LlmProvider};
use crate::report::{HarvestSnapshot, Report, SearchQuery};
use crate::search_engine::SearchEngine;

/// Parâmetros de uma varredura (padrões vêm de `AppConfig.search`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub engine: SearchEngine,
    pub pages: usize,
    pub links_per_page: usize,
    pub max_links: Option<usize>,
    pub keyword_expansion: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

impl RunOptions {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            engine: settings.engine,
            pages: settings.pages,
            links_per_page: settings.links_per_page,
            max_links: settings.max_links,
            keyword_expansion: settings.keyword_expansion,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages == 0 {
            return Err(ScanError::Config("page count must be greater than 0".into()));
        }
        if self.links_per_page == 0 {
            return Err(ScanError::Config("links per page must be greater than 0".into()));
        }
        if self.max_links == Some(0) {
            return Err(ScanError::Config("max links must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Resultado de uma varredura: relatório e registro de coleta
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub snapshot: HarvestSnapshot,
}

/// Executa busca → download → classificação → consolidação
pub struct PipelineRunner<'a, M: LanguageModel> {
    config: &'a AppConfig,
    model: M,
}

impl<'a> PipelineRunner<'a, LlmProvider> {
    /// Runner com o provedor configurado; credenciais ausentes falham aqui
    pub fn from_config(config: &'a AppConfig) -> Result<Self> {
        let model = LlmProvider::from_settings(&config.llm)?;
        Ok(Self::new(config, model))
    }
}

impl<'a, M: LanguageModel> PipelineRunner<'a, M> {
    pub fn new(config: &'a AppConfig, model: M) -> Self {
        Self { config, model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn run(&self, subject: &str, options: &RunOptions) -> Result<RunOutcome> {
        let query = SearchQuery::new(subject)?.with_keyword_expansion(options.keyword_expansion);
        options.validate()?;

        let search = &self.config.search;
        let delay = Duration::from_millis(search.request_delay_ms);
        let client = build_scraping_client(search.timeout_secs)?;

        let start_time = Instant::now();
        // Resolução de segundos, a mesma do formato gravado
        let now = Local::now().naive_local();
        let queried_at = now.with_nanosecond(0).unwrap_or(now);
        log::info!(
            "[Pipeline] Iniciando varredura (motor: {}, {} página(s))",
            options.engine.as_str(),
            options.pages
        );
        log::debug!("[Pipeline] Sujeito: '{}'", query.subject());

        let mut harvester = LinkHarvester::new(client.clone(), options.engine).with_delay(delay);
        if let Some(base_url) = &search.base_url {
            harvester = harvester.with_base_url(base_url.clone());
        }
        let links = harvester
            .harvest(&query.search_text(), options.pages, options.links_per_page, options.max_links)
            .await;

        let fetcher = ArticleFetcher::new(client, BlockDetector::from_settings(&self.config.blocking)).with_delay(delay);
        let articles = fetcher.fetch_and_filter(&links).await;
        let snapshot = HarvestSnapshot::new(query.subject(), queried_at, &articles);

        let classifications = ArticleExtractor::new(&self.model)
            .classify_all(&articles, query.subject())
            .await;

        let report = RiskAggregator::new(&self.model)
            .aggregate(query.subject(), queried_at, classifications)
            .await;

        log::info!(
            "[Pipeline] Varredura concluída: {} links, risco {} ({}ms)",
            links.len(),
            report.overall_risk,
            start_time.elapsed().as_millis()
        );

        Ok(RunOutcome { report, snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FunctionSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Conta chamadas; qualquer chamada indica uso indevido do modelo
    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    impl LanguageModel for CountingModel {
        async fn extract(&self, _system_prompt: &str, _user_text: &str, _function: &FunctionSpec) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ScanError::Llm("unexpected".into()))
        }

        async fn complete(&self, _system_prompt: &str, _user_text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ScanError::Llm("unexpected".into()))
        }
    }

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        // Porta fechada: qualquer acesso à rede falharia
        config.search.base_url = Some("http://127.0.0.1:1/search".into());
        config.search.request_delay_ms = 0;
        config
    }

    #[tokio::test]
    async fn empty_query_fails_before_network() {
        let config = offline_config();
        let runner = PipelineRunner::new(&config, CountingModel::default());
        let result = runner.run("  ", &RunOptions::default()).await;
        assert!(matches!(result, Err(ScanError::Config(_))));
        assert_eq!(runner.model().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_pages_is_a_config_error() {
        let config = offline_config();
        let runner = PipelineRunner::new(&config, CountingModel::default());
        let options = RunOptions {
            pages: 0,
            ..RunOptions::default()
        };
        assert!(matches!(runner.run("Fulano", &options).await, Err(ScanError::Config(_))));

        let options = RunOptions {
            links_per_page: 0,
            ..RunOptions::default()
        };
        assert!(matches!(runner.run("Fulano", &options).await, Err(ScanError::Config(_))));
    }

    #[test]
    fn missing_credentials_fail_at_construction() {
        let config = AppConfig::default();
        assert!(matches!(PipelineRunner::from_config(&config), Err(ScanError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_search_degrades_to_empty_report() {
        let config = offline_config();
        let runner = PipelineRunner::new(&config, CountingModel::default());
        let options = RunOptions {
            pages: 1,
            ..RunOptions::default()
        };

        let outcome = runner.run("Fulano", &options).await.expect("best-effort report");
        assert!(outcome.report.classifications.is_empty());
        assert_eq!(outcome.report.overall_risk.as_str(), "baixo");
        assert_eq!(outcome.report.crime_summary, "");
        assert!(outcome.snapshot.artigos.is_empty());
        assert_eq!(outcome.snapshot.consulta, "Fulano");
        assert_eq!(runner.model().calls.load(Ordering::SeqCst), 0);
    }
}
