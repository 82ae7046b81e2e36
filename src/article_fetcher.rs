use reqwest::header::USER_AGENT;
use std::time::{Duration, Instant};

use crate::block_detector::BlockDetector;
use crate::error::{Result, ScanError};
use crate::http::random_user_agent;
use crate::report::RawArticle;
use crate::sanitizer::extract_clean_text;

/// Baixa e limpa o conteúdo de cada link coletado, um por vez
pub struct ArticleFetcher {
    client: reqwest::Client,
    detector: BlockDetector,
    delay: Duration,
}

impl ArticleFetcher {
    pub fn new(client: reqwest::Client, detector: BlockDetector) -> Self {
        Self {
            client,
            detector,
            delay: Duration::from_secs(2),
        }
    }

    /// Pausa antes de cada requisição (politeness)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn fetch_html(&self, link: &str) -> Result<String> {
        let response = self
            .client
            .get(link)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                status: status.as_u16(),
                url: link.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Baixa um link. Qualquer falha ou bloqueio vira conteúdo vazio.
    pub async fn fetch_article(&self, link: &str) -> RawArticle {
        // Antes do download só o domínio pode bloquear
        if let Some(reason) = self.detector.check(link, "") {
            log::info!("Ignorando {}: {}", link, reason);
            return RawArticle::empty(link);
        }

        tokio::time::sleep(self.delay).await;

        let start_time = Instant::now();
        let html = match self.fetch_html(link).await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("Erro ao acessar {}: {} ({}ms)", link, e, start_time.elapsed().as_millis());
                return RawArticle::empty(link);
            }
        };

        let content = extract_clean_text(&html);

        if let Some(reason) = self.detector.check(link, &content) {
            log::info!("Ignorando {}: {}", link, reason);
            return RawArticle::empty(link);
        }

        log::debug!(
            "Conteúdo extraído de {}: {} caracteres ({}ms)",
            link,
            content.chars().count(),
            start_time.elapsed().as_millis()
        );

        RawArticle {
            link: link.to_string(),
            content,
        }
    }

    /// Um artigo por link, na mesma ordem da entrada
    pub async fn fetch_and_filter(&self, links: &[String]) -> Vec<RawArticle> {
        let mut articles = Vec::with_capacity(links.len());

        for link in links {
            articles.push(self.fetch_article(link).await);
        }

        let with_content = articles.iter().filter(|a| a.has_content()).count();
        log::info!("Extraídas {} de {} fontes com conteúdo", with_content, articles.len());
        articles
    }
}
