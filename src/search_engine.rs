use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Enum para identificar os motores de busca suportados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchEngine {
    /// Google, resultados dentro de `div.g`
    Google,
    /// Google sem contêineres: toda âncora da página é candidata
    GoogleLite,
    /// Bing, resultados dentro de `li.b_algo`
    #[default]
    Bing,
}

impl std::str::FromStr for SearchEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(SearchEngine::Google),
            "google-lite" | "google_lite" => Ok(SearchEngine::GoogleLite),
            "bing" => Ok(SearchEngine::Bing),
            other => Err(format!("unknown search engine: {}", other)),
        }
    }
}

impl SearchEngine {
    /// Retorna nome do motor como string
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Google => "Google",
            SearchEngine::GoogleLite => "GoogleLite",
            SearchEngine::Bing => "Bing",
        }
    }

    /// Retorna URL base de busca
    pub fn base_url(&self) -> &'static str {
        match self {
            SearchEngine::Google | SearchEngine::GoogleLite => "https://www.google.com/search",
            SearchEngine::Bing => "https://www.bing.com/search",
        }
    }

    /// Deslocamento de paginação (ambos os motores andam de 10 em 10)
    pub fn page_offset(&self, page: usize) -> usize {
        page * 10
    }

    /// Monta a URL da página `page` (base 0) de resultados
    pub fn page_url(&self, base_url: &str, query: &str, page: usize, links_per_page: usize) -> String {
        let offset = self.page_offset(page);
        let q = urlencoding::encode(query.trim());
        match self {
            SearchEngine::Google | SearchEngine::GoogleLite => {
                format!("{}?q={}&start={}", base_url, q, offset)
            }
            SearchEngine::Bing => format!(
                "{}?q={}&first={}&count={}&setlang=pt-br&cc=BR&mkt=pt-BR",
                base_url, q, offset, links_per_page
            ),
        }
    }

    /// Parser de resultados adequado à marcação do motor
    pub fn parser(&self) -> Box<dyn ResultLinkParser> {
        match self {
            SearchEngine::Google => Box::new(ContainerParser::new("div.g")),
            SearchEngine::GoogleLite => Box::new(AnchorListParser),
            SearchEngine::Bing => Box::new(ContainerParser::new("li.b_algo")),
        }
    }
}

/// Extrai os links de saída de uma página de resultados.
///
/// A saída é ordenada pela primeira aparição, sem repetições, restrita a
/// `http`/`https` e limitada a `max_links` itens.
pub trait ResultLinkParser: Send + Sync {
    fn parse(&self, html: &str, max_links: usize) -> Vec<String>;
}

/// Formato "lista de âncoras": qualquer `a[href]` do documento
pub struct AnchorListParser;

impl ResultLinkParser for AnchorListParser {
    fn parse(&self, html: &str, max_links: usize) -> Vec<String> {
        let Ok(anchor) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        let hrefs = document
            .select(&anchor)
            .filter_map(|a| a.value().attr("href"));

        collect_unique(hrefs, max_links)
    }
}

/// Formato "contêiner": primeira âncora de cada bloco de resultado
pub struct ContainerParser {
    container: &'static str,
}

impl ContainerParser {
    pub fn new(container: &'static str) -> Self {
        Self { container }
    }
}

impl ResultLinkParser for ContainerParser {
    fn parse(&self, html: &str, max_links: usize) -> Vec<String> {
        let (container, anchor) = match (Selector::parse(self.container), Selector::parse("a[href]")) {
            (Ok(c), Ok(a)) => (c, a),
            _ => {
                log::warn!("Selector inválido para contêiner de resultado: {}", self.container);
                return Vec::new();
            }
        };
        let document = Html::parse_document(html);
        let hrefs = document
            .select(&container)
            .filter_map(|node| node.select(&anchor).next())
            .filter_map(|a| a.value().attr("href"));

        collect_unique(hrefs, max_links)
    }
}

fn collect_unique<'a>(hrefs: impl Iterator<Item = &'a str>, max_links: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        if links.len() >= max_links {
            break;
        }
        if let Some(url) = resolve_result_href(href) {
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }
    }
    links
}

/// Resolve o wrapper de redirecionamento (`/url?q=...`) e valida o esquema
pub fn resolve_result_href(href: &str) -> Option<String> {
    let href = href.trim();
    let candidate = if href.starts_with("/url?") {
        let wrapped = Url::parse(&format!("https://www.google.com{}", href)).ok()?;
        wrapped
            .query_pairs()
            .find(|(key, _)| key == "q" || key == "url")
            .map(|(_, value)| value.into_owned())?
    } else {
        href.to_string()
    };

    if is_http_url(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// `true` apenas para URLs absolutas `http`/`https` com host
pub fn is_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}
