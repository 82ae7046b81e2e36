use url::Url;

use crate::config::BlockingSettings;

/// Domínios de baixo valor informativo ou que bloqueiam automação
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "google.com",
    "google.se",
    "youtube.com",
    "facebook.com",
    "instagram.com",
    "transfermarkt.co",
    "twitter.com",
    "tiktok.com",
    "linkedin.com",
    "wikipedia.org",
];

/// Frases de páginas anti-robô / que exigem JavaScript
pub const DEFAULT_BLOCK_PHRASES: &[&str] = &[
    "enable javascript",
    "ativar javascript",
    "automated requests",
    "captcha",
    "verify you are human",
    "zscaler to protect",
];

/// Motivo pelo qual um artigo foi descartado
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Domain(String),
    Phrase(String),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Domain(d) => write!(f, "domínio bloqueado ({})", d),
            BlockReason::Phrase(p) => write!(f, "bloqueio de automação detectado ({})", p),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockDetector {
    domains: Vec<String>,
    phrases: Vec<String>,
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_BLOCKED_DOMAINS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_BLOCK_PHRASES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl BlockDetector {
    /// Entradas vazias são descartadas (casariam com qualquer link ou texto)
    pub fn new(domains: Vec<String>, phrases: Vec<String>) -> Self {
        Self {
            domains: normalize(domains),
            phrases: normalize(phrases),
        }
    }

    pub fn from_settings(settings: &BlockingSettings) -> Self {
        Self::new(settings.domains.clone(), settings.phrases.clone())
    }

    /// Verifica se o host do link contém algum domínio bloqueado.
    /// Links sem host legível são comparados por inteiro.
    pub fn blocked_domain(&self, link: &str) -> Option<&str> {
        let haystack = Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_else(|| link.to_lowercase());

        self.domains
            .iter()
            .find(|domain| haystack.contains(domain.as_str()))
            .map(String::as_str)
    }

    /// Procura frases anti-automação no conteúdo (sem diferenciar maiúsculas)
    pub fn blocking_phrase(&self, content: &str) -> Option<&str> {
        let lower = content.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| lower.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Resultado combinado: domínio primeiro, depois conteúdo
    pub fn check(&self, link: &str, content: &str) -> Option<BlockReason> {
        if let Some(domain) = self.blocked_domain(link) {
            return Some(BlockReason::Domain(domain.to_string()));
        }
        self.blocking_phrase(content)
            .map(|phrase| BlockReason::Phrase(phrase.to_string()))
    }
}

fn normalize(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captcha_in_any_case_is_blocked() {
        let detector = BlockDetector::default();
        let content = "Notícia sobre lavagem de dinheiro. Please solve the CaPtChA to continue.";
        assert_eq!(
            detector.check("https://news.example/a", content),
            Some(BlockReason::Phrase("captcha".into()))
        );
    }

    #[test]
    fn denylisted_host_blocks_benign_content() {
        let detector = BlockDetector::default();
        let reason = detector.check("https://pt.wikipedia.org/wiki/Fulano", "Biografia comum.");
        assert_eq!(reason, Some(BlockReason::Domain("wikipedia.org".into())));

        assert!(detector.blocked_domain("https://m.youtube.com/watch?v=1").is_some());
        assert!(detector.blocked_domain("https://www.tiktok.com/@x").is_some());
    }

    #[test]
    fn domain_match_uses_host_not_path() {
        let detector = BlockDetector::default();
        assert!(detector
            .blocked_domain("https://g1.globo.com/ver-no-youtube.com-video")
            .is_none());
    }

    #[test]
    fn clean_article_passes() {
        let detector = BlockDetector::default();
        assert_eq!(
            detector.check("https://www.conjur.com.br/x", "Réu condenado por corrupção ativa."),
            None
        );
    }

    #[test]
    fn empty_content_only_checks_domain() {
        let detector = BlockDetector::default();
        // Antes do download o conteúdo está vazio: só o domínio pesa
        assert_eq!(detector.check("https://news.example/a", ""), None);
        assert_eq!(
            detector.check("https://www.facebook.com/p", ""),
            Some(BlockReason::Domain("facebook.com".into()))
        );
    }

    #[test]
    fn blank_entries_are_ignored() {
        let detector = BlockDetector::new(vec!["  ".into()], vec![String::new()]);
        assert_eq!(detector.check("https://news.example/a", "qualquer texto"), None);
    }

    #[test]
    fn reason_display_names_the_match() {
        assert_eq!(BlockReason::Domain("youtube.com".into()).to_string(), "domínio bloqueado (youtube.com)");
        assert_eq!(
            BlockReason::Phrase("captcha".into()).to_string(),
            "bloqueio de automação detectado (captcha)"
        );
    }

    #[test]
    fn custom_lists_are_lowercased() {
        let detector = BlockDetector::new(vec!["Exemplo.COM".into()], vec!["Acesso Negado".into()]);
        assert!(detector.blocked_domain("https://www.exemplo.com/a").is_some());
        assert!(detector.blocking_phrase("ACESSO NEGADO pelo firewall").is_some());
    }
}
