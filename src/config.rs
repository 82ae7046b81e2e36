use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::block_detector::{DEFAULT_BLOCKED_DOMAINS, DEFAULT_BLOCK_PHRASES};
use crate::error::{Result, ScanError};
use crate::search_engine::SearchEngine;

/// Parâmetros de coleta de links e de download de artigos
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SearchSettings {
    #[serde(default)]
    pub engine: SearchEngine,
    #[serde(default = "default_pages")]
    pub pages: usize,
    #[serde(default = "default_links_per_page")]
    pub links_per_page: usize,
    #[serde(default)]
    pub max_links: Option<usize>,
    /// Pausa fixa antes de cada requisição (busca e artigos)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Anexa os termos de PLD à busca (o sujeito enviado ao modelo não muda)
    #[serde(default = "default_true")]
    pub keyword_expansion: bool,
    /// Substitui a URL base do motor (servidores de teste, proxies)
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            engine: SearchEngine::default(),
            pages: default_pages(),
            links_per_page: default_links_per_page(),
            max_links: None,
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            keyword_expansion: true,
            base_url: None,
        }
    }
}

/// Listas usadas pelo detector de bloqueio
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockingSettings {
    #[serde(default = "default_blocked_domains")]
    pub domains: Vec<String>,
    #[serde(default = "default_block_phrases")]
    pub phrases: Vec<String>,
}

impl Default for BlockingSettings {
    fn default() -> Self {
        Self {
            domains: default_blocked_domains(),
            phrases: default_block_phrases(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    #[default]
    AzureOpenai,
    Ollama,
}

/// Credenciais e endpoint do modelo de linguagem.
///
/// A chave de API nunca é gravada em disco nem aparece no `Debug`.
#[derive(Serialize, Deserialize, Clone)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProviderKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            endpoint: None,
            api_key: None,
            api_version: default_api_version(),
            deployment: None,
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmSettings {
    /// Verifica se há credenciais suficientes para o provedor escolhido
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ScanError::Config("llm.timeout_secs must be greater than 0".into()));
        }
        match self.provider {
            LlmProviderKind::AzureOpenai => {
                if is_blank(&self.api_key) {
                    return Err(ScanError::Config("missing Azure OpenAI API key".into()));
                }
                if is_blank(&self.endpoint) {
                    return Err(ScanError::Config("missing Azure OpenAI endpoint".into()));
                }
                if is_blank(&self.deployment) {
                    return Err(ScanError::Config("missing Azure OpenAI deployment".into()));
                }
            }
            LlmProviderKind::Ollama => {
                if self.model.trim().is_empty() {
                    return Err(ScanError::Config("missing Ollama model name".into()));
                }
            }
        }
        Ok(())
    }
}

/// Configuração completa, construída uma vez no início do processo
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub blocking: BlockingSettings,
    #[serde(default)]
    pub llm: LlmSettings,
}

impl AppConfig {
    /// Aplica as variáveis de ambiente de credenciais sobre o arquivo
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("AZURE_OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = non_empty("AZURE_OPENAI_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Some(version) = non_empty("AZURE_OPENAI_API_VERSION") {
            self.llm.api_version = version;
        }
        if let Some(deployment) = non_empty("AZURE_OPENAI_DEPLOYMENT") {
            self.llm.deployment = Some(deployment);
        }
        if self.llm.provider == LlmProviderKind::Ollama {
            if let Some(host) = non_empty("OLLAMA_HOST") {
                self.llm.endpoint = Some(host);
            }
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

fn default_pages() -> usize {
    5
}

fn default_links_per_page() -> usize {
    10
}

fn default_request_delay_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_blocked_domains() -> Vec<String> {
    DEFAULT_BLOCKED_DOMAINS.iter().map(|s| s.to_string()).collect()
}

fn default_block_phrases() -> Vec<String> {
    DEFAULT_BLOCK_PHRASES.iter().map(|s| s.to_string()).collect()
}

/// Caminho padrão do config.json no diretório de configuração do usuário
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pld-scanner").join("config.json"))
}

/// Carrega a configuração do arquivo.
/// Se o arquivo não existir, retorna a configuração padrão.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        log::info!("{} não encontrado, usando configuração padrão", path.display());
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)
        .map_err(|e| ScanError::Config(format!("failed to parse {}: {}", path.display(), e)))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("config.json")).expect("defaults");
        assert_eq!(config.search.pages, 5);
        assert_eq!(config.search.links_per_page, 10);
        assert_eq!(config.search.request_delay_ms, 2000);
        assert!(config.blocking.phrases.iter().any(|p| p == "captcha"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"search": {"engine": "google", "pages": 2}}"#).expect("write");

        let config = load_config(&path).expect("parse");
        assert_eq!(config.search.engine, SearchEngine::Google);
        assert_eq!(config.search.pages, 2);
        assert_eq!(config.search.links_per_page, 10);
        assert_eq!(config.llm.provider, LlmProviderKind::AzureOpenai);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(load_config(&path), Err(ScanError::Config(_))));
    }

    #[test]
    fn api_key_is_read_but_never_serialized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"llm": {"api_key": "super-secret", "deployment": "d"}}"#).expect("write");

        let config = load_config(&path).expect("parse");
        assert_eq!(config.llm.api_key.as_deref(), Some("super-secret"));

        let rendered = serde_json::to_string(&config).expect("ser");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("\"deployment\":\"d\""));
    }

    #[test]
    fn env_overrides_credentials() {
        let env: HashMap<&str, &str> = [
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt4o-prod"),
            ("AZURE_OPENAI_API_VERSION", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("k"));
        assert_eq!(config.llm.deployment.as_deref(), Some("gpt4o-prod"));
        assert_eq!(config.llm.api_version, "2024-02-01");
        assert!(config.llm.validate().is_ok());
    }

    #[test]
    fn azure_without_key_is_rejected() {
        let settings = LlmSettings {
            endpoint: Some("https://example.openai.azure.com".into()),
            deployment: Some("d".into()),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn debug_redacts_api_key() {
        let settings = LlmSettings {
            api_key: Some("super-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
