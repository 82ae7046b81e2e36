//! Tipos de erro do pipeline de varredura.
//!
//! Apenas erros de configuração e de E/S interrompem uma execução. Falhas de
//! rede, de classificação ou de resumo são registradas em log e degradadas
//! localmente por quem as recebe.

/// Erros que podem ocorrer durante uma varredura.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Configuração inválida (query vazia, contagem zerada, credencial ausente).
    #[error("config error: {0}")]
    Config(String),

    /// Falha de transporte HTTP (conexão, timeout, leitura do corpo).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Resposta HTTP com status fora da faixa aceita.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// HTML ou JSON que não pôde ser interpretado.
    #[error("parse error: {0}")]
    Parse(String),

    /// Falha na chamada ao modelo de linguagem.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Resposta do modelo fora do contrato de extração.
    #[error("schema violation: {0}")]
    Schema(String),

    /// Falha de leitura/escrita de arquivo.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ScanError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => ScanError::Http(e.to_string()),
        }
    }
}
