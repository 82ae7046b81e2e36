//! Varredura de mídia negativa para PLD (prevenção à lavagem de dinheiro).
//!
//! Busca notícias sobre uma pessoa ou empresa, baixa e limpa cada artigo,
//! classifica o risco com um modelo de linguagem e consolida tudo em um
//! [`Report`].

pub mod aggregator;
pub mod article_fetcher;
pub mod block_detector;
pub mod config;
pub mod error;
pub mod extractor;
pub mod harvester;
pub mod http;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod sanitizer;
pub mod search_engine;

pub use config::{load_config, AppConfig};
pub use error::{Result, ScanError};
pub use llm::{AzureOpenAiClient, FunctionSpec, LanguageModel, LlmProvider, OllamaClient};
pub use pipeline::{PipelineRunner, RunOptions, RunOutcome};
pub use report::{Classification, HarvestSnapshot, RawArticle, Report, ReportRow, Risk, RiskTier};
pub use search_engine::SearchEngine;
