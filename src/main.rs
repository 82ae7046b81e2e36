//! CLI da varredura de mídia negativa.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pld_scanner::config::{default_config_path, load_config};
use pld_scanner::{PipelineRunner, RunOptions, SearchEngine};

/// Busca notícias sobre uma pessoa ou empresa e classifica o risco de PLD.
#[derive(Parser)]
#[command(name = "pld-scanner", version, about)]
struct Cli {
    /// Nome da pessoa ou empresa pesquisada
    subject: String,

    /// Motor de busca: google, google-lite ou bing
    #[arg(long)]
    engine: Option<SearchEngine>,

    /// Número de páginas de resultado
    #[arg(long)]
    pages: Option<usize>,

    #[arg(long)]
    links_per_page: Option<usize>,

    /// Limite total de links analisados
    #[arg(long)]
    max_links: Option<usize>,

    /// Caminho do config.json (padrão: diretório de configuração do usuário)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grava o relatório em JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Grava o registro de coleta (links e textos) em JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Pesquisa só o nome, sem os termos de PLD
    #[arg(long)]
    no_expand: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("could not determine the user config directory")?,
    };
    let mut config = load_config(&config_path).with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env();
    log::debug!("Configuração: {:?}", config);

    let mut options = RunOptions::from_settings(&config.search);
    if let Some(engine) = cli.engine {
        options.engine = engine;
    }
    if let Some(pages) = cli.pages {
        options.pages = pages;
    }
    if let Some(links_per_page) = cli.links_per_page {
        options.links_per_page = links_per_page;
    }
    if cli.max_links.is_some() {
        options.max_links = cli.max_links;
    }
    if cli.no_expand {
        options.keyword_expansion = false;
    }

    let runner = PipelineRunner::from_config(&config).context("invalid language model configuration")?;
    let outcome = runner.run(&cli.subject, &options).await?;
    let report = &outcome.report;

    println!("Consulta Realizada:\n{}\n", report.query);
    println!("Resumo das notícias:\n{}\n", report.narrative_summary);
    println!("Risco do Cliente:\n{}\n", report.overall_risk);
    println!("Crimes que possam ter relação com as notícias:\n{}\n", report.crime_summary);
    println!("Detalhes planilhados:");
    for row in report.rows() {
        println!("{}; {}; {}; {}; {}", row.crimes, row.risco, row.resumo, row.link, row.data_consulta);
    }
    for issue in &report.data_quality_issues {
        println!("Atenção: {}", issue);
    }

    if let Some(path) = &cli.output {
        std::fs::write(path, report.to_json()?).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Relatório salvo em {}", path.display());
    }
    if let Some(path) = &cli.snapshot {
        std::fs::write(path, outcome.snapshot.to_json()?).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Registro de coleta salvo em {}", path.display());
    }

    Ok(())
}
