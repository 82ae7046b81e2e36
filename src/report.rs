//! Modelo de dados de uma varredura: consulta, artigos, classificações e
//! o relatório final, além do registro de coleta entregue ao exportador.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanError};

/// Formato de data usado no registro de coleta e no relatório
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Termos anexados à busca quando a expansão está ativa
pub const AML_KEYWORDS: &[&str] = &[
    "crime",
    "lavagem",
    "sonegacao",
    "corrupcao",
    "desvio",
    "cartel",
    "doleiro",
    "operacao",
    "policia",
    "preso",
    "condenado",
    "ilicito",
    "prostituicao",
    "esquema",
    "trafico",
];

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Termo pesquisado (pessoa ou empresa). Nunca vazio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    subject: String,
    keyword_expansion: bool,
}

impl SearchQuery {
    pub fn new(subject: &str) -> Result<Self> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ScanError::Config("query must not be empty".into()));
        }
        Ok(Self {
            subject: subject.to_string(),
            keyword_expansion: false,
        })
    }

    pub fn with_keyword_expansion(mut self, enabled: bool) -> Self {
        self.keyword_expansion = enabled;
        self
    }

    /// Sujeito informado ao modelo
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Texto enviado ao motor de busca
    pub fn search_text(&self) -> String {
        if self.keyword_expansion {
            format!("{} + {}", self.subject, AML_KEYWORDS.join(" OR "))
        } else {
            self.subject.clone()
        }
    }
}

/// Conteúdo de um link; vazio quando o download falhou ou foi bloqueado
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArticle {
    pub link: String,
    pub content: String,
}

impl RawArticle {
    pub fn empty(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            content: String::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Faixa de risco: alto > medio > baixo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Alto,
    Medio,
    Baixo,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Alto => "alto",
            RiskTier::Medio => "medio",
            RiskTier::Baixo => "baixo",
        }
    }

    /// Posição na ordenação (menor = mais grave)
    pub fn rank(&self) -> u8 {
        match self {
            RiskTier::Alto => 0,
            RiskTier::Medio => 1,
            RiskTier::Baixo => 2,
        }
    }

    /// Reconhece as três faixas, sem diferenciar maiúsculas e aceitando
    /// a grafia "médio" usada na própria rubrica
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "alto" => Some(RiskTier::Alto),
            "medio" | "médio" => Some(RiskTier::Medio),
            "baixo" => Some(RiskTier::Baixo),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Valor de risco devolvido pelo modelo.
///
/// Valores fora das três faixas são preservados como vieram, para serem
/// sinalizados no relatório em vez de convertidos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Risk {
    Tier(RiskTier),
    Unrecognized(String),
}

impl Risk {
    pub fn from_model(raw: &str) -> Self {
        match RiskTier::parse(raw) {
            Some(tier) => Risk::Tier(tier),
            None => Risk::Unrecognized(raw.to_string()),
        }
    }

    pub fn tier(&self) -> Option<RiskTier> {
        match self {
            Risk::Tier(tier) => Some(*tier),
            Risk::Unrecognized(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Risk::Tier(tier) => tier.as_str(),
            Risk::Unrecognized(raw) => raw,
        }
    }
}

/// Resultado da extração de um artigo.
///
/// A classificação vazia (todos os campos `None`) mantém o link para
/// contabilizar tentativas que falharam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub link: String,
    pub crimes: Option<String>,
    pub risco: Option<Risk>,
    pub resumo: Option<String>,
}

impl Classification {
    pub fn empty(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            crimes: None,
            risco: None,
            resumo: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crimes.is_none() && self.risco.is_none() && self.resumo.is_none()
    }

    pub fn tier(&self) -> Option<RiskTier> {
        self.risco.as_ref().and_then(Risk::tier)
    }

    /// Posição na ordenação: faixas conhecidas, depois não reconhecidas,
    /// depois vazias
    pub fn rank(&self) -> u8 {
        match &self.risco {
            Some(Risk::Tier(tier)) => tier.rank(),
            Some(Risk::Unrecognized(_)) => 3,
            None => 4,
        }
    }
}

/// Linha da visão tabular do relatório
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub crimes: String,
    pub risco: String,
    pub resumo: String,
    pub link: String,
    pub data_consulta: String,
}

/// Relatório final de uma varredura
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub query: String,
    #[serde(with = "timestamp_format")]
    pub queried_at: NaiveDateTime,
    pub classifications: Vec<Classification>,
    pub overall_risk: RiskTier,
    pub crime_summary: String,
    pub narrative_summary: String,
    #[serde(default)]
    pub data_quality_issues: Vec<String>,
}

impl Report {
    /// Visão tabular, construída uma única vez a partir das classificações
    pub fn rows(&self) -> Vec<ReportRow> {
        let data_consulta = self.queried_at.format(TIMESTAMP_FORMAT).to_string();
        self.classifications
            .iter()
            .map(|c| ReportRow {
                crimes: c.crimes.clone().unwrap_or_default(),
                risco: c.risco.as_ref().map(|r| r.label().to_string()).unwrap_or_default(),
                resumo: c.resumo.clone().unwrap_or_default(),
                link: c.link.clone(),
                data_consulta: data_consulta.clone(),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScanError::Parse(format!("failed to serialize report: {}", e)))
    }
}

/// Par link/texto do registro de coleta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub link: String,
    pub texto: String,
}

/// Registro entregue entre a coleta e a classificação
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestSnapshot {
    pub consulta: String,
    #[serde(with = "timestamp_format")]
    pub data_pesquisa: NaiveDateTime,
    pub artigos: Vec<SnapshotEntry>,
}

impl HarvestSnapshot {
    pub fn new(consulta: &str, data_pesquisa: NaiveDateTime, articles: &[RawArticle]) -> Self {
        Self {
            consulta: consulta.to_string(),
            data_pesquisa,
            artigos: articles
                .iter()
                .map(|a| SnapshotEntry {
                    link: a.link.clone(),
                    texto: a.content.clone(),
                })
                .collect(),
        }
    }

    pub fn articles(&self) -> Vec<RawArticle> {
        self.artigos
            .iter()
            .map(|e| RawArticle {
                link: e.link.clone(),
                content: e.texto.clone(),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScanError::Parse(format!("failed to serialize snapshot: {}", e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ScanError::Parse(format!("failed to parse snapshot: {}", e)))
    }
}
