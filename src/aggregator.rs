use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::llm::LanguageModel;
use crate::report::{Classification, Report, Risk, RiskTier};

const NARRATIVE_SYSTEM_PROMPT: &str = "Você é um assistente virtual que auxilia uma equipe de investigação em \
lavagem de dinheiro. Você receberá um texto que é formado por diversos resumos de notícias. Seu objetivo é \
realizar um único resumo desses resumos. Leve em consideração todos os resumos e tente tirar uma conclusão \
caso exista alguma incoerência entre eles.";

/// Ordena do mais grave ao menos grave, preservando a ordem original em empates
pub fn rank(classifications: &mut [Classification]) {
    classifications.sort_by_key(Classification::rank);
}

/// alto se houver algum alto, senão medio se houver algum medio, senão baixo
pub fn overall_risk(classifications: &[Classification]) -> RiskTier {
    let tiers: Vec<RiskTier> = classifications.iter().filter_map(Classification::tier).collect();

    if tiers.contains(&RiskTier::Alto) {
        RiskTier::Alto
    } else if tiers.contains(&RiskTier::Medio) {
        RiskTier::Medio
    } else {
        RiskTier::Baixo
    }
}

/// Lista única e ordenada dos crimes citados, sem os "nenhum crime ..."
pub fn crime_summary(classifications: &[Classification]) -> String {
    let crimes: BTreeSet<String> = classifications
        .iter()
        .filter_map(|c| c.crimes.as_deref())
        .flat_map(|crimes| crimes.split(','))
        .map(str::trim)
        .filter(|crime| !crime.is_empty() && !crime.to_lowercase().contains("nenhum"))
        .map(str::to_string)
        .collect();

    crimes.into_iter().collect::<Vec<_>>().join(", ")
}

/// Faixas de risco fora de alto/medio/baixo, uma mensagem por artigo
pub fn data_quality_issues(classifications: &[Classification]) -> Vec<String> {
    classifications
        .iter()
        .filter_map(|c| match &c.risco {
            Some(Risk::Unrecognized(raw)) => Some(format!("risco não reconhecido '{}' em {}", raw, c.link)),
            _ => None,
        })
        .collect()
}

/// Junta os resumos não vazios (separados por linha em branco)
pub fn joined_summaries(classifications: &[Classification]) -> String {
    classifications
        .iter()
        .filter_map(|c| c.resumo.as_deref())
        .map(str::trim)
        .filter(|resumo| !resumo.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Consolida as classificações no relatório final
pub struct RiskAggregator<'a, M: LanguageModel> {
    model: &'a M,
}

impl<'a, M: LanguageModel> RiskAggregator<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Resumo único dos resumos. Sem resumos ou em caso de falha, vazio.
    pub async fn narrative_summary(&self, classifications: &[Classification]) -> String {
        let summaries = joined_summaries(classifications);
        if summaries.is_empty() {
            log::info!("[Aggregator] Nenhum resumo disponível, narrativa vazia");
            return String::new();
        }

        match self.model.complete(NARRATIVE_SYSTEM_PROMPT, &summaries).await {
            Ok(narrative) => narrative,
            Err(e) => {
                log::warn!("[Aggregator] Falha ao gerar resumo final: {}", e);
                String::new()
            }
        }
    }

    pub async fn aggregate(
        &self,
        query: &str,
        queried_at: NaiveDateTime,
        mut classifications: Vec<Classification>,
    ) -> Report {
        rank(&mut classifications);

        let narrative_summary = self.narrative_summary(&classifications).await;
        let overall_risk = overall_risk(&classifications);
        let crime_summary = crime_summary(&classifications);
        let data_quality_issues = data_quality_issues(&classifications);

        for issue in &data_quality_issues {
            log::warn!("[Aggregator] {}", issue);
        }
        log::info!(
            "[Aggregator] Risco final: {} ({} classificações)",
            overall_risk,
            classifications.len()
        );

        Report {
            run_id: Uuid::new_v4(),
            query: query.to_string(),
            queried_at,
            classifications,
            overall_risk,
            crime_summary,
            narrative_summary,
            data_quality_issues,
        }
    }
}
