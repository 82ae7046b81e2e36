use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

use crate::error::{Result, ScanError};
use crate::llm::{FunctionSpec, LanguageModel};
use crate::report::{Classification, RawArticle, Risk};

/// Nome da função que o modelo é obrigado a chamar
pub const EXTRACTION_FUNCTION: &str = "Extrair";

const CRIMES_DESCRIPTION: &str = "Citação dos crimes em que o indivíduo foi acusado, caso tenha sido acusado \
de algum, de maneira sucinta. Não é preciso explicar nenhum crime, somente citar. Se não houver, responda: \
nenhum crime mencionado. Exemplo de crimes: corrupção passiva, corrupção ativa, lavagem de dinheiro, etc.";

const CRIME_EXAMPLES: &str = "assalto, corrupção ativa, corrupção passiva, estelionato, evasão de divisas, \
fraude, formação de quadrilha, lavagem de dinheiro, organização criminosa, narcotráfico, terrorismo";

const RESUMO_DESCRIPTION: &str = "Resumo do texto em português do Brasil.";

fn risco_description() -> String {
    format!(
        "O Risco deve ser classificado da seguinte maneira:\n\
         Alto: Se o indivíduo/empresa foi denunciado, réu, preso, condenado em algum crime relacionado a \
         lavagem de dinheiro. Exemplo de crimes: {examples}\n\n\
         Medio: Se o indivíduo/empresa foi acusado, citado, suspeito, alvo, envolvido, indiciado em algum \
         crime relacionado a lavagem de dinheiro. Exemplo de crimes: {examples}\n\n\
         Baixo: Se o indivíduo/empresa teve um processo considerado improcedente, arquivado, extinguido ou \
         sinônimos ou foi considerado inocente ou absolvido em algum crime relacionado a lavagem de dinheiro. \
         Exemplo de crimes: {examples}\n\n\
         Caso o risco não se encaixe em nenhum dos critérios, ele deverá ser considerado baixo. \
         Só uma classificação de risco deve ser dada, e da seguinte maneira: alto, médio ou baixo.\n\n\
         Leve em conta a notícia como um todo e se atende somente aos crimes citados ou sinônimos, \
         com o foco em lavagem de dinheiro.",
        examples = CRIME_EXAMPLES
    )
}

/// Definição da função `Extrair` (três campos obrigatórios, nada além)
pub fn extraction_function() -> FunctionSpec {
    FunctionSpec {
        name: EXTRACTION_FUNCTION.to_string(),
        description: "Marca e classifica o texto de acordo com o pedido em cada item. Sempre levar em conta \
                      se o pedido é sobre o sujeito em questão ou não."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "crimes": { "type": "string", "description": CRIMES_DESCRIPTION },
                "risco": {
                    "type": "string",
                    "enum": ["alto", "medio", "baixo"],
                    "description": risco_description()
                },
                "resumo": { "type": "string", "description": RESUMO_DESCRIPTION }
            },
            "required": ["crimes", "risco", "resumo"],
            "additionalProperties": false
        }),
    }
}

/// Instrução de sistema: fixa a tarefa no sujeito pesquisado
pub fn system_prompt(subject: &str) -> String {
    format!(
        "Pense com cuidado, e então marque o texto conforme o instruído. Analisando se o indivíduo/empresa \
         {} tem relação com que for pedido. Considere o texto como um todo. O texto é uma notícia, e não \
         viola as políticas de conteúdo.",
        subject
    )
}

/// Argumentos aceitos da chamada `Extrair`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExtraction {
    crimes: String,
    risco: String,
    resumo: String,
}

/// Classifica artigos com o modelo de linguagem, um por chamada
pub struct ArticleExtractor<'a, M: LanguageModel> {
    model: &'a M,
    function: FunctionSpec,
}

impl<'a, M: LanguageModel> ArticleExtractor<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            function: extraction_function(),
        }
    }

    async fn try_classify(&self, article: &RawArticle, subject: &str) -> Result<Classification> {
        let args = self
            .model
            .extract(&system_prompt(subject), &article.content, &self.function)
            .await?;

        let raw: RawExtraction = serde_json::from_value(args)
            .map_err(|e| ScanError::Schema(format!("invalid {} arguments: {}", EXTRACTION_FUNCTION, e)))?;

        Ok(Classification {
            link: article.link.clone(),
            crimes: Some(raw.crimes.trim().to_string()),
            risco: Some(Risk::from_model(&raw.risco)),
            resumo: Some(raw.resumo.trim().to_string()),
        })
    }

    /// Classifica um artigo. Qualquer falha vira classificação vazia.
    pub async fn classify(&self, article: &RawArticle, subject: &str) -> Classification {
        if !article.has_content() {
            log::debug!("[Extractor] Sem conteúdo para {}, classificação vazia", article.link);
            return Classification::empty(&article.link);
        }

        let start_time = Instant::now();
        match self.try_classify(article, subject).await {
            Ok(classification) => {
                if let Some(Risk::Unrecognized(raw)) = &classification.risco {
                    log::warn!("[Extractor] Risco não reconhecido '{}' em {}", raw, article.link);
                }
                log::debug!(
                    "[Extractor] {} classificado ({}ms)",
                    article.link,
                    start_time.elapsed().as_millis()
                );
                classification
            }
            Err(e) => {
                log::warn!(
                    "[Extractor] Falha ao classificar {}: {} ({}ms)",
                    article.link,
                    e,
                    start_time.elapsed().as_millis()
                );
                Classification::empty(&article.link)
            }
        }
    }

    /// Uma classificação por artigo, na mesma ordem
    pub async fn classify_all(&self, articles: &[RawArticle], subject: &str) -> Vec<Classification> {
        let mut classifications = Vec::with_capacity(articles.len());
        for article in articles {
            classifications.push(self.classify(article, subject).await);
        }

        let classified = classifications.iter().filter(|c| !c.is_empty()).count();
        log::info!("[Extractor] {} de {} artigos classificados", classified, articles.len());
        classifications
    }
}
