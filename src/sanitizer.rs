use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

/// Elementos cujo texto compõe o conteúdo bruto do artigo
const TEXT_TAGS: &str = "p, div, span, article, section";

fn spaces() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(" +").expect("static regex"))
}

/// Junta com espaço simples o texto dos elementos textuais da página.
///
/// Elementos aninhados aparecem mais de uma vez; a limpeza seguinte só
/// normaliza espaços.
pub fn extract_text(html: &str) -> String {
    let Ok(selector) = Selector::parse(TEXT_TAGS) else {
        return String::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Limpa o texto para uso em prompt e em exportação tabular.
///
/// Remove barras invertidas e `\n`, troca `\r` por espaço, colapsa espaços
/// repetidos e apara as pontas. Aplicar duas vezes não muda o resultado.
pub fn sanitize(content: &str) -> String {
    let cleaned = content
        .replace('\\', "")
        .replace('\n', "")
        .replace('\r', " ");
    spaces().replace_all(&cleaned, " ").trim().to_string()
}

/// Extração e limpeza em um passo
pub fn extract_clean_text(html: &str) -> String {
    sanitize(&extract_text(html))
}
