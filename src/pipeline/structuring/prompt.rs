/// System message: Brazilian medical documentation analyst, JSON only.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "Você é um analisador de dados médicos especializado em \
documentação médica brasileira. Extraia informações médicas importantes e retorne APENAS como \
dados JSON, sem texto ou formatação markdown adicional.";

/// Build the user prompt asking for `variables` out of `text`.
///
/// Names and values stay in Brazilian Portuguese; the answer must be the
/// bare `{"fields": [...]}` document.
pub fn build_extraction_prompt(text: &str, variables: &[String]) -> String {
    let variable_list = variables
        .iter()
        .map(|v| format!("   - {v}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analise o seguinte texto médico e extraia informações médicas importantes relacionadas a ecocardiograma.
Mantenha todos os nomes de variáveis e valores em português brasileiro.
Use caracteres especiais corretamente (ç, ã, é, etc.).

Regras:
1. Extraia especificamente as seguintes variáveis (se presentes no texto):
{variable_list}
2. Mantenha valores em português quando aplicável
3. Retorne APENAS os dados JSON neste formato exato, sem texto adicional:
{{
    "fields": [
        {{
            "name": "nome_da_variável",
            "value": "valor_extraído"
        }}
    ]
}}

Texto para análise:
{text}
"#
    )
}
