//! Prompts for the LLM-backed analyst.
//!
//! All prompt text lives here so wording changes never touch retry or
//! parsing logic, and so tests can inspect prompts without a model. Prompts
//! are in Portuguese: the documents are Portuguese budgets and the stored
//! descriptions, categories and explanations must stay in that language.

use crate::model::{Category, Side};

/// System prompt for line-item extraction.
pub const EXTRACT_SYSTEM_PROMPT: &str = r#"Você é um analisador de documentos orçamentais muito experiente. Extraia itens de linha orçamental do texto fornecido.

REGRAS CRÍTICAS:
1. Produza APENAS JSON válido correspondendo a este esquema exato:
{
  "items": [
    {
      "side": "REVENUE" ou "EXPENSE",
      "descriptionOriginal": "texto exato do documento",
      "value": número ou null (NÃO invente números, use null se incerto),
      "unit": "EUR" ou "THOUSAND_EUR" ou "MILLION_EUR" ou "UNKNOWN",
      "pageNumber": número (a página onde evidenceText aparece),
      "evidenceText": "excerto literal do texto de entrada (50-200 caracteres)"
    }
  ]
}

2. NÃO calcule totais nem invente números. Extraia apenas o que vê.
3. Se um valor não estiver claro ou faltar, defina value como null.
4. evidenceText deve ser um excerto literal da entrada (copie e cole, não parafraseie).
5. pageNumber deve corresponder ao marcador de página na entrada (ex: se a evidência está após "--- PAGE 12 ---", use 12).
6. side deve ser REVENUE ou EXPENSE com base no contexto.
7. Extraia TODOS os itens orçamentais que encontrar, mesmo que o valor seja null.
8. IMPORTANTE: Todas as descrições e textos devem estar em português."#;

/// System prompt for explanations.
pub const EXPLAIN_SYSTEM_PROMPT: &str = r#"Você é um explicador de documentos orçamentais. Gere explicações claras e factuais para itens orçamentais.

REGRAS:
1. Escreva apenas 2-3 frases.
2. Baseie a explicação APENAS no texto de evidência e no contexto da secção.
3. NÃO adicione opiniões políticas ou especulação.
4. NÃO invente números além do que está na evidência.
5. Use linguagem simples que cidadãos comuns possam entender.
6. Seja factual e neutro.
7. IMPORTANTE: Escreva sempre em português."#;

/// User message for extraction: breadcrumb plus the page-marked section text.
pub fn extract_user_prompt(title_path: &str, marked_text: &str) -> String {
    format!(
        "Secção: {title_path}\n{marked_text}\n\n\
         Extraia todos os itens de linha orçamental do texto acima. \
         Retorne apenas JSON, sem outro texto."
    )
}

/// System prompt for categorisation, listing only the side's categories.
pub fn categorize_system_prompt(side: Side) -> String {
    let allowed: Vec<&str> = Category::allowed(side).iter().map(|c| c.label()).collect();
    format!(
        "Você é um categorizador de orçamento. Atribua cada item a exatamente uma categoria da lista permitida.\n\n\
         Lado: {}\n\
         Categorias permitidas: {}\n\n\
         Retorne APENAS o nome exato da categoria da lista permitida, nada mais.\n\
         IMPORTANTE: Retorne o nome da categoria em português exatamente como aparece na lista.",
        side.label_pt(),
        allowed.join(", ")
    )
}

pub fn categorize_user_prompt(title_path: &str, description: &str) -> String {
    format!(
        "Secção: {title_path}\n\
         Descrição: {description}\n\n\
         Categorize este item orçamental. Retorne apenas o nome da categoria que mais se relaciona em português."
    )
}

pub fn explain_user_prompt(title_path: &str, evidence: &str) -> String {
    format!(
        "Secção: {title_path}\n\
         Evidência: {evidence}\n\n\
         Explique este item orçamental em 2-3 frases para cidadãos comuns. Escreva em português."
    )
}

/// Templated explanation used when no model explanation is available.
///
/// Quotes at most `excerpt_chars` characters of `evidence` (never splits a
/// multi-byte character).
pub fn fallback_explanation(title_path: &str, evidence: &str, excerpt_chars: usize) -> String {
    let excerpt: String = evidence.chars().take(excerpt_chars).collect();
    format!("This item appears in section {title_path}. Evidence: {excerpt}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_prompt_describes_wire_schema() {
        for field in [
            "descriptionOriginal",
            "pageNumber",
            "evidenceText",
            "THOUSAND_EUR",
            "--- PAGE 12 ---",
        ] {
            assert!(EXTRACT_SYSTEM_PROMPT.contains(field), "missing {field}");
        }
    }

    #[test]
    fn categorize_prompt_lists_only_the_sides_categories() {
        let p = categorize_system_prompt(Side::Revenue);
        assert!(p.contains("Lado: RECEITA"));
        assert!(p.contains("Outras receitas"));
        assert!(!p.contains("Saúde"));

        let p = categorize_system_prompt(Side::Expense);
        assert!(p.contains("Lado: DESPESA"));
        assert!(p.contains("Dívida pública"));
        assert!(!p.contains("Impostos sobre pessoas"));
    }

    #[test]
    fn user_prompts_embed_breadcrumb() {
        let p = extract_user_prompt("Receitas > IVA", "--- PAGE 3 ---\nIVA 12,3");
        assert!(p.starts_with("Secção: Receitas > IVA\n--- PAGE 3 ---"));
        assert!(categorize_user_prompt("Despesas", "Hospitais").contains("Descrição: Hospitais"));
        assert!(explain_user_prompt("Despesas", "Hospitais 12").contains("Evidência: Hospitais 12"));
    }

    #[test]
    fn fallback_explanation_is_char_bounded() {
        let evidence = "Educação ".repeat(50);
        let text = fallback_explanation("Despesas", &evidence, 10);
        assert_eq!(
            text,
            "This item appears in section Despesas. Evidence: Educação E..."
        );
    }

    #[test]
    fn fallback_explanation_keeps_short_evidence_whole() {
        let text = fallback_explanation("Receitas", "IRS 1,2", 200);
        assert_eq!(text, "This item appears in section Receitas. Evidence: IRS 1,2...");
    }
}
