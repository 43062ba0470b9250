//! Prompt templates for the retrieval pipeline
//!
//! Templates use `format!()` interpolation for type safety. User-supplied
//! text must pass through the sanitizer and the prompt hardener before it
//! reaches any of these.

/// System prompt for query analysis. The processor hardens this together
/// with the user query before the LLM call.
pub fn query_analysis_system_prompt() -> &'static str {
    r#"Eres un analista de consultas sobre planes de gobierno de partidos políticos.
Analiza la consulta del usuario y responde únicamente con un objeto JSON con estos campos:
- "keywords": lista de palabras clave relevantes (máximo 10)
- "entities": lista de partidos, personas o instituciones mencionadas
- "intent": "question", "comparison" o "lookup"
- "enhanced_query": reformulación de la consulta optimizada para búsqueda semántica

No agregues explicaciones ni texto fuera del objeto JSON."#
}

/// System prompt for grounded answer generation over assembled context.
///
/// # Example
/// ```
/// use plataforma::llm::prompts::answer_system_prompt;
///
/// assert!(answer_system_prompt().contains("planes de gobierno"));
/// ```
pub fn answer_system_prompt() -> &'static str {
    r#"Eres un asistente que responde preguntas sobre los planes de gobierno de partidos políticos.
Responde únicamente con base en el contexto proporcionado, citando las fuentes como [Fuente N].
Si el contexto no contiene la información necesaria, dilo explícitamente.
No inventes propuestas ni atribuyas posiciones que no aparezcan en el contexto.
Mantén un tono neutral e informativo."#
}

/// Variant used by the comparison orchestrator: the answer must cover one
/// party only, so per-party entries never bleed into each other.
pub fn single_party_system_prompt(party_name: &str) -> String {
    format!(
        r#"Eres un asistente que responde preguntas sobre el plan de gobierno del partido {party_name}.
Responde únicamente con base en el contexto proporcionado, citando las fuentes como [Fuente N].
Describe solamente las propuestas de {party_name}; no menciones ni compares con otros partidos bajo ninguna circunstancia.
Si el contexto no contiene la información necesaria, dilo explícitamente.
Mantén un tono neutral e informativo."#
    )
}

/// User prompt combining the assembled context with the question.
///
/// # Example
/// ```
/// use plataforma::llm::prompts::answer_user_prompt;
///
/// let prompt = answer_user_prompt("[Fuente 1] PLN - Plan 2022\n...", "¿Qué propone sobre educación?");
/// assert!(prompt.contains("¿Qué propone sobre educación?"));
/// ```
pub fn answer_user_prompt(context: &str, question: &str) -> String {
    format!(
        r#"Contexto extraído de los planes de gobierno:

{context}

Pregunta: {question}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_requests_all_fields() {
        let prompt = query_analysis_system_prompt();
        for field in ["keywords", "entities", "intent", "enhanced_query"] {
            assert!(prompt.contains(field), "missing field {field}");
        }
    }

    #[test]
    fn test_single_party_prompt_names_party_and_forbids_others() {
        let prompt = single_party_system_prompt("Partido Liberación Nacional");
        assert!(prompt.contains("Partido Liberación Nacional"));
        assert!(prompt.contains("no menciones ni compares con otros partidos"));
    }

    #[test]
    fn test_answer_user_prompt_embeds_context_and_question() {
        let prompt = answer_user_prompt("[Fuente 1] PAC - Plan", "¿Qué propone sobre salud?");
        assert!(prompt.contains("[Fuente 1] PAC - Plan"));
        assert!(prompt.contains("¿Qué propone sobre salud?"));
    }
}
