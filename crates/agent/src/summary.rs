//! Case summary shown to the client: generated prose with a deterministic fallback.

use std::sync::Arc;

use tracing::warn;

use casedesk_core::domain::lead::{CaseType, Lead};
use casedesk_core::text::greeting_name;
use casedesk_db::repositories::KnowledgeEntry;

use crate::llm::TextGenerator;

const KNOWLEDGE_LIMIT: usize = 2;
const KNOWLEDGE_MAX_CHARS: usize = 1800;
const DEFAULT_TARGET_WORDS: u32 = 220;

const TERMINATION_KEYWORDS: &[&str] =
    &["despido", "liquidación", "indemnización", "artículo 47", "artículo 48"];
const RESIGNATION_KEYWORDS: &[&str] =
    &["renuncia", "finiquito", "prestaciones", "aguinaldo", "vacaciones"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarySource {
    Generated,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

fn case_label(case_type: Option<CaseType>) -> &'static str {
    match case_type {
        Some(CaseType::Termination) => "despido",
        _ => "renuncia",
    }
}

/// Up to two knowledge rows mentioning the case, or the first row when none does.
pub fn pick_knowledge(case_type: Option<CaseType>, entries: &[KnowledgeEntry]) -> String {
    let keywords = match case_type {
        Some(CaseType::Termination) => TERMINATION_KEYWORDS,
        _ => RESIGNATION_KEYWORDS,
    };
    let render = |entry: &KnowledgeEntry| format!("### {}\n{}", entry.title, entry.content);

    let mut picked: Vec<String> = entries
        .iter()
        .filter(|entry| {
            let text = entry.searchable_text();
            keywords.iter().any(|keyword| text.contains(keyword))
        })
        .take(KNOWLEDGE_LIMIT)
        .map(render)
        .collect();
    if picked.is_empty() {
        picked.extend(entries.first().map(render));
    }

    let joined = picked.join("\n\n");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(KNOWLEDGE_MAX_CHARS).collect()
}

pub fn fallback_summary(case_type: Option<CaseType>, first_name: &str) -> String {
    let name = greeting_name(first_name);
    match case_type {
        Some(CaseType::Termination) => format!(
            "{name}, lamento mucho lo que estás viviendo. Gracias por contarnos tu situación.\n\n\
             📌 *Lo más importante:* tus derechos laborales importan y vamos a acompañarte paso a paso.\n\n\
             En términos generales, ante un despido el patrón debe acreditar causa legal y cumplir \
             formalidades. Cuando no se acredita, normalmente se reclama indemnización o \
             reinstalación, además de prestaciones pendientes.\n\n\
             ⚖️ Esta orientación es *informativa* (no es asesoría legal). Una abogada revisará tu \
             caso con detalle."
        ),
        _ => format!(
            "{name}, gracias por confiar en nosotros.\n\n\
             📌 *Lo más importante:* aunque sea renuncia, conservas derechos. Usualmente corresponde \
             finiquito (proporcionales de aguinaldo, vacaciones y prima vacacional, además de pagos \
             pendientes si existieran).\n\n\
             ⚖️ Esta orientación es *informativa* (no es asesoría legal). Una abogada revisará tu caso."
        ),
    }
}

pub struct SummaryComposer {
    generator: Arc<dyn TextGenerator>,
    target_words: u32,
}

impl SummaryComposer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, target_words: DEFAULT_TARGET_WORDS }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "Eres una recepcionista legal empática de un despacho laboral en México. \
             Redacta un resumen claro, humano y profesional en español, con base legal general \
             (sin dar asesoría definitiva). No pidas correo. No prometas tiempos exactos. \
             Extensión objetivo: {} a {} palabras.",
            self.target_words.saturating_sub(40),
            self.target_words + 40
        )
    }

    pub fn user_prompt(&self, lead: &Lead, knowledge: &[KnowledgeEntry]) -> String {
        format!(
            "Tipo de caso: {}\nSituación del cliente: {}\n\n\
             Contexto legal del despacho (para apoyar el texto): {}\n\n\
             Incluye:\n\
             - 1 frase de comprensión (empatía)\n\
             - 1 frase de tranquilidad (acompañamiento)\n\
             - 1 mención general a LFT (arts. 47/48 si es despido; si renuncia, finiquito)\n\
             - 1 cierre indicando que una abogada revisará el caso.",
            case_label(lead.case_type),
            lead.description.trim(),
            pick_knowledge(lead.case_type, knowledge)
        )
    }

    pub async fn compose(&self, lead: &Lead, knowledge: &[KnowledgeEntry]) -> Summary {
        let fallback = || Summary {
            text: fallback_summary(lead.case_type, &lead.first_name),
            source: SummarySource::Fallback,
        };
        if !self.generator.is_configured() {
            return fallback();
        }

        match self.generator.generate(&self.system_prompt(), &self.user_prompt(lead, knowledge)).await
        {
            Ok(text) if !text.trim().is_empty() => {
                Summary { text: text.trim().to_string(), source: SummarySource::Generated }
            }
            Ok(_) => {
                warn!(event_name = "agent.summary.empty", "generated summary was empty");
                fallback()
            }
            Err(error) => {
                warn!(
                    event_name = "agent.summary.fallback",
                    error = %error,
                    "text generation failed; using the template summary"
                );
                fallback()
            }
        }
    }
}
