//! Fixed prompts and user-facing strings for the policy agent.

use crate::tools::ToolSet;

/// Returned verbatim for questions outside the insurance domain.
pub const REFUSAL_MESSAGE: &str =
    "Lo siento, solo puedo ayudar con temas de seguros y pólizas.";

/// Last-resort answer when no source produced anything usable.
pub const APOLOGY_MESSAGE: &str =
    "Lo siento, en este momento no puedo responder a tu consulta. Por favor, \
     inténtalo de nuevo en unos minutos.";

/// Answer when neither the documents nor the web had relevant material.
pub const NO_INFORMATION_MESSAGE: &str =
    "Lo siento, no encontré información sobre tu consulta ni en nuestros \
     documentos de pólizas ni en internet. ¿Podrías reformular la pregunta?";

pub const ANSWER_SYSTEM_PROMPT: &str =
    "Eres un agente de atención al cliente especializado en pólizas de seguros. \
     Respondes únicamente preguntas sobre seguros, pólizas, coberturas y derechos \
     del asegurado. Responde en español, con un tono amable y profesional, de \
     manera clara y concisa, basándote solo en la información proporcionada. \
     Cuando la información provenga de nuestros documentos, menciona las fuentes.";

pub const CONDENSE_SYSTEM_PROMPT: &str =
    "Reformula la última pregunta del cliente como una pregunta independiente y \
     completa, usando el historial de la conversación para resolver referencias \
     como \"esto\", \"eso\" o \"ese artículo\". Devuelve solo la pregunta \
     reformulada, sin explicaciones.";

/// Closed label set for intent selection. The parser only accepts these.
pub const INTENT_LABELS: [&str; 4] = ["polizas", "actualidad", "clausula", "fuera_de_tema"];

pub fn intent_prompt(tools: &ToolSet) -> String {
    let descriptions = tools
        .iter()
        .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Eres el selector de herramientas de un agente de seguros. Herramientas \
         disponibles:\n{}\n\n\
         Clasifica la pregunta del cliente con exactamente una de estas etiquetas:\n\
         - polizas: la pregunta trata de seguros, pólizas o coberturas (la opción \
         por defecto para cualquier duda del dominio asegurador)\n\
         - actualidad: la pregunta pide explícitamente información reciente o \
         externa a nuestros documentos\n\
         - clausula: el cliente pide combinar o redactar una nueva cláusula a \
         partir de varios temas\n\
         - fuera_de_tema: la pregunta no tiene relación con seguros\n\n\
         Responde únicamente con la etiqueta.",
        descriptions
    )
}

pub fn answer_user_prompt(question: &str, observation: &str) -> String {
    format!(
        "Pregunta del cliente: {}\n\n{}\n\n\
         Responde basándote en esta información. Si la información no está \
         relacionada con seguros o pólizas, indica cortésmente que no puedes \
         ayudar con ese tema.",
        question, observation
    )
}
