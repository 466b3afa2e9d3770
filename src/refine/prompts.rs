//! Prompt builders for drafting, rating and improving.

use super::GenerationRequest;
use crate::content::{Content, IterationRecord};

pub const DRAFT_SYSTEM: &str = "You are a senior writer. You only state facts supported by the provided sources. \
Respond with ONLY valid JSON.";

pub const RATING_SYSTEM: &str = "You are a demanding editor who rates articles. Respond with ONLY valid JSON.";

const DRAFT_FORMAT: &str = "Format:\n\
{\"title\": \"<title>\", \"body\": \"<markdown body with ## section headings>\", \
\"tags\": [\"<tag>\", ...], \"categories\": [\"<category>\", ...]}";

fn style_block(request: &GenerationRequest) -> String {
    let style = &request.style;
    let mut block = format!(
        "Tone: {}\nLanguage: {}\nTarget length: about {} words",
        style.tone, style.language, style.target_words
    );
    if let Some(angle) = &request.angle {
        block.push_str(&format!("\nAngle: {angle}"));
    }
    if let Some(extra) = &style.custom_instructions {
        block.push_str(&format!("\nAdditional instructions: {extra}"));
    }
    block
}

pub fn draft_prompt(request: &GenerationRequest) -> String {
    format!(
        "Write an article.\n\
         \n\
         Title: {}\n\
         Niche: {}\n\
         Keywords: {}\n\
         {}\n\
         \n\
         Rules:\n\
         - Use markdown with at least three `##` section headings\n\
         - Ground every claim in the sources below and never invent statistics\n\
         - Provide 3-6 tags\n\
         \n\
         Sources:\n{}\n\
         \n\
         {DRAFT_FORMAT}",
        request.title,
        request.niche,
        request.keywords.join(", "),
        style_block(request),
        grounding_or_placeholder(request),
    )
}

pub fn rating_prompt(
    request: &GenerationRequest,
    content: &Content,
    previous_score: Option<f32>,
) -> String {
    let previous = match previous_score {
        Some(score) => format!(
            "The previous version scored {score:.1}/10. If this version genuinely fixes earlier \
             problems, the score must reflect that improvement.\n"
        ),
        None => String::new(),
    };
    format!(
        "Rate this article for the niche \"{}\" on a 1-10 scale.\n\
         {previous}\
         For every weakness give the exact location (section heading or paragraph), the issue, \
         and a concrete action. Cite the source number when a fact is missing or wrong.\n\
         \n\
         Format:\n\
         {{\"score\": <1-10>, \"summary\": \"<two sentences>\", \
         \"structure\": <1-10>, \"depth\": <1-10>, \"engagement\": <1-10>, \
         \"improvements\": [{{\"location\": \"...\", \"issue\": \"...\", \"action\": \"...\", \"source\": \"<[n] or null>\"}}]}}\n\
         \n\
         Target style:\n{}\n\
         \n\
         Sources:\n{}\n\
         \n\
         Article title: {}\n\
         Article body:\n{}",
        request.niche,
        style_block(request),
        grounding_or_placeholder(request),
        content.title,
        content.body,
    )
}

pub fn improvement_prompt(
    request: &GenerationRequest,
    previous: &IterationRecord,
    history: &[IterationRecord],
) -> String {
    let mut fixes = String::new();
    for (i, improvement) in previous.rating.improvements.iter().enumerate() {
        fixes.push_str(&format!(
            "{}. [{}] {} -> {}",
            i + 1,
            improvement.location,
            improvement.issue,
            improvement.action
        ));
        if let Some(source) = &improvement.source {
            fixes.push_str(&format!(" (source {source})"));
        }
        fixes.push('\n');
    }
    if fixes.is_empty() {
        fixes.push_str("No specific issues listed; raise overall depth and clarity.\n");
    }

    let attempts = history
        .iter()
        .map(|record| {
            format!(
                "- Attempt {}: scored {:.1}. Editor summary: {}",
                record.sequence, record.rating.score, record.rating.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Revise the article so that it addresses EVERY numbered issue below.\n\
         Do not repeat strategies that already failed in earlier attempts.\n\
         \n\
         Issues from the last review (score {:.1}/10):\n{fixes}\n\
         Earlier attempts:\n{attempts}\n\
         \n\
         {}\n\
         \n\
         Sources:\n{}\n\
         \n\
         Current title: {}\n\
         Current body:\n{}\n\
         \n\
         {DRAFT_FORMAT}",
        previous.rating.score,
        style_block(request),
        request.research.as_grounding(),
        previous.content.title,
        previous.content.body,
    )
}

fn grounding_or_placeholder(request: &GenerationRequest) -> String {
    if request.research.is_empty() {
        "(no sources available; keep claims general)".to_string()
    } else {
        request.research.as_grounding()
    }
}

/// Output budget scaled to the requested length.
pub fn draft_max_tokens(request: &GenerationRequest) -> u32 {
    (request.style.target_words.saturating_mul(2) + 800).min(8000)
}
