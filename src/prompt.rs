//! Prompt assembly and delimiter-based response parsing.
//!
//! The model is instructed to emit named sections, each introduced by a
//! unique literal delimiter token. Parsing is a strict sequential
//! splitter over the ordered token list with a total fallback policy:
//! a response missing any token degrades to fixed placeholder sections
//! plus the raw text as the interpretation, and never raises past the
//! orchestrator.

use crate::record::{DreamReading, RetrievedDream, TaxonomyCatalog};

/// Section delimiter: classification.
pub const DELIM_CLASSIFICATION: &str = "[분류시작]";
/// Section delimiter: interpretation.
pub const DELIM_INTERPRETATION: &str = "[해몽시작]";
/// Section delimiter: keywords.
pub const DELIM_KEYWORDS: &str = "[키워드추출]";
/// Section delimiter: summary.
pub const DELIM_SUMMARY: &str = "[요약시작]";

/// Classification value committed when nothing in the taxonomy applies.
pub const NO_MATCH: &str = "해당 없음";

const FALLBACK_CLASSIFICATION: &str = "분류 정보를 가져오는데 실패했습니다.";
const FALLBACK_KEYWORDS: &str = "키워드를 추출하는데 실패했습니다.";
const FALLBACK_SUMMARY: &str = "요약 정보를 가져오는데 실패했습니다.";

/// System persona for the full four-section reading.
pub const READING_SYSTEM: &str =
    "당신은 꿈을 분석하고, 분류하고, 해몽하고, 요약하는 다재다능한 AI 전문가입니다.";

/// System persona for the keyword-combine reading.
pub const COMBINE_SYSTEM: &str = "당신은 숙련된 꿈 해몽가입니다.";

/// Render retrieved records as the numbered reference list embedded in
/// prompts. Order is preserved — nearest first is a relevance signal
/// the model is told to weight.
fn reference_section(retrieved: &[RetrievedDream]) -> String {
    retrieved
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. 꿈: {}\n   해몽: {}",
                i + 1,
                item.record.source_text.trim(),
                item.record.annotation_text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the four-section reading prompt for a user's dream.
///
/// When a taxonomy is supplied its values are enumerated as the only
/// permitted classification vocabulary; the model must commit to one
/// category and one subcategory, or [`NO_MATCH`] for both.
pub fn build_reading_prompt(
    user_dream: &str,
    retrieved: &[RetrievedDream],
    taxonomy: Option<&TaxonomyCatalog>,
) -> String {
    let reference = reference_section(retrieved);

    let classification_basis = match taxonomy {
        Some(taxonomy) if !taxonomy.is_empty() => format!(
            "[분류 기준 정보]\n- 가능한 대분류: {}\n- 가능한 소분류: {}\n\n",
            taxonomy.categories.join(", "),
            taxonomy.subcategories.join(", ")
        ),
        _ => String::new(),
    };

    format!(
        "당신은 꿈 해몽과 분류에 매우 능숙한 AI 전문가입니다. 당신의 임무는 아래 정보를 바탕으로 사용자의 꿈을 분석하고, 네 부분으로 구성된 답변을 생성하는 것입니다.\n\
         \n\
         ---\n\
         {classification_basis}\
         [해몽 참고 정보]\n\
         - 유사한 꿈 데이터베이스 (유사도가 높은 순서):\n\
         {reference}\n\
         ---\n\
         [사용자 꿈 이야기]:\n\
         {user_dream}\n\
         ---\n\
         [작업 지침 및 출력 형식]:\n\
         당신은 반드시 아래 4개의 부분으로 구성된 답변을 생성해야 합니다.\n\
         각 부분은 지정된 구분자로 시작해야 합니다.\n\
         **절대로 각 부분에 제목이나 번호를 붙이지 마세요. 오직 내용만 작성해야 합니다.**\n\
         \n\
         - **첫 번째 부분**: `{DELIM_CLASSIFICATION}`으로 시작합니다. [분류 기준 정보]를 참고하여 \"대분류: [선택]\\n소분류: [선택]\" 형식으로 꿈을 분류하세요. 일치하는 것이 없으면 \"대분류: {NO_MATCH}\\n소분류: {NO_MATCH}\" 이라고 적으세요.\n\
         \n\
         - **두 번째 부분**: `{DELIM_INTERPRETATION}`으로 시작합니다. \"사용자님의 꿈을 자세히 살펴보니...\" 와 같이 친근한 말투로 시작하여 상세한 해몽과 따뜻한 조언을 작성하세요.\n\
         \n\
         - **세 번째 부분**: `{DELIM_KEYWORDS}`으로 시작합니다. 꿈의 의미를 압축하는 핵심 명사 키워드 3~4개를 쉼표(,)로 구분해서 나열하세요.\n\
         \n\
         - **네 번째 부분**: `{DELIM_SUMMARY}`으로 시작합니다. 상세 해몽의 내용을 세 개의 문장으로 요약합니다. 각 문장은 글머리 기호(-)로 시작해도 좋습니다.\n"
    )
}

/// Build the two-section prompt for a keyword-combined dream.
pub fn build_combined_prompt(keywords: &[&str], retrieved: &[RetrievedDream]) -> String {
    let reference = reference_section(retrieved);
    let keyword_text = keywords.join(", ");

    format!(
        "당신은 꿈 해몽 전문가입니다.\n\
         \n\
         아래는 유사한 꿈 사례들입니다:\n\
         \n\
         {reference}\n\
         \n\
         이 데이터를 참고해서, '{keyword_text}'라는 키워드를 조합한 꿈에 대해 해몽을 작성해주세요.\n\
         다음 두 가지 구성으로 답해주세요. 각 항목은 반드시 다음 구분자로 시작하세요.\n\
         \n\
         {DELIM_INTERPRETATION} ...\n\
         {DELIM_SUMMARY} ...\n\
         \n\
         해몽은 부드럽고 친절한 말투로 작성해주세요.\n"
    )
}

/// Split `raw` sequentially on the ordered delimiter tokens.
///
/// Each split consumes its delimiter; a section's content runs to the
/// next delimiter (or end of text for the last). Returns `None` when
/// any token is absent.
fn split_sections(raw: &str, delimiters: &[&str]) -> Option<Vec<String>> {
    let mut rest = raw;
    let mut sections = Vec::with_capacity(delimiters.len());

    for (i, delimiter) in delimiters.iter().enumerate() {
        let (_, after) = rest.split_once(delimiter)?;
        rest = after;
        if i + 1 == delimiters.len() {
            sections.push(rest.trim().to_string());
        } else if let Some(end) = rest.find(delimiters[i + 1]) {
            sections.push(rest[..end].trim().to_string());
        } else {
            // Next iteration's split_once will report the missing token.
            sections.push(String::new());
        }
    }

    Some(sections)
}

/// Parse a four-section model response into a [`DreamReading`].
///
/// A response missing any delimiter falls back deterministically:
/// placeholder classification/keywords/summary plus the entire raw text
/// as the interpretation. The model is never re-invoked.
pub fn parse_reading(raw: &str) -> DreamReading {
    let delimiters =
        [DELIM_CLASSIFICATION, DELIM_INTERPRETATION, DELIM_KEYWORDS, DELIM_SUMMARY];
    match split_sections(raw, &delimiters) {
        Some(mut sections) => {
            // The model occasionally appends a literal "undefined" to
            // the final section.
            let summary = sections.pop().unwrap_or_default();
            let summary = summary.replace("undefined", "").trim().to_string();
            let keywords = sections.pop().unwrap_or_default();
            let interpretation = sections.pop().unwrap_or_default();
            let classification = sections.pop().unwrap_or_default();
            DreamReading {
                classification,
                interpretation,
                keywords,
                summary,
                from_fallback: false,
            }
        }
        None => DreamReading {
            classification: FALLBACK_CLASSIFICATION.to_string(),
            interpretation: raw.trim().to_string(),
            keywords: FALLBACK_KEYWORDS.to_string(),
            summary: FALLBACK_SUMMARY.to_string(),
            from_fallback: true,
        },
    }
}

/// Parse a two-section keyword-combine response.
///
/// On fallback the raw text becomes the interpretation and the summary
/// is left empty.
pub fn parse_combined(raw: &str) -> DreamReading {
    match split_sections(raw, &[DELIM_INTERPRETATION, DELIM_SUMMARY]) {
        Some(mut sections) => {
            let summary = sections.pop().unwrap_or_default();
            let interpretation = sections.pop().unwrap_or_default();
            DreamReading {
                classification: String::new(),
                interpretation,
                keywords: String::new(),
                summary,
                from_fallback: false,
            }
        }
        None => DreamReading {
            classification: String::new(),
            interpretation: raw.trim().to_string(),
            keywords: String::new(),
            summary: String::new(),
            from_fallback: true,
        },
    }
}
