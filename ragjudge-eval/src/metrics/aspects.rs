//! Aspect extraction: the atomic information needs of a question.
//!
//! Aspects are derived from the question alone. The extractor API takes no
//! contexts, so retrieved documents can never leak into the checklist.

use super::judge::JudgeClient;
use ragjudge_core::JudgeSettings;
use ragjudge_core::config::JudgeOverride;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Pseudo-aspect used when nothing better can be derived.
pub const GENERIC_ASPECT: &str = "required aspect(s) from question";

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9\-]+").expect("valid token regex"));

const SYSTEM_PROMPT: &str = "You split a question into a small set of atomic aspects.\n\
Each aspect describes a distinct information need that must be satisfied to fully answer the question.\n\
Do NOT answer the question and do NOT use outside knowledge.\n\
Do NOT insert specific names, dates, or facts that are not already written in the question.\n\
If the question uses words like 'who', 'when', 'where', etc., keep these words or use a generic descriptor \
such as 'author of the book' or 'year of publication'; do not replace them with concrete answers.\n\
Aspects must stay in question space, not look like filled-in answers.";

fn user_prompt(question: &str) -> String {
    format!(
        "Question: {question}\n\n\
List the minimal aspects that the answer must cover.\n\n\
Rules:\n\
- Return 1-3 aspects.\n\
- Each aspect should be a short phrase (about 3-8 words), not a full sentence.\n\
- Describe what information is being asked for, not the answer itself.\n\
- Do NOT introduce new names, dates, or facts that are not explicitly present in the question.\n\
- Do NOT copy the whole question; break it into smaller information needs if it has multiple parts.\n\
- No explanation, no extra text.\n\n\
Format:\n\
- One aspect per line, starting with a dash.\n\n\
Example:\n\
Q: Who wrote the novel '1984' and when was it first published?\n\
A:\n\
- who wrote the novel '1984'\n\
- when the novel '1984' was first published"
    )
}

/// Derives aspect checklists from questions.
#[derive(Clone)]
pub struct AspectExtractor {
    judge: JudgeClient,
    overrides: JudgeOverride,
}

impl AspectExtractor {
    pub fn new(judge: JudgeClient) -> Self {
        Self {
            judge,
            overrides: JudgeOverride::default(),
        }
    }

    /// Use `overrides` (from `judges.aspects` or `ASPECTS_*`) for extraction calls.
    pub fn with_overrides(mut self, overrides: JudgeOverride) -> Self {
        self.overrides = overrides;
        self
    }

    /// Aspects for `question`, at most `max_aspects`.
    ///
    /// Supplied aspects are trimmed, blanks dropped, and truncated but never
    /// re-derived. The judge is asked with the aspect overrides, else
    /// `settings.model` at temperature 0.0; on failure or an empty answer the
    /// deterministic token fallback is used.
    pub async fn get_aspects(
        &self,
        question: &str,
        supplied: Option<&[String]>,
        max_aspects: usize,
        settings: &JudgeSettings,
    ) -> Vec<String> {
        if let Some(supplied) = supplied {
            let aspects: Vec<String> = supplied
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .take(max_aspects)
                .collect();
            if !aspects.is_empty() {
                return aspects;
            }
        }

        let extraction = JudgeSettings::new(
            self.overrides
                .model
                .clone()
                .unwrap_or_else(|| settings.model.clone()),
            self.overrides.temperature.unwrap_or(0.0),
        );
        match self
            .judge
            .complete_text(SYSTEM_PROMPT, &user_prompt(question), &extraction)
            .await
        {
            Ok(text) => {
                let aspects = parse_aspect_lines(&text, max_aspects);
                if !aspects.is_empty() {
                    debug!(count = aspects.len(), "Extracted aspects");
                    return aspects;
                }
                warn!("Judge returned no aspects; using token fallback");
            }
            Err(e) => warn!(error = %e, "Aspect extraction failed; using token fallback"),
        }
        fallback_aspects(question, max_aspects)
    }
}

/// Parse one aspect per line, stripping leading bullets, stars, digits, dots and spaces.
pub fn parse_aspect_lines(text: &str, max_aspects: usize) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '.' || c == ' ' || c.is_ascii_digit())
                .trim()
                .to_string()
        })
        .filter(|a| !a.is_empty())
        .take(max_aspects)
        .collect()
}

/// Deterministic checklist built from the question's own tokens.
///
/// Unique lower-cased tokens of at least four characters, longest first
/// (ties keep question order).
pub fn fallback_aspects(question: &str, max_aspects: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens: Vec<String> = TOKEN_RE
        .find_iter(question)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() >= 4)
        .filter(|t| seen.insert(t.clone()))
        .collect();
    tokens.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    tokens.truncate(max_aspects);

    if tokens.is_empty() {
        vec![GENERIC_ASPECT.to_string()]
    } else {
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ragjudge_core::{LlmProvider, MockLlmProvider};
    use std::sync::Arc;

    fn extractor(mock: Arc<MockLlmProvider>) -> AspectExtractor {
        let provider: Arc<dyn LlmProvider> = mock;
        AspectExtractor::new(JudgeClient::new(provider))
    }

    #[test]
    fn test_parse_aspect_lines_strips_markers() {
        let text = "- who wrote it\n* when\n1. where it was published\n\n2) why";
        assert_eq!(
            parse_aspect_lines(text, 10),
            vec!["who wrote it", "when", "where it was published", ") why"]
        );
        assert_eq!(parse_aspect_lines(text, 2).len(), 2);
    }

    #[test]
    fn test_fallback_longest_first_stable() {
        let aspects = fallback_aspects("When did Marie Curie win both Nobel prizes?", 6);
        assert_eq!(aspects, vec!["prizes", "marie", "curie", "nobel", "when", "both"]);
    }

    #[test]
    fn test_fallback_unique_and_truncated() {
        let aspects = fallback_aspects("Paris paris PARIS capital", 1);
        assert_eq!(aspects, vec!["capital"]);
    }

    #[test]
    fn test_fallback_generic_when_no_tokens() {
        assert_eq!(fallback_aspects("Who is he?", 5), vec![GENERIC_ASPECT]);
        assert_eq!(fallback_aspects("", 5), vec![GENERIC_ASPECT]);
    }

    #[tokio::test]
    async fn test_supplied_aspects_win_without_judge_call() {
        let mock = Arc::new(MockLlmProvider::new());
        let ex = extractor(mock.clone());
        let supplied = vec![" author ".to_string(), "year".into(), "publisher".into()];
        let aspects = ex
            .get_aspects("q", Some(supplied.as_slice()), 2, &JudgeSettings::default())
            .await;
        assert_eq!(aspects, vec!["author", "year"]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_judge_aspects_used() {
        let mock = Arc::new(MockLlmProvider::with_response("- author of the novel\n- year of publication"));
        let ex = extractor(mock.clone());
        let settings = JudgeSettings::new("gpt-4.1-mini", 0.5);
        let aspects = ex.get_aspects("Who wrote it and when?", None, 5, &settings).await;
        assert_eq!(aspects, vec!["author of the novel", "year of publication"]);

        let req = &mock.requests()[0];
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.model.as_deref(), Some("gpt-4.1-mini"));
    }

    #[tokio::test]
    async fn test_blank_supplied_aspects_dropped() {
        let mock = Arc::new(MockLlmProvider::new());
        let ex = extractor(mock.clone());
        let supplied = vec!["  ".to_string(), "x".into(), "".into()];
        let aspects = ex
            .get_aspects("q", Some(supplied.as_slice()), 5, &JudgeSettings::default())
            .await;
        assert_eq!(aspects, vec!["x"]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_all_blank_supplied_aspects_are_derived() {
        let mock = Arc::new(MockLlmProvider::with_response("- who wrote it"));
        let ex = extractor(mock.clone());
        let supplied = vec![" ".to_string()];
        let aspects = ex
            .get_aspects("Who wrote it?", Some(supplied.as_slice()), 5, &JudgeSettings::default())
            .await;
        assert_eq!(aspects, vec!["who wrote it"]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_aspect_overrides_reach_request() {
        let mock = Arc::new(MockLlmProvider::with_response("- author"));
        let ex = extractor(mock.clone()).with_overrides(JudgeOverride {
            model: Some("aspect-model".into()),
            temperature: Some(0.2),
        });
        let settings = JudgeSettings::new("metric-model", 0.7);
        ex.get_aspects("Who wrote it?", None, 3, &settings).await;

        let req = &mock.requests()[0];
        assert_eq!(req.model.as_deref(), Some("aspect-model"));
        assert_eq!(req.temperature, 0.2);
    }

    #[tokio::test]
    async fn test_judge_failure_falls_back() {
        let mock = Arc::new(MockLlmProvider::new().fail_model("gpt-4o-mini"));
        let ex = extractor(mock);
        let aspects = ex
            .get_aspects("Which telescope discovered exoplanets?", None, 2, &JudgeSettings::default())
            .await;
        assert_eq!(aspects, vec!["discovered", "exoplanets"]);
    }

    #[tokio::test]
    async fn test_empty_judge_answer_falls_back() {
        let mock = Arc::new(MockLlmProvider::with_response("   \n  "));
        let ex = extractor(mock);
        let aspects = ex.get_aspects("Why?", None, 3, &JudgeSettings::default()).await;
        assert_eq!(aspects, vec![GENERIC_ASPECT]);
    }
}
