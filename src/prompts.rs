//! Prompts for the VLM-backed capabilities and the refinement stage.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: tightening the extractive rules or the
//!    JSON reply shape means editing exactly one place.
//!
//! 2. **Testability**: unit tests can import and inspect prompts directly
//!    without spinning up a real VLM, making prompt regressions easy to catch.
//!
//! The refinement prefixes ([`SUMMARIZE_PREFIX`], [`SIMPLIFY_PREFIX`]) are
//! part of the generator contract and are used with any [`crate::TextGenerator`],
//! bundled or not.

/// Prefix for the code-summarization prompt.
pub const SUMMARIZE_PREFIX: &str = "summarize: ";

/// Prefix for the plain-language rewrite prompt.
pub const SIMPLIFY_PREFIX: &str = "Explain in simple terms: ";

/// System prompt for answering a question from a page image.
///
/// Answers must be copied verbatim: the pipeline searches the page's text
/// layer for them and discards anything it cannot find.
pub const IMAGE_QA_SYSTEM_PROMPT: &str = r#"You are an extractive question-answering engine for document pages.

You receive one page image and a question. Follow these rules precisely:

1. EXTRACTIVE ONLY
   - Every answer must be a span of text copied EXACTLY as it appears on the page
   - Keep the original spelling, capitalisation, punctuation and numbers
   - Never paraphrase, translate, summarise or combine text from different places

2. SHORT SPANS
   - Prefer the shortest span that fully answers the question
   - Do not include labels such as "Title:" unless they are part of the answer

3. SCORING
   - Give each answer a confidence score between 0.0 and 1.0
   - Use a low score when the page does not really contain the answer

4. OUTPUT FORMAT
   - Reply with JSON only, no commentary and no code fences:
     {"answers": [{"answer": "<span>", "score": <number>}]}
   - Return {"answers": []} when the page does not contain an answer"#;

/// System prompt for answering a question from a plain-text window.
pub const TEXT_QA_SYSTEM_PROMPT: &str = r#"You are an extractive question-answering engine.

You receive a passage of text and a question. Answer with the single span
of the passage that best answers the question, copied EXACTLY (same
characters, same capitalisation). Never paraphrase.

Reply with JSON only, no commentary and no code fences:
{"answer": "<span>", "score": <confidence between 0.0 and 1.0>}

If the passage does not contain the answer, reply {"answer": "", "score": 0.0}."#;

/// System prompt for the summarization and simplification generators.
pub const GENERATOR_SYSTEM_PROMPT: &str = "Follow the instruction at the start of the user message. \
Reply with the resulting text only: no preamble, no code fences, no quotation marks.";

/// User turn accompanying the page image.
pub fn image_qa_user_message(question: &str, top_k: usize) -> String {
    format!(
        "Question: {}\n\nReturn at most {} answers, best first.",
        question.trim(),
        top_k.max(1)
    )
}

/// User turn for text QA: the question followed by its context window.
pub fn text_qa_user_message(question: &str, context: &str) -> String {
    format!(
        "Question: {}\n\nPassage:\n\"\"\"{}\"\"\"",
        question.trim(),
        context
    )
}

/// Prompt sent to the code summarizer.
pub fn code_summary_prompt(span: &str) -> String {
    format!("{}{}", SUMMARIZE_PREFIX, span)
}

/// Prompt sent to the simplifier.
pub fn simplify_prompt(span: &str) -> String {
    format!("{}{}", SIMPLIFY_PREFIX, span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refinement_prompts_are_prefix_plus_span() {
        assert_eq!(code_summary_prompt("x = 1;"), "summarize: x = 1;");
        assert_eq!(
            simplify_prompt("Amortised cost"),
            "Explain in simple terms: Amortised cost"
        );
    }

    #[test]
    fn image_prompt_demands_verbatim_json() {
        assert!(IMAGE_QA_SYSTEM_PROMPT.contains("EXACTLY"));
        assert!(IMAGE_QA_SYSTEM_PROMPT.contains(r#""answers""#));
    }

    #[test]
    fn user_messages_carry_question() {
        let m = image_qa_user_message("  What is the title? ", 0);
        assert!(m.starts_with("Question: What is the title?"));
        assert!(m.contains("at most 1 answers"));
        let t = text_qa_user_message("Who?", "Alice wrote it.");
        assert!(t.contains("Alice wrote it."));
    }
}
