// Summarizer prompt templates.

pub const SUMMARY_SYSTEM: &str = "\
You summarize personal memos and to-do notes. \
Reply with the summary text only, in the same language as the memo. \
No preamble, no markdown headings.";

pub const SUMMARY_PROMPT: &str = r#"Summarize the following memo in at most three short sentences.
Keep names, dates and amounts exactly as written.

MEMO:
{content}"#;

pub fn summary_prompt(content: &str) -> String {
    SUMMARY_PROMPT.replace("{content}", content)
}
