/// Reply used when retrieval found nothing; generation is skipped.
pub const NO_CONTEXT_ANSWER: &str = "I could not find any relevant regulatory content in the indexed SEBI, RBI and exchange documents for this question, so I can't answer it from the available sources. Please rephrase the question or ask about Indian securities, banking or payment regulations.";

/// Reply used when the generation service fails.
pub const FALLBACK_ANSWER: &str = "I couldn't generate an answer right now because the answer service is unavailable. Please try again later. For authoritative guidance consult www.sebi.gov.in or www.rbi.org.in.";

/// Reply used when no index has been built yet.
pub const INDEX_UNAVAILABLE_ANSWER: &str = "The regulatory document index is not available yet, so I can't look up an answer. Please try again once the documents have been indexed.";

pub fn answer_prompt(question: &str, excerpt_blocks: &str) -> String {
    // Contract:
    // - answer only from the excerpts;
    // - cite excerpts with their [[source:N]] marker;
    // - decline when the excerpts do not cover the question.
    format!(
        r#"You are an expert on Indian financial regulation (SEBI regulations, RBI guidelines, stock exchange rules and securities law). You give accurate, practical answers.

Rules (non-negotiable):
1) Answer ONLY from the regulatory excerpts provided below. Do not invent regulations, limits or penalties.
2) Cite the excerpts you rely on with their marker, e.g. [[source:1]].
3) If the excerpts do not contain enough information, say so plainly instead of guessing.

Regulatory excerpts:
{excerpt_blocks}

Question: {question}

Instructions:
1. Give a clear, direct answer to the question.
2. Cite specific regulations, circulars or guidelines from the excerpts when applicable.
3. Include practical steps or requirements if relevant.
4. Mention any important warnings or risks.
5. For compliance questions, state the penalties and legal consequences of violations.
6. Always say clearly if something is illegal, risky or needs special permission.

Answer:"#
    )
}
