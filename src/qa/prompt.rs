use crate::index::RetrievedSegment;

const INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Stuff every retrieved segment into a single question-answering prompt.
pub(crate) fn build_prompt(question: &str, sources: &[RetrievedSegment]) -> String {
    let context = sources
        .iter()
        .map(|source| source.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{INSTRUCTIONS}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_context_in_rank_order_and_question() {
        let sources = vec![
            RetrievedSegment {
                rank: 1,
                page: 2,
                score: 0.9,
                text: "Bees dance.".into(),
            },
            RetrievedSegment {
                rank: 2,
                page: 1,
                score: 0.4,
                text: "Lava flows.".into(),
            },
        ];
        let prompt = build_prompt("Why do bees dance?", &sources);

        let bees = prompt.find("Bees dance.").expect("first source");
        let lava = prompt.find("Lava flows.").expect("second source");
        assert!(bees < lava);
        assert!(prompt.starts_with("Use the following pieces of context"));
        assert!(prompt.ends_with("Question: Why do bees dance?\nHelpful Answer:"));
    }
}
