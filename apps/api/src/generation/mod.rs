// Poster generation pipeline.
// Keywords → images → candidates → markup → render → judge, run by the orchestrator.
// All LLM calls go through the llm_client::TextGenerator trait.

pub mod evaluator;
pub mod generator;
pub mod handlers;
pub mod images;
pub mod keywords;
pub mod markup;
pub mod orchestrator;
pub mod prompts;
pub mod retry;

#[cfg(test)]
pub mod test_support;
