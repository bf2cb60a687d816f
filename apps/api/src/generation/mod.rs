// Course generation: credit reservation, model call, parsing, validation, persistence.
// All model calls go through llm_client; no direct HTTP calls here.

pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod response_parser;
pub mod store;
pub mod validation;
