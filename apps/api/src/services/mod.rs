// Domain services. Each one is built per request from the request's scope;
// AI calls go through the orchestrator, never the LLM client.

pub mod leave;
pub mod prompts;
pub mod resume;
pub mod scrub;
pub mod wellbeing;
