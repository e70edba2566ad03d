//! # LLM Helpers
//!
//! Structured-output calls through radkit. The provider match lives here
//! once so the planner and specialists only name their output type.

/// Macro to run an `LlmFunction` with any provider.
///
/// Evaluates to `anyhow::Result<$output_type>`. Provider construction
/// failures (usually a missing API key) are returned as errors, not raised.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config: &$crate::models::ModelConfig = $config;
        let result = async {
            let output: anyhow::Result<$output_type> = match config.provider {
                LlmProvider::Anthropic => {
                    let llm = AnthropicLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run($input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::OpenAI => {
                    let mut llm = OpenAILlm::from_env(&config.model)?;
                    if let Some(base_url) = &config.base_url {
                        llm = llm.with_base_url(base_url);
                    }
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run($input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::Gemini => {
                    let llm = GeminiLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run($input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::OpenRouter => {
                    let llm = OpenRouterLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run($input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::Grok => {
                    let llm = GrokLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run($input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::DeepSeek => {
                    let llm = DeepSeekLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run($input)
                        .await
                        .map_err(Into::into)
                }
            };
            output
        }
        .await;
        result
    }};
}

pub use run_llm_function;
