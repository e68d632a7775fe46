//! Prompt construction for test generation.

use crate::analyzer::SourceLanguage;
use crate::pipeline::FunctionWorkItem;

/// Maximum function body length included verbatim in a prompt.
const MAX_BODY_CHARS: usize = 4000;

/// Builds generation prompts from function work items.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the prompt for one function.
    pub fn build(&self, item: &FunctionWorkItem) -> String {
        let function = &item.function;
        let framework = match function.language {
            SourceLanguage::C => "GoogleTest with C linkage (wrap the include in extern \"C\")",
            SourceLanguage::Cpp => "GoogleTest",
        };

        let mut body = function.body.clone();
        if body.len() > MAX_BODY_CHARS {
            body.truncate(MAX_BODY_CHARS);
            body.push_str("\n/* ... truncated ... */");
        }

        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Write unit tests using {framework} for the following {} function.\n\n",
            function.language
        ));
        prompt.push_str(&format!(
            "Source file: {}\nSignature: {}\n",
            function.file.display(),
            function.signature()
        ));
        if function.is_static {
            prompt.push_str("The function has internal linkage (static).\n");
        }
        if !body.is_empty() {
            prompt.push_str(&format!("\nImplementation:\n```\n{body}\n```\n"));
        }
        prompt.push_str(
            "\nCover normal inputs, boundary values, and error paths. \
             Use a test suite named after the function. \
             Respond with test code only, no explanations.\n",
        );

        prompt
    }
}
