// Prompt templates for LLM interactions
//
// This module contains all prompt templates used by the agent variants.
// Prompts are versioned for reproducibility.

use std::collections::HashMap;

/// Prompt template structure
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
}

impl PromptTemplate {
    /// Render the user template, replacing `{{name}}` placeholders
    ///
    /// Placeholders without a value are left untouched.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        let mut rendered = String::with_capacity(self.user_template.len());
        let mut rest = self.user_template.as_str();

        while let Some(start) = rest.find("{{") {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = after[..end].trim();
                    match variables.get(key) {
                        Some(value) => rendered.push_str(value),
                        None => rendered.push_str(&rest[start..start + 2 + end + 2]),
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    rendered.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

pub mod library {
    use super::PromptTemplate;

    pub fn conversation() -> PromptTemplate {
        PromptTemplate {
            name: "conversation".to_string(),
            version: "1.0.0".to_string(),
            system: "You are a helpful assistant agent working inside a team of \
                     specialized agents. Answer concisely."
                .to_string(),
            user_template: "Conversation so far:\n{{history}}\n\nUser: {{message}}".to_string(),
        }
    }

    pub fn task_execution() -> PromptTemplate {
        PromptTemplate {
            name: "task_execution".to_string(),
            version: "1.0.0".to_string(),
            system: "You are executing one step of a larger plan. \
                     Produce only the result of this step."
                .to_string(),
            user_template: "Step: {{description}}\n\
                            Input:\n{{input}}\n\n\
                            Provide the output of this step."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn render_substitutes_variables() {
        let template = library::task_execution();
        let rendered = template.render(&vars(&[("description", "Fetch data"), ("input", "{}")]));

        assert!(rendered.starts_with("Step: Fetch data\n"));
        assert!(rendered.contains("Input:\n{}"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn render_keeps_unknown_placeholders() {
        let template = library::conversation();
        let rendered = template.render(&vars(&[("message", "hi")]));

        assert!(rendered.contains("{{history}}"));
        assert!(rendered.ends_with("User: hi"));
    }

    #[test]
    fn render_handles_unterminated_placeholder() {
        let template = PromptTemplate {
            name: "t".to_string(),
            version: "1".to_string(),
            system: String::new(),
            user_template: "Hello {{name".to_string(),
        };

        assert_eq!(template.render(&HashMap::new()), "Hello {{name");
    }
}
