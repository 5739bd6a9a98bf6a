//! Prompt construction from a template and a class-name list

use serde::{Deserialize, Serialize};

/// Prefix and suffix wrapped around every class name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub suffix: String,
}

impl PromptTemplate {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// One prompt per class name, in class order
    pub fn build(&self, class_names: &[String]) -> Vec<String> {
        build_prompts(class_names, &self.prefix, &self.suffix)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new("a photo of a", "")
    }
}

/// Build `"{prefix} {class} {suffix}"` for every class name
///
/// A single trailing space on the prefix is dropped first, and each prompt is
/// trimmed so an empty prefix or suffix leaves no dangling space.
pub fn build_prompts(class_names: &[String], prefix: &str, suffix: &str) -> Vec<String> {
    let prefix = prefix.strip_suffix(' ').unwrap_or(prefix);

    class_names
        .iter()
        .map(|name| format!("{} {} {}", prefix, name, suffix).trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_template() {
        let prompts = PromptTemplate::default().build(&names(&["cat", "dog"]));
        assert_eq!(prompts, vec!["a photo of a cat", "a photo of a dog"]);
    }

    #[test]
    fn test_trailing_space_on_prefix() {
        let prompts = build_prompts(&names(&["cat"]), "a photo of a ", "");
        assert_eq!(prompts, vec!["a photo of a cat"]);
    }

    #[test]
    fn test_only_one_trailing_space_is_stripped() {
        // the inner of the two spaces survives
        let prompts = build_prompts(&names(&["cat"]), "a  ", "");
        assert_eq!(prompts, vec!["a  cat"]);
    }

    #[test]
    fn test_suffix() {
        let prompts = build_prompts(&names(&["tabby"]), "a photo of a", "cat, a type of pet.");
        assert_eq!(prompts, vec!["a photo of a tabby cat, a type of pet."]);
    }

    #[test]
    fn test_empty_prefix_and_suffix() {
        let prompts = build_prompts(&names(&["cat"]), "", "");
        assert_eq!(prompts, vec!["cat"]);
    }

    proptest! {
        #[test]
        fn prop_length_and_order_preserved(
            classes in proptest::collection::vec("[a-z]{1,12}", 0..24),
            prefix in "[a-z ]{0,16}",
            suffix in "[a-z ]{0,16}",
        ) {
            let prompts = build_prompts(&classes, &prefix, &suffix);
            prop_assert_eq!(prompts.len(), classes.len());
            for (prompt, class) in prompts.iter().zip(&classes) {
                prop_assert!(prompt.contains(class.as_str()));
                prop_assert_eq!(prompt.trim(), prompt.as_str());
            }
        }
    }
}
