use crate::config::{ContentTypeConfig, TaxonomyConfig};
use serde::Serialize;

/// The content types and taxonomies the host knows about.
#[derive(Debug, Clone, Serialize)]
pub struct ContentTypeRegistry {
    content_types: Vec<ContentTypeConfig>,
    taxonomies: Vec<TaxonomyConfig>,
}

impl ContentTypeRegistry {
    /// Builds the registry from configuration. An empty list of content types
    /// means "use the built-in set"; the same goes for taxonomies.
    pub fn new(content_types: Vec<ContentTypeConfig>, taxonomies: Vec<TaxonomyConfig>) -> Self {
        let content_types = if content_types.is_empty() { builtin_content_types() } else { content_types };
        let taxonomies = if taxonomies.is_empty() { builtin_taxonomies() } else { taxonomies };

        for content_type in &content_types {
            for taxonomy in &content_type.taxonomies {
                if !taxonomies.iter().any(|t| &t.name == taxonomy) {
                    log::warn!(
                        "Content type '{}' references unknown taxonomy '{}'; it will be ignored.",
                        content_type.name, taxonomy
                    );
                }
            }
        }

        ContentTypeRegistry { content_types, taxonomies }
    }

    pub fn types(&self) -> &[ContentTypeConfig] {
        &self.content_types
    }

    pub fn get(&self, name: &str) -> Option<&ContentTypeConfig> {
        self.content_types.iter().find(|t| t.name == name)
    }

    pub fn is_public(&self, name: &str) -> bool {
        self.get(name).map_or(false, |t| t.public)
    }

    pub fn public_types(&self) -> Vec<&ContentTypeConfig> {
        self.content_types.iter().filter(|t| t.public).collect()
    }

    pub fn taxonomy(&self, name: &str) -> Option<&TaxonomyConfig> {
        self.taxonomies.iter().find(|t| t.name == name)
    }

    /// Taxonomies applicable to `post_type`, in declaration order.
    pub fn taxonomies_for(&self, post_type: &str) -> Vec<&TaxonomyConfig> {
        self.get(post_type)
            .map(|content_type| {
                content_type
                    .taxonomies
                    .iter()
                    .filter_map(|name| self.taxonomy(name))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        ContentTypeRegistry::new(Vec::new(), Vec::new())
    }
}

fn builtin_content_types() -> Vec<ContentTypeConfig> {
    vec![
        ContentTypeConfig {
            name: "post".to_string(),
            label: "Posts".to_string(),
            public: true,
            taxonomies: vec!["category".to_string(), "post_tag".to_string()],
        },
        ContentTypeConfig {
            name: "page".to_string(),
            label: "Pages".to_string(),
            public: true,
            taxonomies: Vec::new(),
        },
        ContentTypeConfig {
            name: "revision".to_string(),
            label: "Revisions".to_string(),
            public: false,
            taxonomies: Vec::new(),
        },
    ]
}

fn builtin_taxonomies() -> Vec<TaxonomyConfig> {
    vec![
        TaxonomyConfig {
            name: "category".to_string(),
            label: "Categories".to_string(),
            default_term: Some("uncategorized".to_string()),
        },
        TaxonomyConfig {
            name: "post_tag".to_string(),
            label: "Tags".to_string(),
            default_term: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry() {
        let registry = ContentTypeRegistry::default();
        let public: Vec<&str> = registry.public_types().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(public, vec!["post", "page"]);
        assert!(!registry.is_public("revision"));
        assert!(!registry.is_public("nope"));

        let post_taxonomies: Vec<&str> = registry.taxonomies_for("post").iter().map(|t| t.name.as_str()).collect();
        assert_eq!(post_taxonomies, vec!["category", "post_tag"]);
        assert!(registry.taxonomies_for("page").is_empty());
        assert!(registry.taxonomies_for("nope").is_empty());
    }

    #[test]
    fn unknown_taxonomy_references_are_skipped() {
        let registry = ContentTypeRegistry::new(
            vec![ContentTypeConfig {
                name: "book".to_string(),
                label: "Books".to_string(),
                public: true,
                taxonomies: vec!["genre".to_string(), "shelf".to_string()],
            }],
            vec![TaxonomyConfig { name: "genre".to_string(), label: "Genres".to_string(), default_term: None }],
        );
        let names: Vec<&str> = registry.taxonomies_for("book").iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["genre"]);
    }
}
