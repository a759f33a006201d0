use glob::Pattern;
use tracing::warn;

use crate::instance::ServiceInstance;

/// Glob predicate over a service instance.
///
/// The name pattern and each TXT pattern use Unix-style wildcards (`*`, `?`,
/// `[…]`), case-sensitive. An empty pattern list matches everything. TXT
/// patterns are applied left-to-right as successive filters over the
/// instance's TXT records; the instance matches when the surviving list is
/// non-empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceFilter {
    pub name_pattern: String,
    pub txt_patterns: Vec<String>,
}

impl ServiceFilter {
    /// A filter that matches every instance.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_name(pattern: &str) -> Self {
        Self {
            name_pattern: pattern.to_string(),
            ..Self::default()
        }
    }

    pub fn with_txt<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            txt_patterns: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn matches(&self, instance: &ServiceInstance) -> bool {
        if !self.name_pattern.is_empty() && !glob_match(&self.name_pattern, &instance.name) {
            return false;
        }

        if self.txt_patterns.is_empty() {
            return true;
        }

        let mut remaining: Vec<&String> = instance.txt.iter().collect();
        for pattern in &self.txt_patterns {
            remaining.retain(|text| glob_match(pattern, text.as_str()));
            if remaining.is_empty() {
                return false;
            }
        }
        true
    }
}

/// A pattern that fails to compile matches nothing.
fn glob_match(pattern: &str, text: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(pattern) => pattern.matches(text),
        Err(e) => {
            warn!("Invalid filter pattern '{}': {}", pattern, e);
            false
        }
    }
}
