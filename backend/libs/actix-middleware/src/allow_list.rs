use std::sync::Arc;

/// Ordered set of path prefixes exempt from a stage
///
/// Matching is a plain prefix test, so `/api/v1/auth/password/reset` also
/// covers `/api/v1/auth/password/reset/request`.
#[derive(Debug, Clone, Default)]
pub struct PathAllowList {
    prefixes: Arc<[String]>,
}

impl PathAllowList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
