//! URL normalization and same-site policy
//!
//! Every discovered link is turned into a canonical [`Url`] before it is
//! compared against the visited set. Canonical form:
//! - relative links resolved against the page they were found on
//! - scheme and host lower-cased, default ports (80/443) removed
//! - fragment removed (and the query too, when configured)
//! - duplicate slashes in the path collapsed
//! - one trailing slash removed unless the path is `/`

use url::Url;

use crate::config::CrawlerConfig;
use crate::utils::error::UrlError;

const SUPPORTED_SCHEMES: &[&str] = &["http", "https"];

/// Canonicalizes raw links into comparable keys
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    strip_query: bool,
    /// Lower-cased extensions without the leading dot
    skip_extensions: Vec<String>,
}

impl UrlNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a normalizer from crawler settings
    #[must_use]
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new()
            .with_strip_query(config.strip_query)
            .with_skip_extensions(&config.skip_extensions)
    }

    #[must_use]
    pub fn with_strip_query(mut self, strip_query: bool) -> Self {
        self.strip_query = strip_query;
        self
    }

    #[must_use]
    pub fn with_skip_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.skip_extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Normalize `raw`, resolving it against `base` when it is relative
    ///
    /// # Errors
    ///
    /// - `UrlError::Empty` for blank input
    /// - `UrlError::Invalid` when the string is not a well-formed URL
    /// - `UrlError::UnsupportedScheme` for anything other than http/https
    /// - `UrlError::MissingHost` when no host can be determined
    pub fn normalize(&self, raw: &str, base: Option<&Url>) -> Result<Url, UrlError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UrlError::Empty);
        }

        let parsed = match base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        };
        let mut url = parsed.map_err(|_| UrlError::Invalid(raw.to_string()))?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(UrlError::MissingHost(raw.to_string()));
        }

        url.set_fragment(None);
        if self.strip_query || url.query() == Some("") {
            url.set_query(None);
        }

        let path = canonical_path(url.path());
        url.set_path(&path);

        Ok(url)
    }

    /// Normalize `raw` against a base given as a string
    pub fn normalize_str(&self, raw: &str, base: &str) -> Result<String, UrlError> {
        let base = Url::parse(base).map_err(|_| UrlError::Invalid(base.to_string()))?;
        self.normalize(raw, Some(&base)).map(String::from)
    }

    /// Whether the URL path ends with one of the skip-listed extensions
    pub fn has_skipped_extension(&self, url: &Url) -> bool {
        if self.skip_extensions.is_empty() {
            return false;
        }

        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.skip_extensions.iter().any(|s| *s == ext))
    }
}

/// Collapse repeated slashes and drop a single trailing slash (root excepted)
fn canonical_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }

    if out.is_empty() {
        out.push('/');
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Same-site membership derived from the normalized seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePolicy {
    host: String,
    scheme: String,
    match_scheme: bool,
}

impl SitePolicy {
    /// Policy for the site of `root`; `root` must already be normalized
    pub fn from_root(root: &Url, match_scheme: bool) -> Self {
        Self {
            host: root.host_str().unwrap_or_default().to_string(),
            scheme: root.scheme().to_string(),
            match_scheme,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Exact host comparison, plus scheme equality when configured
    pub fn is_same_site(&self, url: &Url) -> bool {
        let same_host = url.host_str() == Some(self.host.as_str());
        same_host && (!self.match_scheme || url.scheme() == self.scheme)
    }
}

/// Check whether `url` belongs to the same site as `root`
pub fn is_same_site(url: &Url, root: &Url, match_scheme: bool) -> bool {
    SitePolicy::from_root(root, match_scheme).is_same_site(url)
}
