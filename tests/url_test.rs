//! Integration tests for URL normalization and same-site checks

use proptest::prelude::*;
use sitemapper::crawler::url::{is_same_site, UrlNormalizer};
use sitemapper::utils::error::UrlError;
use url::Url;

fn base() -> Url {
    Url::parse("https://www.portal.test/servicos/index.html").unwrap()
}

/// Equivalent spellings collapse onto one key
#[test]
fn test_equivalent_urls_share_a_key() {
    let normalizer = UrlNormalizer::new();
    let spellings = [
        "https://WWW.Portal.test/servicos/",
        "https://www.portal.test:443/servicos",
        "https://www.portal.test/servicos#topo",
        "https://www.portal.test//servicos/",
        "/servicos/",
        "../servicos",
    ];

    let keys: Vec<String> = spellings
        .iter()
        .map(|raw| normalizer.normalize(raw, Some(&base())).unwrap().to_string())
        .collect();

    for key in &keys {
        assert_eq!(key, "https://www.portal.test/servicos");
    }
}

#[test]
fn test_query_kept_unless_stripped() {
    let keep = UrlNormalizer::new();
    let strip = UrlNormalizer::new().with_strip_query(true);

    assert_eq!(
        keep.normalize_str("/busca?q=iptu", base().as_str()).unwrap(),
        "https://www.portal.test/busca?q=iptu"
    );
    assert_eq!(
        strip.normalize_str("/busca?q=iptu", base().as_str()).unwrap(),
        "https://www.portal.test/busca"
    );
}

#[test]
fn test_rejections() {
    let normalizer = UrlNormalizer::new();
    assert!(matches!(normalizer.normalize("", None), Err(UrlError::Empty)));
    assert!(matches!(
        normalizer.normalize("not a url", None),
        Err(UrlError::Invalid(_))
    ));
    assert!(matches!(
        normalizer.normalize("ftp://files.portal.test/a", None),
        Err(UrlError::UnsupportedScheme(_))
    ));
}

#[test]
fn test_skip_extensions_case_insensitive() {
    let normalizer = UrlNormalizer::new().with_skip_extensions(&[".PDF", "jpg"]);
    let pdf = Url::parse("https://www.portal.test/docs/Edital.pdf").unwrap();
    let jpg = Url::parse("https://www.portal.test/img/foto.JPG").unwrap();
    let page = Url::parse("https://www.portal.test/docs/edital").unwrap();

    assert!(normalizer.has_skipped_extension(&pdf));
    assert!(normalizer.has_skipped_extension(&jpg));
    assert!(!normalizer.has_skipped_extension(&page));
}

#[test]
fn test_same_site_rules() {
    let root = Url::parse("https://www.portal.test/").unwrap();
    let http = Url::parse("http://www.portal.test/a").unwrap();
    let sub = Url::parse("https://cdn.portal.test/a").unwrap();

    assert!(is_same_site(&http, &root, false));
    assert!(!is_same_site(&http, &root, true));
    assert!(!is_same_site(&sub, &root, false));
}

proptest! {
    #[test]
    fn prop_normalize_is_idempotent(path in "(/[a-z0-9]{0,6}){0,4}/?", fragment in "[a-z]{0,5}") {
        let normalizer = UrlNormalizer::new();
        let raw = format!("https://Portal.test{path}#{fragment}");
        let once = normalizer.normalize(&raw, None).unwrap();
        let twice = normalizer.normalize(once.as_str(), None).unwrap();
        prop_assert_eq!(once.as_str(), twice.as_str());
    }

    #[test]
    fn prop_normalized_form_is_canonical(path in "(/[a-z0-9]{0,6}){0,4}/?", query in "[a-z=]{0,6}") {
        let normalizer = UrlNormalizer::new();
        let raw = format!("https://portal.test{path}?{query}#frag");
        let url = normalizer.normalize(&raw, None).unwrap();

        prop_assert!(url.fragment().is_none());
        prop_assert!(!url.path().contains("//"));
        prop_assert!(url.path() == "/" || !url.path().ends_with('/'));
        prop_assert_eq!(url.host_str(), Some("portal.test"));
    }
}
