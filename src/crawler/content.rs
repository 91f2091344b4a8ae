//! Structural analysis of fetched HTML pages
//!
//! Summarizes what an editor migrating a page would care about: how many
//! content blocks and internal files it holds, whether it needs special
//! handling (collapsibles, tabs, forms, complex tables), its column layout
//! and its breadcrumb trail.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{AttentionPoint, PageAnalysis, PageLayout};
use crate::utils::normalize_whitespace;

macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    // Containers tried in order; the first match scopes the analysis
    static ref MAIN_CONTENT: Vec<Selector> = vec![
        parse_selector!(".paginas-internas, .conteudo, .content, .main-content"),
        parse_selector!("main, article, div, section"),
        parse_selector!("body"),
    ];

    static ref COLLAPSIBLE: Selector = parse_selector!(
        "div.collapse, div.accordion, div.panel-collapse, div.panel-default, div.card, div.expandable, \
         section.collapse, section.accordion, section.panel-collapse, section.panel-default, section.card, section.expandable, \
         article.collapse, article.accordion, article.panel-collapse, article.panel-default, article.card, article.expandable"
    );
    static ref CONTENT_ID: Selector = parse_selector!("#conteudo, #content, #main-content");
    static ref SIDEBAR: Selector = parse_selector!(
        "nav.menu, nav.menu-lateral, nav.menu-lateral-flutuante, nav.sidebar, nav.left-menu, \
         div.menu, div.menu-lateral, div.menu-lateral-flutuante, div.sidebar, div.left-menu, \
         aside.menu, aside.menu-lateral, aside.menu-lateral-flutuante, aside.sidebar, aside.left-menu"
    );
    static ref SIDEBAR_TITLE: Vec<Selector> = vec![
        parse_selector!("h1"),
        parse_selector!("h2"),
        parse_selector!("h3"),
        parse_selector!("h4"),
        parse_selector!("h5"),
        parse_selector!("h6"),
        parse_selector!(".title"),
        parse_selector!(".menu-title"),
    ];
    static ref MAIN_BODY: Selector = parse_selector!(".corpo-principal, .main-body, .content-body");
    static ref SECTIONS: Selector = parse_selector!("section, article");
    static ref CONTENT_DIVS: Selector = parse_selector!("div.section, div.content-section, div.widget");
    static ref TABS: Selector = parse_selector!(
        "div.tabs, div.tab-content, div.nav-tabs, ul.tabs, ul.tab-content, ul.nav-tabs"
    );
    static ref FORM: Selector = parse_selector!("form");
    static ref TABLE: Selector = parse_selector!("table");
    static ref ANCHOR: Selector = parse_selector!("a[href]");

    // Breadcrumb containers tried in order
    static ref BREADCRUMB: Vec<Selector> = vec![
        parse_selector!("div.breadcrumbs"),
        parse_selector!("div.breadcrumb, ul.breadcrumb, nav.breadcrumb, ol.breadcrumb"),
        parse_selector!("div#breadcrumbs"),
        parse_selector!("nav[aria-label='Breadcrumb'], nav[aria-label='breadcrumb']"),
        parse_selector!("[class*='bread'], [class*='Bread']"),
    ];
    static ref CRUMB_CURRENT: Selector = parse_selector!(
        "span.current, span.active, span.current-item, strong.current, strong.active, \
         li.current, li.active, li.current-item"
    );
    static ref CRUMB_ITEM: Selector = parse_selector!("span, strong, li");
}

/// Blocks counted beyond this are not reported
pub const MAX_CONTENT_BLOCKS: usize = 20;

/// Tables above this count make a page "complex"
const COMPLEX_TABLE_COUNT: usize = 2;

/// Path extensions that mark a link as a downloadable file
const FILE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "csv", "txt", "zip", "rar",
    "jpg", "jpeg", "png", "gif", "svg", "mp3", "mp4", "wav",
];

/// Upload directories whose links are files whatever their extension
const FILE_DIRECTORIES: &[&str] = &["/documents/", "/wp-content/", "/wp-conteudo/"];

/// Breadcrumb entries naming the home page
const HOME_CRUMBS: &[&str] = &["home", "início", "inicio", "principal", "página inicial"];

/// Analyze `document`, resolving relative links against `base`
pub fn analyze(document: &Html, base: &Url) -> PageAnalysis {
    let main = main_container(document);

    let collapsibles = main.select(&COLLAPSIBLE).count();
    let sidebar = main.select(&SIDEBAR).next();
    let landmarks = [
        main.select(&CONTENT_ID).next().is_some(),
        sidebar.is_some(),
        main.select(&MAIN_BODY).next().is_some(),
    ]
    .into_iter()
    .filter(|found| *found)
    .count();
    let blocks = collapsibles
        + landmarks
        + main.select(&SECTIONS).count()
        + main.select(&CONTENT_DIVS).count();

    let attention = if collapsibles > 0 {
        Some(AttentionPoint::Collapsible)
    } else if main.select(&TABS).next().is_some() {
        Some(AttentionPoint::Tabs)
    } else if main.select(&FORM).next().is_some() {
        Some(AttentionPoint::Form)
    } else if main.select(&TABLE).count() > COMPLEX_TABLE_COUNT {
        Some(AttentionPoint::ComplexTables)
    } else {
        None
    };

    PageAnalysis {
        file_links: count_file_links(main, base),
        content_blocks: blocks.min(MAX_CONTENT_BLOCKS),
        attention,
        layout: if sidebar.is_some() {
            PageLayout::Sidebar
        } else {
            PageLayout::SingleColumn
        },
        sidebar_title: sidebar.and_then(sidebar_title),
        breadcrumb: breadcrumb(document),
    }
}

fn main_container(document: &Html) -> ElementRef<'_> {
    MAIN_CONTENT
        .iter()
        .find_map(|selector| document.select(selector).next())
        .unwrap_or_else(|| document.root_element())
}

fn sidebar_title(sidebar: ElementRef<'_>) -> Option<String> {
    SIDEBAR_TITLE
        .iter()
        .find_map(|selector| sidebar.select(selector).next())
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

/// Links under `main` that point at same-host files
fn count_file_links(main: ElementRef<'_>, base: &Url) -> usize {
    main.select(&ANCHOR)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| url.host_str() == base.host_str())
        .filter(is_file_url)
        .count()
}

/// Whether `url` names a downloadable file rather than a page
pub fn is_file_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    if FILE_DIRECTORIES.iter().any(|dir| path.contains(dir)) {
        return true;
    }
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .is_some_and(|(_, ext)| FILE_EXTENSIONS.contains(&ext))
}

/// Breadcrumb trail without the home entry, ending with the current page
fn breadcrumb(document: &Html) -> Vec<String> {
    let Some(container) = BREADCRUMB
        .iter()
        .find_map(|selector| document.select(selector).next())
    else {
        return Vec::new();
    };

    let mut trail: Vec<String> = container
        .select(&ANCHOR)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty() && !is_home_crumb(text))
        .collect();

    let current = container
        .select(&CRUMB_CURRENT)
        .next()
        .or_else(|| container.select(&CRUMB_ITEM).last())
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty() && !is_home_crumb(text));

    if let Some(current) = current {
        if trail.last() != Some(&current) {
            trail.push(current);
        }
    }
    trail
}

fn is_home_crumb(text: &str) -> bool {
    let lower = text.to_lowercase();
    HOME_CRUMBS.contains(&lower.as_str())
}
