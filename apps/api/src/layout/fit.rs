//! Page declaration: injects the page box into generated markup before rendering.

use std::sync::OnceLock;

use regex::Regex;

use crate::layout::page::PageSpec;

/// Marker attribute so a document is never declared twice.
const PAGE_STYLE_ID: &str = "placard-page";

fn head_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<head(\s[^>]*)?>").expect("static regex"))
}

fn html_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<html(\s[^>]*)?>").expect("static regex"))
}

/// Returns `markup` with a `<style>` block declaring the page size and margin.
///
/// Insertion point, first that exists: right after `<head>`, in a new `<head>`
/// right after `<html>`, or at the very start. The block goes first so any
/// `@page` rule the generator wrote itself still wins on conflict.
pub fn declare_page(markup: &str, page: &PageSpec) -> String {
    if markup.contains(PAGE_STYLE_ID) {
        return markup.to_string();
    }

    let style = format!(
        "<style id=\"{PAGE_STYLE_ID}\">{}</style>",
        page.page_rule()
    );

    if let Some(m) = head_open().find(markup) {
        return splice(markup, m.end(), &style);
    }
    if let Some(m) = html_open().find(markup) {
        return splice(markup, m.end(), &format!("<head>{style}</head>"));
    }
    format!("{style}{markup}")
}

fn splice(markup: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(markup.len() + insert.len());
    out.push_str(&markup[..at]);
    out.push_str(insert);
    out.push_str(&markup[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::page::default_page_spec;

    #[test]
    fn test_injects_after_head() {
        let markup = "<!DOCTYPE html><html><head><title>x</title></head><body></body></html>";
        let out = declare_page(markup, &default_page_spec());
        assert!(out.starts_with(
            "<!DOCTYPE html><html><head><style id=\"placard-page\">@page { size: 8.5in 11in;"
        ));
        assert!(out.ends_with("<title>x</title></head><body></body></html>"));
    }

    #[test]
    fn test_does_not_mistake_header_for_head() {
        let markup = "<html lang=\"en\"><body><header>Chess</header></body></html>";
        let out = declare_page(markup, &default_page_spec());
        assert!(out.starts_with("<html lang=\"en\"><head><style id=\"placard-page\">"));
        assert!(out.contains("<header>Chess</header>"));
    }

    #[test]
    fn test_head_with_attributes_and_uppercase() {
        let markup = "<HTML><HEAD profile=\"x\"></HEAD></HTML>";
        let out = declare_page(markup, &default_page_spec());
        assert!(out.starts_with("<HTML><HEAD profile=\"x\"><style"));
    }

    #[test]
    fn test_fragment_gets_style_prefix() {
        let out = declare_page("<div>Chess</div>", &default_page_spec());
        assert!(out.starts_with("<style id=\"placard-page\">"));
        assert!(out.ends_with("<div>Chess</div>"));
    }

    #[test]
    fn test_declaring_twice_is_a_no_op() {
        let page = default_page_spec();
        let once = declare_page("<html><head></head></html>", &page);
        let twice = declare_page(&once, &page);
        assert_eq!(once, twice);
    }
}
