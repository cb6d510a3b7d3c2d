//! Link rewrites that defer a stylesheet once its critical rules are inline.

use ego_tree::NodeId;

use crate::css::is_valid_media_query;
use crate::dom::Document;
use crate::options::PreloadMode;

const LOADER: &str = "function $loadcss(u,m,l){(l=document.createElement('link')).rel='stylesheet';l.href=u;document.head.appendChild(l)}";
const LOADER_CALL: &str =
    "$loadcss(document.currentScript.dataset.href,document.currentScript.dataset.media)";
const SWAP_ONLOAD: &str = "this.title='';this.rel='stylesheet'";

/// Script body applying the sheet at runtime. The lazy variant keeps it on
/// `media=print` until it has loaded.
fn loader_script(lazy: bool) -> String {
    let loader = if lazy {
        LOADER.replacen(
            "l.href",
            "l.media='print';l.onload=function(){l.media=m};l.href",
            1,
        )
    } else {
        LOADER.to_string()
    };
    format!("{loader}{LOADER_CALL}")
}

/// The link's `media` attribute, if it is a valid media query list.
fn validated_media(doc: &Document, link: NodeId) -> Option<String> {
    let media = doc.attr(link, "media")?;
    if media.is_empty() {
        return None;
    }
    if is_valid_media_query(media) {
        Some(media.to_string())
    } else {
        tracing::warn!(media, "discarding invalid media attribute");
        None
    }
}

/// Apply `mode` to `link` and return the nodes it created.
pub fn rewrite_link(
    doc: &mut Document,
    link: NodeId,
    href: &str,
    mode: PreloadMode,
    noscript_fallback: bool,
) -> Vec<NodeId> {
    if mode == PreloadMode::Disabled {
        return Vec::new();
    }

    let media = validated_media(doc, link);
    let media = media.as_deref().unwrap_or("all");
    // Copy before any rewrite so the fallback keeps the original attributes.
    let fallback_link = doc.clone_element(link);
    let mut created = Vec::new();
    let mut wants_noscript = false;
    let mut to_preload = false;

    match mode {
        PreloadMode::Disabled => {}
        PreloadMode::Body => {
            if let Some(body) = doc.body() {
                doc.append(body, link);
            }
        }
        PreloadMode::Js | PreloadMode::JsLazy => {
            let script = doc.create_element("script");
            doc.set_attr(script, "data-href", href);
            doc.set_attr(script, "data-media", media);
            doc.set_text(script, &loader_script(mode == PreloadMode::JsLazy));
            doc.insert_after(link, script);
            created.push(script);
            wants_noscript = true;
            to_preload = true;
        }
        PreloadMode::Media => {
            doc.set_attr(link, "media", "print");
            doc.set_attr(link, "onload", &format!("this.media='{media}'"));
            wants_noscript = true;
        }
        PreloadMode::SwapHigh => {
            doc.set_attr(link, "rel", "alternate stylesheet preload");
            doc.set_attr(link, "title", "styles");
            doc.set_attr(link, "onload", SWAP_ONLOAD);
            wants_noscript = true;
        }
        PreloadMode::SwapLow => {
            doc.set_attr(link, "rel", "alternate stylesheet");
            doc.set_attr(link, "title", "styles");
            doc.set_attr(link, "onload", SWAP_ONLOAD);
            wants_noscript = true;
        }
        PreloadMode::Swap => {
            doc.set_attr(link, "onload", "this.rel='stylesheet'");
            wants_noscript = true;
            to_preload = true;
        }
        PreloadMode::Default => {
            if let (Some(body), Some(copy)) = (doc.body(), doc.clone_element(link)) {
                doc.remove_attr(copy, "id");
                doc.append(body, copy);
                created.push(copy);
            }
            to_preload = true;
        }
    }

    // An href able to close the element would let the fallback inject markup.
    if noscript_fallback && wants_noscript && !href.contains("</noscript>") {
        if let Some(copy) = fallback_link {
            let noscript = doc.create_element("noscript");
            doc.remove_attr(copy, "id");
            doc.append(noscript, copy);
            doc.insert_after(link, noscript);
            created.push(noscript);
        }
    }

    if to_preload {
        doc.set_attr(link, "rel", "preload");
        doc.set_attr(link, "as", "style");
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(link_markup: &str, mode: PreloadMode) -> String {
        let mut doc = Document::parse(&format!(
            "<html><head>{link_markup}</head><body><h1>x</h1></body></html>"
        ));
        let link = doc.select_first("link").unwrap().unwrap();
        let href = doc.attr(link, "href").unwrap_or_default().to_string();
        rewrite_link(&mut doc, link, &href, mode, true);
        doc.serialize().unwrap()
    }

    const LINK: &str = "<link rel=\"stylesheet\" href=\"/style.css\">";

    #[test]
    fn disabled_leaves_the_link_alone() {
        assert!(rewrite(LINK, PreloadMode::Disabled).contains(LINK));
    }

    #[test]
    fn media_mode_restores_validated_media() {
        let html = rewrite(LINK, PreloadMode::Media);
        assert!(html.contains(
            "<link rel=\"stylesheet\" href=\"/style.css\" media=\"print\" onload=\"this.media='all'\"><noscript><link rel=\"stylesheet\" href=\"/style.css\"></noscript>"
        ), "{html}");

        let html = rewrite(
            "<link rel=\"stylesheet\" href=\"/style.css\" media=\"screen and (min-width: 480px)\">",
            PreloadMode::Media,
        );
        assert!(html.contains("onload=\"this.media='screen and (min-width: 480px)'\""), "{html}");
    }

    #[test]
    fn invalid_media_is_never_echoed_into_handlers() {
        let html = rewrite(
            "<link rel=\"stylesheet\" href=\"/style.css\" media=\"foo);color:red;(bar\">",
            PreloadMode::Media,
        );
        assert!(html.contains("onload=\"this.media='all'\""), "{html}");
        assert!(!html.contains("this.media='foo"), "{html}");

        let html = rewrite(
            "<link rel=\"stylesheet\" href=\"/style.css\" media=\"foo);color:red;(bar\">",
            PreloadMode::Js,
        );
        assert!(html.contains("data-media=\"all\""), "{html}");
    }

    #[test]
    fn js_mode_injects_loader_after_noscript() {
        let html = rewrite(LINK, PreloadMode::Js);
        assert!(html.contains(
            "<link rel=\"preload\" href=\"/style.css\" as=\"style\"><noscript><link rel=\"stylesheet\" href=\"/style.css\"></noscript><script data-href=\"/style.css\" data-media=\"all\">function $loadcss(u,m,l){(l=document.createElement('link')).rel='stylesheet';l.href=u;document.head.appendChild(l)}$loadcss(document.currentScript.dataset.href,document.currentScript.dataset.media)</script>"
        ), "{html}");
    }

    #[test]
    fn js_lazy_applies_print_media_until_loaded() {
        let html = rewrite(LINK, PreloadMode::JsLazy);
        assert!(html.contains(
            "l.media='print';l.onload=function(){l.media=m};l.href=u;"
        ), "{html}");
    }

    #[test]
    fn swap_variants() {
        let html = rewrite(LINK, PreloadMode::Swap);
        assert!(html.contains(
            "<link rel=\"preload\" href=\"/style.css\" onload=\"this.rel='stylesheet'\" as=\"style\">"
        ), "{html}");

        let html = rewrite(LINK, PreloadMode::SwapLow);
        assert!(html.contains(
            "<link rel=\"alternate stylesheet\" href=\"/style.css\" title=\"styles\" onload=\"this.title='';this.rel='stylesheet'\">"
        ), "{html}");

        let html = rewrite(LINK, PreloadMode::SwapHigh);
        assert!(html.contains("rel=\"alternate stylesheet preload\""), "{html}");
        assert!(html.contains("<noscript>"), "{html}");
    }

    #[test]
    fn body_mode_moves_the_link() {
        let html = rewrite(LINK, PreloadMode::Body);
        assert!(html.contains(&format!("<h1>x</h1>{LINK}</body>")), "{html}");
        assert!(!html.contains("<noscript>"));
    }

    #[test]
    fn default_mode_preloads_and_copies_to_body() {
        let html = rewrite(
            "<link rel=\"stylesheet\" href=\"/style.css\" id=\"main\">",
            PreloadMode::Default,
        );
        assert!(html.contains(
            "<head><link rel=\"preload\" href=\"/style.css\" id=\"main\" as=\"style\"></head>"
        ), "{html}");
        assert!(html.contains(&format!("<h1>x</h1>{LINK}</body>")), "{html}");
    }

    #[test]
    fn noscript_is_skipped_for_hostile_hrefs() {
        let mut doc = Document::parse("<html><head><link rel=\"stylesheet\" href=\"/a.css\"></head><body></body></html>");
        let link = doc.select_first("link").unwrap().unwrap();
        let created = rewrite_link(&mut doc, link, "/a.css</noscript>.css", PreloadMode::Media, true);
        assert!(created.is_empty());
    }

    #[test]
    fn noscript_fallback_can_be_disabled() {
        let mut doc = Document::parse(&format!("<html><head>{LINK}</head><body></body></html>"));
        let link = doc.select_first("link").unwrap().unwrap();
        rewrite_link(&mut doc, link, "/style.css", PreloadMode::Swap, false);
        assert!(!doc.serialize().unwrap().contains("<noscript>"));
    }
}
