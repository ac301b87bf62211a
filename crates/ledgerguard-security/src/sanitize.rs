// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output sanitisation for user-supplied strings.

use std::collections::HashSet;

/// Escape `s` for use as HTML text or an attribute value, quoted or not.
///
/// Every character with meaning in HTML, whitespace included, is replaced
/// by an entity, so the result renders as the literal input.
pub fn escape_text(s: &str) -> String {
    ammonia::clean_text(s)
}

/// Keep basic formatting and links; drop everything else.
///
/// `script`, `style`, `iframe`, `object`, `embed` and `form` are removed
/// together with their content. Event-handler attributes never survive, and
/// links keep only `http`, `https` and `mailto` targets.
pub fn sanitize_html(html: &str) -> String {
    ammonia::Builder::empty()
        .add_tags(&[
            "b", "strong", "i", "em", "u", "p", "br", "ul", "ol", "li", "a", "code", "pre", "span",
            "blockquote",
        ])
        .add_tag_attributes("a", &["href", "title"])
        .add_url_schemes(&["http", "https", "mailto"])
        .link_rel(Some("noopener noreferrer"))
        .clean_content_tags(HashSet::from([
            "script", "style", "iframe", "object", "embed", "form",
        ]))
        .clean(html)
        .to_string()
}
