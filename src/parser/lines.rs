use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Selector};

static PROFESSIONAL_CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#tbl_licensedps tr > td:nth-of-type(2)").unwrap());

/// Standalone business-license shorthand ("BL12345"); noise, not the license code.
static BL_SHORTHAND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^BL\d+$").unwrap());

/// Legend table nested inside the professional cell.
const LEGEND_TABLE_CLASS: &str = "ACA_TDAlignLeftOrRightTop";

/// Raw text nodes of the professional cells, in document order.
///
/// Cells can nest (a `tr > td` inside another matched cell), so nodes are
/// deduplicated by id. Anything under the legend table is skipped.
pub fn section_text_nodes(section: ElementRef<'_>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut texts = Vec::new();

    for cell in section.select(&PROFESSIONAL_CELL_SEL) {
        for node in cell.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            if !seen.insert(node.id()) {
                continue;
            }
            let in_legend = node.ancestors().any(|a| {
                ElementRef::wrap(a).is_some_and(|el| {
                    el.value().name() == "table" && el.value().attr("class") == Some(LEGEND_TABLE_CLASS)
                })
            });
            if !in_legend {
                texts.push(text.to_string());
            }
        }
    }

    texts
}

/// Trim and drop empty, `*`, phone-label and BL-shorthand fragments.
pub fn clean_lines<'a, I>(fragments: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    fragments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "*" && !s.contains("Phone"))
        .filter(|s| !BL_SHORTHAND_RE.is_match(s))
        .map(str::to_string)
        .collect()
}
