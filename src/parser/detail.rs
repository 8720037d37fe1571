use std::sync::LazyLock;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use super::professional::{self, ProfessionalFields};

static WORK_LOCATION_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"table#tbl_worklocation span[class="fontbold"]"#).unwrap()
});
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static HEADING_SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1 span").unwrap());

const PROFESSIONAL_MARKER: &str = "Licensed Professional:";

/// Everything taken from one permit detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailData {
    pub work_location: Option<String>,
    pub has_professional: bool,
    pub professional: ProfessionalFields,
}

pub fn parse_detail(html: &str) -> DetailData {
    let doc = Html::parse_document(html);

    let professional_cell = find_professional_cell(&doc);
    DetailData {
        work_location: work_location(&doc),
        has_professional: professional_cell.is_some(),
        professional: professional_cell
            .map(professional::from_section)
            .unwrap_or_default(),
    }
}

fn work_location(doc: &Html) -> Option<String> {
    doc.select(&WORK_LOCATION_SEL)
        .next()
        .map(|span| span.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Outermost `td` holding an `h1 span` labelled "Licensed Professional:".
fn find_professional_cell(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&TD_SEL).find(|td| {
        td.select(&HEADING_SPAN_SEL).any(|span| {
            span.children().any(|c| match c.value() {
                Node::Text(t) => t.contains(PROFESSIONAL_MARKER),
                _ => false,
            })
        })
    })
}
