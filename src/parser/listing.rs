use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::db::PermitRow;

static CURRENT_PAGE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"span[class="SelectedPageButton font11px"]"#).unwrap()
});
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"table[id*="gdvPermitList"] tr[class*="ACA_TabRow_Odd"], table[id*="gdvPermitList"] tr[class*="ACA_TabRow_Even"]"#,
    )
    .unwrap()
});
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input[name]").unwrap());

const NEXT_LABEL: &str = "Next >";

/// ASP.NET form state, kept in document order. Setting an existing key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn set(&mut self, name: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.0.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

pub struct ListingPage {
    pub page: String,
    pub rows: Vec<PermitRow>,
    pub has_next: bool,
    pub form: FormFields,
}

/// Parse one search-results page. `base` resolves relative detail links.
pub fn parse_listing(html: &str, base: &Url) -> ListingPage {
    let doc = Html::parse_document(html);

    let page = doc
        .select(&CURRENT_PAGE_SEL)
        .next()
        .map(|s| s.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "1".to_string());

    let rows = doc
        .select(&ROW_SEL)
        .map(|row| parse_row(row, &page, base))
        .collect();

    ListingPage {
        has_next: has_next_link(&doc),
        form: form_fields(&doc),
        page,
        rows,
    }
}

fn parse_row(row: ElementRef<'_>, page: &str, base: &Url) -> PermitRow {
    let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
    let cell_text = |n: usize| -> String {
        cells
            .get(n - 1)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    };

    let detail_url = cells
        .get(2)
        .and_then(|c| c.select(&LINK_SEL).next())
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_default();

    PermitRow {
        page: page.to_string(),
        detail_url,
        date: cell_text(2),
        permit_number: cell_text(3),
        permit_type: cell_text(4),
        description: cell_text(5),
        address: cell_text(6),
        status: cell_text(7),
    }
}

fn has_next_link(doc: &Html) -> bool {
    doc.select(&ANCHOR_SEL)
        .any(|a| a.text().collect::<String>().trim() == NEXT_LABEL)
}

/// Form state of a page that has no result grid yet (the search page).
pub fn search_form(html: &str) -> FormFields {
    form_fields(&Html::parse_document(html))
}

/// Every named input with its value (empty when the attribute is missing).
fn form_fields(doc: &Html) -> FormFields {
    let mut form = FormFields::default();
    for input in doc.select(&INPUT_SEL) {
        if let Some(name) = input.value().attr("name").filter(|n| !n.is_empty()) {
            form.set(name, input.value().attr("value").unwrap_or(""));
        }
    }
    form
}
