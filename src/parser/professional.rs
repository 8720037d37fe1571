use std::sync::LazyLock;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::trace;

use super::classify::{classify, Classified};
use super::lines::{clean_lines, section_text_nodes};

static PHONE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[class="ACA_PhoneNumberLTR"]"#).unwrap());

/// Licensed-professional contact fields for one detail page.
///
/// Every field is always present; unmatched ones stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfessionalFields {
    pub business_name: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub business_license: String,
    pub po_box: String,
    pub phone_1: String,
    pub phone_2: String,
    pub phone_3: String,
}

impl ProfessionalFields {
    /// Build from cleaned lines: first line is the business name, the rest
    /// go through the classifier chain. Phones are not set here.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut fields = Self::default();
        let mut lines = lines.iter().map(<S as AsRef<str>>::as_ref);

        let Some(name) = lines.next() else {
            return fields;
        };
        fields.business_name = name.to_string();

        for line in lines {
            match classify(line) {
                Some(Classified::PoBox(v)) => fields.po_box = v,
                Some(Classified::Address(v)) => fields.address_line = v,
                Some(Classified::CityStateZip(csz)) => {
                    fields.city = csz.city;
                    fields.state = csz.state;
                    fields.zip = csz.zip;
                }
                Some(Classified::License(v)) => fields.business_license = v,
                None => trace!(line, "Unclassified professional line dropped"),
            }
        }

        fields
    }

    /// Fill phone slots 1-3 in order; extras are ignored.
    pub fn set_phones<I, S>(&mut self, phones: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = [&mut self.phone_1, &mut self.phone_2, &mut self.phone_3];
        for (slot, phone) in slots.into_iter().zip(phones) {
            *slot = phone.into();
        }
    }
}

/// Parse the licensed-professional section from its raw markup.
pub fn parse_section_html(fragment: &str) -> ProfessionalFields {
    let doc = Html::parse_fragment(fragment);
    from_section(doc.root_element())
}

/// Parse the licensed-professional section from an already-parsed element.
pub fn from_section(section: ElementRef<'_>) -> ProfessionalFields {
    let raw = section_text_nodes(section);
    let lines = clean_lines(raw.iter().map(String::as_str));
    let mut fields = ProfessionalFields::from_lines(&lines);
    fields.set_phones(extract_phones(section));
    fields
}

/// Trimmed, non-empty direct text of the phone display elements.
pub fn extract_phones(section: ElementRef<'_>) -> Vec<String> {
    section
        .select(&PHONE_SEL)
        .flat_map(|div| div.children())
        .filter_map(|child| match child.value() {
            Node::Text(t) => Some(t.trim().to_string()),
            _ => None,
        })
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "tests/fixtures/detail_with_professional.html";

    fn section_fixture() -> String {
        std::fs::read_to_string(FIXTURE).unwrap()
    }

    #[test]
    fn end_to_end_lines() {
        let lines = [
            "Acme Plumbing",
            "456 Oak Ave",
            "Missoula, MT 59801",
            "CONTRACTOR 2015-MSS-CON-00062",
        ];
        let f = ProfessionalFields::from_lines(&lines);
        assert_eq!(f.business_name, "Acme Plumbing");
        assert_eq!(f.address_line, "456 Oak Ave");
        assert_eq!(f.city, "Missoula");
        assert_eq!(f.state, "MT");
        assert_eq!(f.zip, "59801");
        assert_eq!(f.business_license, "2015-MSS-CON-00062");
        assert_eq!(f.po_box, "");
    }

    #[test]
    fn name_line_is_never_classified() {
        let f = ProfessionalFields::from_lines(&["PO BOX 1", "Billings MT"]);
        assert_eq!(f.business_name, "PO BOX 1");
        assert_eq!(f.po_box, "");
        assert_eq!(f.city, "Billings");
    }

    #[test]
    fn later_line_overwrites_same_field() {
        let f = ProfessionalFields::from_lines(&["Acme", "PO BOX 1", "PO BOX 2"]);
        assert_eq!(f.po_box, "PO BOX 2");
    }

    #[test]
    fn unmatched_lines_are_dropped() {
        let f = ProfessionalFields::from_lines(&["Acme", "!!!", "???"]);
        assert_eq!(
            f,
            ProfessionalFields {
                business_name: "Acme".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn no_lines_gives_default() {
        let empty: [&str; 0] = [];
        assert_eq!(ProfessionalFields::from_lines(&empty), ProfessionalFields::default());
    }

    #[test]
    fn phones_fill_three_slots_and_drop_extras() {
        let mut f = ProfessionalFields::default();
        f.set_phones(["1", "2", "3", "4"]);
        assert_eq!((f.phone_1.as_str(), f.phone_2.as_str(), f.phone_3.as_str()), ("1", "2", "3"));

        let mut f = ProfessionalFields::default();
        f.set_phones(["1"]);
        assert_eq!(f.phone_1, "1");
        assert_eq!(f.phone_2, "");
        assert_eq!(f.phone_3, "");
    }

    #[test]
    fn phones_from_markup() {
        let html = r#"<div>
            <div class="ACA_PhoneNumberLTR"> (406) 555-0100 </div>
            <div class="ACA_PhoneNumberLTR">   </div>
            <div class="ACA_PhoneNumberLTR other">(406) 555-0199</div>
            <div class="ACA_PhoneNumberLTR">(406) 555-0101</div>
        </div>"#;
        let doc = Html::parse_fragment(html);
        assert_eq!(
            extract_phones(doc.root_element()),
            vec!["(406) 555-0100", "(406) 555-0101"]
        );
    }

    #[test]
    fn fixture_section() {
        let f = parse_section_html(&section_fixture());
        assert_eq!(f.business_name, "ACME PLUMBING & HEATING LLC");
        assert_eq!(f.address_line, "456 OAK AVE STE 2");
        assert_eq!(f.po_box, "PO BOX 1951");
        assert_eq!(f.city, "MISSOULA");
        assert_eq!(f.state, "MT");
        assert_eq!(f.zip, "59801-1234");
        assert_eq!(f.business_license, "2015-MSS-CON-00062");
        assert_eq!(f.phone_1, "(406) 555-0100");
        assert_eq!(f.phone_2, "(406) 555-0101");
        assert_eq!(f.phone_3, "");
    }

    #[test]
    fn parsing_is_idempotent() {
        let html = section_fixture();
        assert_eq!(parse_section_html(&html), parse_section_html(&html));
    }

    #[test]
    fn malformed_markup_gives_all_keys() {
        let f = parse_section_html("<table id=\"tbl_licensedps\"><tr><td><td>Only Name");
        assert_eq!(f.business_name, "Only Name");

        let json = serde_json::to_value(parse_section_html("<<<>>")).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 10);
        assert!(obj.values().all(|v| v.as_str() == Some("")));
    }
}
