use serde::Serialize;

use crate::db::PermitRow;
use crate::parser::detail::DetailData;

/// Flat output record: listing fields followed by detail-page fields.
/// Field order is the export column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermitRecord {
    pub page: String,
    pub listing_detail_url: String,
    pub date: String,
    pub permit_number: String,
    pub permit_type: String,
    pub description: String,
    pub address: String,
    pub status: String,
    pub work_location: Option<String>,
    pub license_pro_business_name: String,
    pub license_pro_address_line: String,
    pub license_pro_city: String,
    pub license_pro_state: String,
    pub license_pro_zip: String,
    pub license_pro_business_license: String,
    pub license_pro_po_box: String,
    pub license_pro_phone_num_1: String,
    pub license_pro_phone_num_2: String,
    pub license_pro_phone_num_3: String,
}

impl PermitRecord {
    /// Merge a listing row with its detail page, if one was parsed.
    pub fn assemble(listing: PermitRow, detail: Option<DetailData>) -> Self {
        let mut record = PermitRecord {
            page: listing.page,
            listing_detail_url: listing.detail_url,
            date: listing.date,
            permit_number: listing.permit_number,
            permit_type: listing.permit_type,
            description: listing.description,
            address: listing.address,
            status: listing.status,
            ..Default::default()
        };

        if let Some(detail) = detail {
            let p = detail.professional;
            record.work_location = detail.work_location;
            record.license_pro_business_name = p.business_name;
            record.license_pro_address_line = p.address_line;
            record.license_pro_city = p.city;
            record.license_pro_state = p.state;
            record.license_pro_zip = p.zip;
            record.license_pro_business_license = p.business_license;
            record.license_pro_po_box = p.po_box;
            record.license_pro_phone_num_1 = p.phone_1;
            record.license_pro_phone_num_2 = p.phone_2;
            record.license_pro_phone_num_3 = p.phone_3;
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::professional::ProfessionalFields;

    fn listing() -> PermitRow {
        PermitRow {
            page: "3".into(),
            detail_url: "https://x/d".into(),
            permit_number: "BLD-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn assemble_without_detail() {
        let r = PermitRecord::assemble(listing(), None);
        assert_eq!(r.page, "3");
        assert_eq!(r.listing_detail_url, "https://x/d");
        assert_eq!(r.work_location, None);
        assert_eq!(r.license_pro_business_name, "");
    }

    #[test]
    fn assemble_with_detail() {
        let detail = DetailData {
            work_location: Some("101 E BROADWAY ST".into()),
            has_professional: true,
            professional: ProfessionalFields {
                business_name: "Acme".into(),
                state: "MT".into(),
                phone_2: "555".into(),
                ..Default::default()
            },
        };
        let r = PermitRecord::assemble(listing(), Some(detail));
        assert_eq!(r.permit_number, "BLD-1");
        assert_eq!(r.work_location.as_deref(), Some("101 E BROADWAY ST"));
        assert_eq!(r.license_pro_business_name, "Acme");
        assert_eq!(r.license_pro_state, "MT");
        assert_eq!(r.license_pro_phone_num_2, "555");
    }

    #[test]
    fn serialized_keys_in_export_order() {
        let json = serde_json::to_string(&PermitRecord::assemble(listing(), None)).unwrap();
        let keys: Vec<&str> = [
            "page", "listing_detail_url", "date", "permit_number", "permit_type", "description",
            "address", "status", "work_location", "license_pro_business_name",
            "license_pro_address_line", "license_pro_city", "license_pro_state", "license_pro_zip",
            "license_pro_business_license", "license_pro_po_box", "license_pro_phone_num_1",
            "license_pro_phone_num_2", "license_pro_phone_num_3",
        ]
        .to_vec();
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(&format!("\"{}\":", k)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
