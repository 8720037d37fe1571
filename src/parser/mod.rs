pub mod classify;
pub mod detail;
pub mod lines;
pub mod listing;
pub mod professional;

use crate::db::DetailPage;
use detail::DetailData;

/// Detail HTML → work location + licensed-professional fields.
pub fn process_page(page: &DetailPage) -> (i64, DetailData) {
    (page.permit_id, detail::parse_detail(&page.html))
}
