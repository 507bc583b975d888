//! Route handlers organized by resource

pub mod health;
pub mod auth;
pub mod users;
pub mod admin;
pub mod staff;
pub mod events;
pub mod scholars;
pub mod donations;
pub mod forum;
pub mod notifications;
pub mod report_cards;

use serde::Serialize;

use crate::models::{Pagination, PaginationParams};

/// Build pagination from the `page` / `per_page` query fields each list
/// query struct carries.
pub(crate) fn page_of(page: Option<u32>, per_page: Option<u32>) -> Pagination {
    Pagination::from(PaginationParams { page, per_page })
}

/// Body for endpoints that only report how many rows they touched
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}
