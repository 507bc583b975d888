//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Uses JOINs for list operations (no N+1)
//! - Maps constraint violations instead of pre-checking
//! - Uses transactions for multi-step operations

pub mod users;
pub mod staff;
pub mod admins;
pub mod events;
pub mod scholars;
pub mod donations;
pub mod forum;
pub mod notifications;
pub mod report_cards;

pub use users::{NewUser, User, UserCredentials, UserFilter, UserRepo, UserPurge};
pub use staff::{NewStaff, Staff, StaffCredentials, StaffRepo};
pub use admins::{Admin, AdminCredentials, AdminRepo, Dashboard, NewAdmin};
pub use events::{
    Event, EventFeedback, EventFilter, EventRepo, NewEvent, NewFeedback, Participant,
};
pub use scholars::{NewScholar, ScholarFilter, ScholarProfile, ScholarRepo};
pub use donations::{Decision, Donation, DonationFilter, DonationRepo, NewDonation};
pub use forum::{
    AuthorRef, Comment, ForumRepo, LikeState, NewPoll, NewPost, Poll, PollOption, Post,
    PostDetail,
};
pub use notifications::{NewNotification, Notification, NotificationRepo, Recipient};
pub use report_cards::{NewReportCard, ReportCard, ReportCardHistory, ReportCardRepo};

use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::DbError;
use crate::models::{Paginated, Pagination};

/// Turn rows carrying a `COUNT(*) OVER() AS total` column into a page.
///
/// The window count rides on the returned rows, so a page past the end has
/// no row to read it from and reports `total = 0`. Clients restart from
/// page 1 when they see an empty page with `total = 0`.
pub(crate) fn paginate<T>(rows: Vec<PgRow>, page: Pagination) -> Result<Paginated<T>, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    let total = match rows.first() {
        Some(row) => row.try_get::<i64, _>("total")?,
        None => 0,
    };
    let items = rows
        .iter()
        .map(T::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Paginated::new(items, total, page))
}
