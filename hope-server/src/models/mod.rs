//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod validation;
pub mod account;
pub mod text;
pub mod kinds;
pub mod face;
pub mod money;
pub mod pagination;

pub use validation::ValidationError;
pub use account::{Email, Mpin, Password, PersonName, Username};
pub use text::{optional_text, Body, Title};
pub use kinds::{
    ActorKind, EventStatus, ScholarStatus, UserRole, VerificationDecision, VerificationStatus,
};
pub use face::{FaceDescriptor, FACE_MATCH_THRESHOLD};
pub use money::{AmountInput, Money};
pub use pagination::{Pagination, Paginated, PaginationParams};
