pub mod booking;
pub mod pagination;
pub mod principal;
pub mod provider;
pub mod user;

pub use booking::{Booking, BookingStatus, BookingView, PartySummary, PaymentMethod};
pub use pagination::{Page, PageRequest};
pub use principal::{Principal, PrincipalSummary, Role};
pub use provider::{AvailabilityWindow, Category, Provider, ProviderStatus, Review};
pub use user::User;
