//! Services: credentials, access guard, event publishing and subscription fan-out

pub mod auth;
pub mod events;
pub mod fanout;
pub mod guard;

pub use auth::{AuthConfig, AuthService, IssuedToken};
pub use events::EventPublisher;
pub use fanout::{SubscriberStream, SubscriptionFanout};
pub use guard::{AccessGuard, AuthUser, RequestContext};
