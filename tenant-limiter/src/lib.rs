//! Per-tenant request gate: a fixed-window counter keyed by the `x-tenant-id`
//! header, with an axum middleware in front of it.
pub mod clock;
pub mod limiter;
pub mod middleware;

pub use limiter::{LimitExceeded, TenantLimiter};
pub use middleware::{enforce_tenant_limit, LimitRejection, TENANT_HEADER};
