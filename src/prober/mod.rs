//! Probers: the units of work a stage runs.
//!
//! Provides:
//! - The [`Prober`] trait and its call context
//! - [`CommandProber`], the generic external tool adapter, and its catalog
//! - Native probers usable without any external tool
//! - The [`ProberRegistry`] the scheduler selects from

pub mod catalog;
pub mod command;
pub mod native;
pub mod rate_limiter;
pub mod registry;
pub mod traits;

pub use command::{find_binary, CommandProber, EndpointForm, LineFormat, TargetInput, ToolSpec};
pub use rate_limiter::RateLimiter;
pub use registry::{default_policy, ProberRegistry};
pub use traits::{
    BoxedProber, FanOutPolicy, FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor,
};
