pub mod barrier;
pub mod behaviour;
pub mod collateral;
pub mod knowledge;
pub mod organization;
pub mod prevalence;
pub mod proposal;
pub mod reference;
pub mod solution;
pub mod status;
pub mod user;
pub mod workspace;

pub use status::ContentStatus;
pub use user::{User, UserRole};
