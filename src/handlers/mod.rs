pub mod auth;
pub mod barriers;
pub mod behaviours;
pub mod collaterals;
pub mod knowledge;
pub mod organizations;
pub mod outcomes;
pub mod prevalence;
pub mod proposals;
pub mod reference;
pub mod solutions;
pub mod workspaces;
