pub mod models;
pub mod pool;

pub use pool::{db, init_pool, DatabaseError};
