pub mod auth;
pub mod coordinate;
pub mod run_record;
pub mod util;
