pub mod digest;
pub mod migrator;
pub mod preference_patch;
pub mod preference_store;
