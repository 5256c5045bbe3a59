mod json;
mod state;

pub use json::JsonDatastore;
pub use state::AccountState;
