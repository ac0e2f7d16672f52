pub mod call;
pub mod document;
pub mod ids;
pub mod notifier;
pub mod path;
pub mod pgstore;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod test_utils;
