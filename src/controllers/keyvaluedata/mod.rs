mod controller;

pub use controller::run;

pub mod pairs;
pub mod reconciler;
pub mod reconcilers;
pub mod storage;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;
