pub mod finalizer;
pub mod status;
pub mod sync;
