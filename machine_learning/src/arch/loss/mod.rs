mod loss_fn;
mod mae;
mod mse;

pub use loss_fn::LossFn;
pub use mae::mae;
pub use mse::Mse;
