//! Preprocessors fitted once before training and shipped with the model.

mod bundle;
mod encoder;
mod scaler;

pub use bundle::PreprocessorBundle;
pub use encoder::LabelEncoder;
pub use scaler::StandardScaler;
