use comms::specs::preprocessing::EncoderSpec;

use crate::{MlErr, Result};

/// Maps the labels of a categorical feature to indices, classes are kept sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoder {
    feature: String,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fits an encoder over every label in `labels`, duplicates are ignored.
    pub fn fit<I, S>(feature: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(Into::into).collect();
        classes.sort_unstable();
        classes.dedup();

        Self {
            feature: feature.to_string(),
            classes,
        }
    }

    pub fn from_spec(spec: EncoderSpec) -> Result<Self> {
        if spec.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MlErr::InvalidConfig(format!(
                "the classes of `{}` must be sorted and unique",
                spec.feature
            )));
        }

        Ok(Self {
            feature: spec.feature,
            classes: spec.classes,
        })
    }

    pub fn spec(&self) -> EncoderSpec {
        EncoderSpec {
            feature: self.feature.clone(),
            classes: self.classes.clone(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Returns the index of `label`.
    ///
    /// # Returns
    /// The index or `MlErr::UnknownLabel` if the encoder never saw it.
    pub fn transform(&self, label: &str) -> Result<usize> {
        if !self.is_fitted() {
            return Err(MlErr::PreprocessorNotInitialized("label encoder"));
        }

        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .map_err(|_| MlErr::UnknownLabel {
                feature: self.feature.clone(),
                label: label.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted() {
        let encoder = LabelEncoder::fit("density", ["Rural", "Urban", "Suburban", "Urban"]);

        assert_eq!(encoder.classes(), &["Rural", "Suburban", "Urban"]);
        assert_eq!(encoder.transform("Rural").unwrap(), 0);
        assert_eq!(encoder.transform("Suburban").unwrap(), 1);
        assert_eq!(encoder.transform("Urban").unwrap(), 2);
    }

    #[test]
    fn unknown_label_is_an_error() {
        let encoder = LabelEncoder::fit("density", ["Rural"]);
        assert!(matches!(
            encoder.transform("Metro"),
            Err(MlErr::UnknownLabel { .. })
        ));
    }

    #[test]
    fn unsorted_spec_is_rejected() {
        let spec = EncoderSpec {
            feature: "density".into(),
            classes: vec!["Urban".into(), "Rural".into()],
        };
        assert!(LabelEncoder::from_spec(spec).is_err());
    }
}
