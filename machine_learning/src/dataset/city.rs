use std::{
    fmt::{self, Display},
    str::FromStr,
};

use crate::MlErr;

/// The fixed roster of clients, each one owning the rows of its city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum City {
    Delhi,
    Beijing,
    MexicoCity,
    LosAngeles,
}

impl City {
    pub const ALL: [City; 4] = [
        City::Delhi,
        City::Beijing,
        City::MexicoCity,
        City::LosAngeles,
    ];

    /// Returns the name of the city as it appears in the dataset.
    pub fn as_str(&self) -> &'static str {
        match self {
            City::Delhi => "Delhi",
            City::Beijing => "Beijing",
            City::MexicoCity => "Mexico City",
            City::LosAngeles => "Los Angeles",
        }
    }
}

impl Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for City {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        City::ALL
            .into_iter()
            .find(|city| city.as_str() == s.trim())
            .ok_or_else(|| MlErr::UnknownCity(s.to_string()))
    }
}
