use serde::{Deserialize, Serialize};

use crate::location::PlaceName;

/// How address components are turned into a folder-friendly name
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    /// Most specific locality followed by the country ("Paris, France")
    #[default]
    Short,
    /// Road, suburb, city, state and country code
    Detailed,
}

/// Address components as returned by Nominatim, LocationIQ and OpenCage.
///
/// All three services use OpenStreetMap naming for these fields. Anything
/// else in the payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    pub road: Option<String>,
    pub suburb: Option<String>,
    pub hamlet: Option<String>,
    pub village: Option<String>,
    pub locality: Option<String>,
    pub town: Option<String>,
    pub city: Option<String>,
    pub municipality: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl Address {
    pub fn place_name(&self, style: NameStyle) -> PlaceName {
        match style {
            NameStyle::Short => self.short_name(),
            NameStyle::Detailed => self.detailed_name(),
        }
    }

    /// Most specific component, falling back locality -> city/town ->
    /// county/state -> country
    fn short_name(&self) -> PlaceName {
        let country = present(&self.country);
        let primary = [
            &self.hamlet,
            &self.village,
            &self.locality,
            &self.city,
            &self.town,
            &self.municipality,
            &self.county,
            &self.state,
            &self.region,
        ]
        .into_iter()
        .find_map(present);

        match (primary, country) {
            (Some(primary), Some(country)) if primary != country => {
                PlaceName::Named(format!("{primary}, {country}"))
            }
            (Some(name), _) | (None, Some(name)) => PlaceName::named(name),
            (None, None) => PlaceName::Unresolved,
        }
    }

    fn detailed_name(&self) -> PlaceName {
        let settlement = present(&self.city)
            .or_else(|| present(&self.town))
            .or_else(|| present(&self.village));
        let country_code = present(&self.country_code).map(str::to_uppercase);

        let parts: Vec<&str> = [
            present(&self.road),
            present(&self.suburb),
            settlement,
            present(&self.state),
            country_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            PlaceName::Unresolved
        } else {
            PlaceName::Named(parts.join(", "))
        }
    }
}
