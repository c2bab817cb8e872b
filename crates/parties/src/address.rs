//! Party addresses and their map links.

use serde::{Deserialize, Serialize};

use procurerp_core::{AggregateId, Entity};

const MAP_BASE_URL: &str = "https://maps.google.com/maps";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressId(pub AggregateId);

impl AddressId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AddressId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Postal address of a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address_id: AddressId,
    pub name: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    /// Usable as an invoice address.
    pub invoice: bool,
}

impl Entity for Address {
    type Id = AddressId;

    fn id(&self) -> &Self::Id {
        &self.address_id
    }
}

impl Address {
    pub fn new(address_id: AddressId) -> Self {
        Self {
            address_id,
            name: None,
            street: None,
            zip: None,
            city: None,
            country: None,
            invoice: false,
        }
    }

    /// Single-line address, skipping empty parts.
    pub fn full_address(&self) -> String {
        let locality = [self.zip.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        [
            self.street.as_deref().map(str::trim),
            Some(locality.as_str()),
            self.country.as_deref().map(str::trim),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.full_address().is_empty()
    }

    /// Link opening the address on a map, localized with `lang` when given.
    ///
    /// `None` when the address has nothing to locate.
    pub fn map_url(&self, lang: Option<&str>) -> Option<String> {
        let query = self.full_address();
        if query.is_empty() {
            return None;
        }
        let query = urlencoding::encode(&query);
        Some(match lang.filter(|l| !l.is_empty()) {
            Some(lang) => format!("{MAP_BASE_URL}?hl={}&q={query}", urlencoding::encode(lang)),
            None => format!("{MAP_BASE_URL}?q={query}"),
        })
    }
}
