use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Identity number families held by the authoritative registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityKind {
    Pan,
    Aadhaar,
}

impl IdentityKind {
    /// Canonical comparison form: trimmed, PAN uppercased, Aadhaar without inner spaces.
    pub fn normalize(self, raw: &str) -> String {
        match self {
            IdentityKind::Pan => raw.trim().to_ascii_uppercase(),
            IdentityKind::Aadhaar => raw.split_whitespace().collect(),
        }
    }

    /// PAN: five letters, four digits, one letter. Aadhaar: exactly twelve digits.
    pub fn is_well_formed(self, normalized: &str) -> bool {
        let bytes = normalized.as_bytes();
        match self {
            IdentityKind::Pan => {
                bytes.len() == 10
                    && bytes[..5].iter().all(u8::is_ascii_uppercase)
                    && bytes[5..9].iter().all(u8::is_ascii_digit)
                    && bytes[9].is_ascii_uppercase()
            }
            IdentityKind::Aadhaar => bytes.len() == 12 && bytes.iter().all(u8::is_ascii_digit),
        }
    }
}

/// Lookup seam over the registry dataset so the backing source can be swapped.
pub trait RegistryLookup: Send + Sync {
    /// `number` must already be normalized for `kind`.
    fn contains(&self, kind: IdentityKind, number: &str) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid registry dataset: {0}")]
    Csv(#[from] csv::Error),
}

/// Registry backed by a delimited file with `pan` and `aadhaar` columns, indexed at load.
#[derive(Debug, Clone, Default)]
pub struct CsvRegistry {
    pans: HashSet<String>,
    aadhaars: HashSet<String>,
}

impl CsvRegistry {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RegistryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut registry = Self::default();

        for row in csv_reader.deserialize::<RegistryRow>() {
            let row = row?;
            if let Some(pan) = row.pan {
                registry.pans.insert(IdentityKind::Pan.normalize(&pan));
            }
            if let Some(aadhaar) = row.aadhaar {
                registry
                    .aadhaars
                    .insert(IdentityKind::Aadhaar.normalize(&aadhaar));
            }
        }

        debug!(
            pans = registry.pans.len(),
            aadhaars = registry.aadhaars.len(),
            "identity registry indexed"
        );
        Ok(registry)
    }

    pub fn len(&self, kind: IdentityKind) -> usize {
        match kind {
            IdentityKind::Pan => self.pans.len(),
            IdentityKind::Aadhaar => self.aadhaars.len(),
        }
    }
}

impl RegistryLookup for CsvRegistry {
    fn contains(&self, kind: IdentityKind, number: &str) -> bool {
        match kind {
            IdentityKind::Pan => self.pans.contains(number),
            IdentityKind::Aadhaar => self.aadhaars.contains(number),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pan: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    aadhaar: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
