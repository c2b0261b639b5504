use std::fs;
use std::io;
use std::path::Path;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::write_atomic;
use crate::versioning::CURRENT_CHUNK_FORMAT_VERSION;

pub const META_FILE_NAME: &str = "world.toml";

/// Name and seed of a saved world, stored next to its chunk directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMeta {
    pub name: String,
    #[serde(with = "world_seed_serde")]
    pub seed: u64,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
}

fn default_format_version() -> u32 {
    CURRENT_CHUNK_FORMAT_VERSION
}

impl WorldMeta {
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            seed,
            format_version: CURRENT_CHUNK_FORMAT_VERSION,
        }
    }

    pub fn save(&self, world_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(world_dir)?;

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("failed to serialize world metadata: {}", e))
        })?;

        write_atomic(&world_dir.join(META_FILE_NAME), toml_string.as_bytes())
    }

    /// `Ok(None)` when the world has never been saved.
    pub fn load(world_dir: &Path) -> io::Result<Option<Self>> {
        let meta_path = world_dir.join(META_FILE_NAME);
        if !meta_path.exists() {
            return Ok(None);
        }

        let toml_string = fs::read_to_string(meta_path)?;
        let meta = toml::from_str(&toml_string).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("failed to deserialize world metadata: {}", e))
        })?;

        Ok(Some(meta))
    }
}

// Seeds are written as strings because TOML integers are signed 64-bit.
mod world_seed_serde {
    use super::*;
    use std::fmt;

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SeedVisitor;

        impl<'de> Visitor<'de> for SeedVisitor {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a non-negative 64-bit world seed as integer or string")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value).map_err(|_| E::custom("world seed must be non-negative"))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| E::custom("invalid world seed string"))
            }
        }

        deserializer.deserialize_any(SeedVisitor)
    }
}
