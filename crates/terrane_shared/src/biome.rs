use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::structure::StructureKind;

/// Ore or variant block scattered through stone within a height band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lode {
    pub name: String,
    pub block: BlockId,
    /// Exclusive bounds.
    pub min_height: i32,
    pub max_height: i32,
    pub scale: f32,
    pub threshold: f32,
    pub noise_offset: f32,
}

impl Lode {
    pub fn spans(&self, y: i32) -> bool {
        y > self.min_height && y < self.max_height
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloraRule {
    pub zone_surface_block: BlockId,
    pub structure: StructureKind,
    pub zone_scale: f32,
    pub zone_threshold: f32,
    pub placement_scale: f32,
    pub placement_threshold: f32,
    pub min_height: i32,
    pub max_height: i32,
    #[serde(default = "default_head_size")]
    pub head_size: f32,
}

fn default_head_size() -> f32 {
    3.5
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Biome {
    pub name: String,
    /// Noise offset and scale for this biome's selection weight.
    pub offset: f32,
    pub scale: f32,
    pub terrain_height: f32,
    pub terrain_scale: f32,
    pub surface_block: BlockId,
    pub subsurface_block: BlockId,
    #[serde(default)]
    pub flora: Option<FloraRule>,
    /// Applied in order; the last matching rule wins.
    #[serde(default)]
    pub lodes: Vec<Lode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiomeCatalog {
    pub biomes: Vec<Biome>,
}

impl BiomeCatalog {
    pub fn new(biomes: Vec<Biome>) -> Result<Self, String> {
        if biomes.is_empty() {
            return Err("biome catalog must contain at least one biome".to_string());
        }
        Ok(Self { biomes })
    }

    pub fn from_toml_str(source: &str) -> Result<Self, String> {
        let catalog: BiomeCatalog =
            toml::from_str(source).map_err(|err| format!("failed to parse biome catalog: {err}"))?;
        Self::new(catalog.biomes)
    }

    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    pub fn default_catalog() -> Self {
        let stone_lodes = || {
            vec![
                Lode {
                    name: "dirt".to_string(),
                    block: BlockId::DIRT,
                    min_height: 1,
                    max_height: 255,
                    scale: 0.1,
                    threshold: 0.5,
                    noise_offset: 0.0,
                },
                Lode {
                    name: "gravel".to_string(),
                    block: BlockId::GRAVEL,
                    min_height: 5,
                    max_height: 60,
                    scale: 0.2,
                    threshold: 0.6,
                    noise_offset: 300.0,
                },
                Lode {
                    name: "coal".to_string(),
                    block: BlockId::COAL_ORE,
                    min_height: 5,
                    max_height: 50,
                    scale: 0.25,
                    threshold: 0.66,
                    noise_offset: 500.0,
                },
                Lode {
                    name: "iron".to_string(),
                    block: BlockId::IRON_ORE,
                    min_height: 2,
                    max_height: 30,
                    scale: 0.3,
                    threshold: 0.7,
                    noise_offset: 800.0,
                },
            ]
        };

        Self {
            biomes: vec![
                Biome {
                    name: "grasslands".to_string(),
                    offset: 1234.0,
                    scale: 0.042,
                    terrain_height: 22.0,
                    terrain_scale: 0.15,
                    surface_block: BlockId::GRASS,
                    subsurface_block: BlockId::DIRT,
                    flora: Some(FloraRule {
                        zone_surface_block: BlockId::GRASS,
                        structure: StructureKind::Tree,
                        zone_scale: 1.3,
                        zone_threshold: 0.62,
                        placement_scale: 15.0,
                        placement_threshold: 0.85,
                        min_height: 5,
                        max_height: 9,
                        head_size: 3.5,
                    }),
                    lodes: stone_lodes(),
                },
                Biome {
                    name: "forest".to_string(),
                    offset: 4321.0,
                    scale: 0.05,
                    terrain_height: 38.0,
                    terrain_scale: 0.2,
                    surface_block: BlockId::GRASS,
                    subsurface_block: BlockId::DIRT,
                    flora: Some(FloraRule {
                        zone_surface_block: BlockId::DIRT,
                        structure: StructureKind::Tree,
                        zone_scale: 1.1,
                        zone_threshold: 0.45,
                        placement_scale: 20.0,
                        placement_threshold: 0.8,
                        min_height: 6,
                        max_height: 12,
                        head_size: 3.5,
                    }),
                    lodes: stone_lodes(),
                },
                Biome {
                    name: "desert".to_string(),
                    offset: 6789.0,
                    scale: 0.058,
                    terrain_height: 12.0,
                    terrain_scale: 0.1,
                    surface_block: BlockId::SAND,
                    subsurface_block: BlockId::SAND,
                    flora: Some(FloraRule {
                        zone_surface_block: BlockId::SAND,
                        structure: StructureKind::Cactus,
                        zone_scale: 1.0,
                        zone_threshold: 0.58,
                        placement_scale: 18.0,
                        placement_threshold: 0.84,
                        min_height: 2,
                        max_height: 5,
                        head_size: 0.0,
                    }),
                    lodes: stone_lodes(),
                },
            ],
        }
    }
}

impl Default for BiomeCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}
