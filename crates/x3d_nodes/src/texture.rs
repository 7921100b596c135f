//! Per-appearance texture stages and texture memory accounting

use crate::node::NodeHandle;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Images at or below this edge length are filtered by point sampling
const SMALL_IMAGE_EDGE: u32 = 32;
/// Extra memory for a full mipmap chain
const MIPMAP_OVERHEAD: f32 = 1.333_33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MinFilter {
    #[default]
    Fastest,
    BaseLevelPoint,
    BaseLevelLinear,
    MultiLevelPoint,
    MultiLevelLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MagFilter {
    #[default]
    Fastest,
    BaseLevelPoint,
    BaseLevelLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryMode {
    #[default]
    Repeat,
    Clamp,
}

impl BoundaryMode {
    pub fn from_repeat(repeat: bool) -> Self {
        if repeat {
            BoundaryMode::Repeat
        } else {
            BoundaryMode::Clamp
        }
    }
}

/// Multitexture blend mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Modulate,
    Replace,
    Add,
    Subtract,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendSource {
    #[default]
    Previous,
    Diffuse,
    Specular,
    Factor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendFunction {
    #[default]
    None,
    Complement,
    AlphaReplicate,
}

/// Decoded image as reported by the texture loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureImage {
    pub url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    /// Mipmap levels present, 1 for a single image
    pub levels: u32,
}

impl TextureImage {
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            url: None,
            width,
            height,
            bytes_per_pixel,
            levels: 1,
        }
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn has_mipmaps(&self, use_mipmaps: bool) -> bool {
        use_mipmaps && self.levels > 1
    }

    /// Memory footprint in KiB
    pub fn size_kib(&self, use_mipmaps: bool) -> f32 {
        let base = (self.width * self.height * self.bytes_per_pixel / 1024) as f32;
        if self.has_mipmaps(use_mipmaps) {
            base * MIPMAP_OVERHEAD
        } else {
            base
        }
    }
}

/// One texture layer of an appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureStage {
    pub index: usize,
    pub images: Vec<TextureImage>,
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub boundary_s: BoundaryMode,
    pub boundary_t: BoundaryMode,
    pub boundary_r: BoundaryMode,
    pub mode: BlendMode,
    pub source: BlendSource,
    pub function: BlendFunction,
    pub alpha: f32,
    pub color: [f32; 3],
    pub anisotropy: f32,
    /// Depth for 3D textures, 1 otherwise
    pub depth: u32,
}

impl TextureStage {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            images: Vec::new(),
            min_filter: MinFilter::default(),
            mag_filter: MagFilter::default(),
            boundary_s: BoundaryMode::default(),
            boundary_t: BoundaryMode::default(),
            boundary_r: BoundaryMode::default(),
            mode: BlendMode::default(),
            source: BlendSource::default(),
            function: BlendFunction::default(),
            alpha: 1.0,
            color: [1.0, 1.0, 1.0],
            anisotropy: 1.0,
            depth: 1,
        }
    }

    /// Install an image, choosing filters from its size; returns its KiB.
    pub fn set_image(&mut self, image: TextureImage, use_mipmaps: bool) -> f32 {
        let mipmapped = image.has_mipmaps(use_mipmaps);
        let large = image.width > SMALL_IMAGE_EDGE || image.height > SMALL_IMAGE_EDGE;
        match (large, mipmapped) {
            (true, true) => {
                self.min_filter = MinFilter::MultiLevelLinear;
                self.mag_filter = MagFilter::BaseLevelLinear;
            }
            (false, true) => {
                self.min_filter = MinFilter::MultiLevelPoint;
                self.mag_filter = MagFilter::BaseLevelPoint;
            }
            (false, false) => {
                self.min_filter = MinFilter::Fastest;
                self.mag_filter = MagFilter::Fastest;
            }
            (true, false) => {}
        }
        let kib = image.size_kib(use_mipmaps);
        self.images.clear();
        self.images.push(image);
        kib
    }
}

/// Lazily created, append-only stage list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextureStages {
    stages: Vec<TextureStage>,
    num_valid: usize,
}

impl TextureStages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow to at least `len` stages; existing stages are kept. With
    /// `mark_valid` the valid count grows to match.
    pub fn ensure(&mut self, len: usize, mark_valid: bool) {
        let old = self.stages.len();
        if len > old {
            self.stages.extend((old..len).map(TextureStage::new));
        }
        if mark_valid && len > self.num_valid {
            self.num_valid = len;
        }
    }

    /// Number of stages in use
    pub fn num_valid(&self) -> usize {
        self.num_valid
    }

    /// Number of stages allocated
    pub fn capacity(&self) -> usize {
        self.stages.len()
    }

    pub fn get(&self, index: usize) -> Option<&TextureStage> {
        self.stages.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TextureStage> {
        self.stages.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextureStage> {
        self.stages.iter().take(self.num_valid)
    }
}

/// Texture memory held per appearance, with a running total
#[derive(Debug, Clone, Default)]
pub struct TextureAccounting {
    by_appearance: FxHashMap<NodeHandle, f32>,
    total_kib: f32,
}

impl TextureAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `kib` to what `appearance` holds
    pub fn record(&mut self, appearance: NodeHandle, kib: f32) {
        *self.by_appearance.entry(appearance).or_insert(0.0) += kib;
        self.total_kib += kib;
    }

    /// Forget everything `appearance` holds; returns the released KiB
    pub fn release(&mut self, appearance: NodeHandle) -> f32 {
        let released = self.by_appearance.remove(&appearance).unwrap_or(0.0);
        self.total_kib = (self.total_kib - released).max(0.0);
        released
    }

    pub fn held_by(&self, appearance: NodeHandle) -> f32 {
        self.by_appearance.get(&appearance).copied().unwrap_or(0.0)
    }

    /// Total KiB of textures loaded and not released
    pub fn total_kib(&self) -> f32 {
        self.total_kib
    }
}
