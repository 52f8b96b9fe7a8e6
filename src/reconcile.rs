//! Edge reconciliation
//!
//! Forces every [`EdgeConstraint`] region of a generated image to equal its
//! locked pixels exactly, and softens the transition just outside each region
//! with a linear falloff so no hard seam appears between locked and generated
//! content.
//!
//! A call runs in three passes:
//! 1. every constraint is validated; any failure aborts before a pixel changes
//! 2. pixels within `falloff` of a constraint (Chebyshev distance) and outside
//!    every constraint are blended once, toward the nearest locked pixel of
//!    the closest constraint, weight decreasing with distance; when a mask is
//!    given only regenerated pixels are touched
//! 3. constraint regions are overwritten in list order, so on overlap the
//!    later constraint wins

use crate::{
    error::{Result, TileInpaintError},
    types::{ChannelLayout, EdgeConstraint, InpaintMask, PixelRegion},
    utils::raster,
};
use image::{DynamicImage, GenericImageView};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Applies edge constraints to generated images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeReconciler {
    falloff: u32,
}

impl Default for EdgeReconciler {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EDGE_FALLOFF)
    }
}

impl EdgeReconciler {
    /// `falloff` is the blend width in pixels; 0 disables blending
    #[must_use]
    pub const fn new(falloff: u32) -> Self {
        Self { falloff }
    }

    #[must_use]
    pub const fn falloff(&self) -> u32 {
        self.falloff
    }

    /// Return a copy of `image` with every constraint applied
    ///
    /// # Errors
    /// - `UnsupportedLayout` for images other than RGB8/RGBA8
    /// - `DimensionMismatch` when `mask` does not match the image
    /// - `InvalidConstraint` when any constraint is empty, mis-sized, out of
    ///   bounds or in another layout; no constraint is applied in that case
    #[instrument(skip_all, fields(constraints = constraints.len(), falloff = self.falloff))]
    pub fn reconcile(
        &self,
        image: &DynamicImage,
        constraints: &[EdgeConstraint],
        mask: Option<&InpaintMask>,
    ) -> Result<DynamicImage> {
        let layout = ChannelLayout::of(image)?;
        if let Some(mask) = mask {
            if mask.dimensions() != image.dimensions() {
                return Err(TileInpaintError::dimension_mismatch(
                    "mask",
                    image.dimensions(),
                    mask.dimensions(),
                ));
            }
        }
        for (index, constraint) in constraints.iter().enumerate() {
            constraint.validate_against(image).map_err(|e| {
                TileInpaintError::invalid_constraint(format!(
                    "constraint #{index}: {}",
                    e.message()
                ))
            })?;
        }

        let mut result = image.clone();
        if constraints.is_empty() {
            return Ok(result);
        }

        if self.falloff > 0 {
            let blended = self.blend(&mut result, layout, constraints, mask)?;
            debug!(blended, "seam blend applied");
        }
        for constraint in constraints {
            raster::blit(&mut result, &constraint.pixels, constraint.x, constraint.y)?;
        }
        Ok(result)
    }

    fn blend(
        &self,
        image: &mut DynamicImage,
        layout: ChannelLayout,
        constraints: &[EdgeConstraint],
        mask: Option<&InpaintMask>,
    ) -> Result<u64> {
        let (width, height) = image.dimensions();
        let nearest = self.nearest_constraints(constraints, width, height, mask);
        let channels = layout.channels();
        let span = u64::from(self.falloff) + 1;
        let (target, _) = raster::pixel_bytes_mut(image)?;
        let mut blended = 0_u64;

        for (&(x, y), &(distance, index)) in &nearest {
            if distance == 0 {
                continue;
            }
            let Some(constraint) = constraints.get(index) else {
                return Err(TileInpaintError::internal("blend constraint index out of range"));
            };
            let region = constraint.region();
            let (locked, _) = raster::pixel_bytes(&constraint.pixels)?;
            let (lx, ly) = region.clamp_point(x, y);
            let src = raster::offset(region.width, lx - region.x, ly - region.y, layout);
            let dst = raster::offset(width, x, y, layout);
            let (Some(forced), Some(current)) = (
                locked.get(src..src + channels),
                target.get_mut(dst..dst + channels),
            ) else {
                return Err(TileInpaintError::internal("blend offset out of range"));
            };

            let weight = span - distance;
            for (out, &lock) in current.iter_mut().zip(forced) {
                let mixed = u64::from(*out) * distance + u64::from(lock) * weight;
                *out = ((mixed + span / 2) / span) as u8;
            }
            blended += 1;
        }
        Ok(blended)
    }

    /// Closest constraint for every pixel within `falloff` of one
    ///
    /// Distance 0 marks pixels covered by a constraint. Ties go to the later
    /// constraint, matching the overwrite order.
    fn nearest_constraints(
        &self,
        constraints: &[EdgeConstraint],
        width: u32,
        height: u32,
        mask: Option<&InpaintMask>,
    ) -> HashMap<(u32, u32), (u64, usize)> {
        let mut nearest: HashMap<(u32, u32), (u64, usize)> = HashMap::new();
        for (index, constraint) in constraints.iter().enumerate() {
            let region = constraint.region();
            let zone = expand(region, self.falloff, width, height);
            for y in zone.y..zone.y + zone.height {
                for x in zone.x..zone.x + zone.width {
                    let distance = region.distance_to(x, y);
                    if distance > u64::from(self.falloff) {
                        continue;
                    }
                    if distance > 0 && mask.is_some_and(|m| !m.should_regenerate(x, y)) {
                        continue;
                    }
                    nearest
                        .entry((x, y))
                        .and_modify(|best| {
                            if distance <= best.0 {
                                *best = (distance, index);
                            }
                        })
                        .or_insert((distance, index));
                }
            }
        }
        nearest
    }
}

/// Grow a region by `by` pixels on every side, clipped to the raster
fn expand(region: PixelRegion, by: u32, width: u32, height: u32) -> PixelRegion {
    let x = region.x.saturating_sub(by);
    let y = region.y.saturating_sub(by);
    let right = (region.right() + u64::from(by)).min(u64::from(width)) as u32;
    let bottom = (region.bottom() + u64::from(by)).min(u64::from(height)) as u32;
    PixelRegion::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
}
