use thiserror::Error;

/// Axis-aligned, integer-pixel rectangle with half-open bounds,
/// `[top, bottom) x [left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Rect {
    /// A square of side `inner` centered inside a square of side `outer`.
    /// Requires `inner <= outer` and an even difference so the center is exact.
    pub fn centered_square(outer: usize, inner: usize) -> Self {
        let offset = (outer - inner) / 2;
        Self {
            top: offset,
            left: offset,
            bottom: offset + inner,
            right: offset + inner,
        }
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    pub fn height(&self) -> usize {
        self.bottom - self.top
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.top <= other.top
            && self.left <= other.left
            && self.bottom >= other.bottom
            && self.right >= other.right
    }

    pub fn contains_point(&self, y: usize, x: usize) -> bool {
        y >= self.top && y < self.bottom && x >= self.left && x < self.right
    }

    /// Shrinks the rectangle by `inset` pixels on every side.
    pub fn inset(&self, inset: usize) -> Self {
        Self {
            top: self.top + inset,
            left: self.left + inset,
            bottom: self.bottom - inset,
            right: self.right - inset,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("patch size {patch} does not fit into image size {image}")]
    PatchLargerThanImage { image: usize, patch: usize },
    #[error("overlap {overlap} must be smaller than half the patch size {patch}")]
    OverlapTooWide { patch: usize, overlap: usize },
    #[error("margin size {margin} must be at least the patch size {patch}")]
    MarginSmallerThanPatch { patch: usize, margin: usize },
    #[error("margin size {margin} does not fit into image size {image}")]
    MarginLargerThanImage { image: usize, margin: usize },
    #[error("sizes {outer} and {inner} differ by an odd amount, exact centering is impossible")]
    OffCenter { outer: usize, inner: usize },
}

/// The pixel rectangles shared by training and evaluation: the central
/// patch to reconstruct, the region stamped with the fill constant (the
/// patch minus a band of `overlap` true pixels at the seam), and the
/// margin-extended patch used by the margin/joint discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchGeometry {
    pub image_size: usize,
    pub patch_size: usize,
    pub margin_size: usize,
    pub overlap: usize,
    pub patch_rect: Rect,
    pub fill_rect: Rect,
    pub margin_rect: Rect,
}

impl PatchGeometry {
    pub fn new(
        image_size: usize,
        patch_size: usize,
        margin_size: usize,
        overlap: usize,
    ) -> Result<Self, GeometryError> {
        if patch_size == 0 || patch_size > image_size {
            return Err(GeometryError::PatchLargerThanImage {
                image: image_size,
                patch: patch_size,
            });
        }
        if overlap * 2 >= patch_size {
            return Err(GeometryError::OverlapTooWide {
                patch: patch_size,
                overlap,
            });
        }
        if margin_size < patch_size {
            return Err(GeometryError::MarginSmallerThanPatch {
                patch: patch_size,
                margin: margin_size,
            });
        }
        if margin_size > image_size {
            return Err(GeometryError::MarginLargerThanImage {
                image: image_size,
                margin: margin_size,
            });
        }
        for inner in [patch_size, margin_size] {
            if (image_size - inner) % 2 != 0 {
                return Err(GeometryError::OffCenter {
                    outer: image_size,
                    inner,
                });
            }
        }

        let patch_rect = Rect::centered_square(image_size, patch_size);
        let margin_rect = Rect::centered_square(image_size, margin_size);
        let fill_rect = patch_rect.inset(overlap);

        Ok(Self {
            image_size,
            patch_size,
            margin_size,
            overlap,
            patch_rect,
            fill_rect,
            margin_rect,
        })
    }

    /// True when the margin-extended patch degenerates to the plain patch.
    pub fn margin_is_patch(&self) -> bool {
        self.margin_size == self.patch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_configuration() {
        let g = PatchGeometry::new(128, 64, 80, 4).expect("valid configuration");
        assert_eq!(
            g.patch_rect,
            Rect {
                top: 32,
                left: 32,
                bottom: 96,
                right: 96
            }
        );
        assert_eq!(
            g.fill_rect,
            Rect {
                top: 36,
                left: 36,
                bottom: 92,
                right: 92
            }
        );
        assert_eq!(
            g.margin_rect,
            Rect {
                top: 24,
                left: 24,
                bottom: 104,
                right: 104
            }
        );
    }

    #[test]
    fn rectangles_nest_and_center() {
        for (image, patch, margin, overlap) in
            [(128, 64, 80, 4), (128, 64, 64, 1), (256, 128, 160, 16)]
        {
            let g = PatchGeometry::new(image, patch, margin, overlap).expect("valid");
            let full = Rect::centered_square(image, image);
            assert!(g.patch_rect.contains(&g.fill_rect));
            assert!(g.margin_rect.contains(&g.patch_rect));
            assert!(full.contains(&g.margin_rect));
            // strict containment of the fill region
            assert!(g.fill_rect.top > g.patch_rect.top);
            assert!(g.fill_rect.bottom < g.patch_rect.bottom);
            // centered: symmetric distances to the image border
            assert_eq!(g.patch_rect.top, image - g.patch_rect.bottom);
            assert_eq!(g.patch_rect.left, image - g.patch_rect.right);
        }
    }

    #[test]
    fn overlap_must_stay_below_half_patch() {
        assert_eq!(
            PatchGeometry::new(128, 64, 80, 32),
            Err(GeometryError::OverlapTooWide {
                patch: 64,
                overlap: 32
            })
        );
        assert!(PatchGeometry::new(128, 64, 80, 31).is_ok());
    }

    #[test]
    fn margin_smaller_than_patch_is_rejected() {
        assert_eq!(
            PatchGeometry::new(128, 64, 48, 4),
            Err(GeometryError::MarginSmallerThanPatch {
                patch: 64,
                margin: 48
            })
        );
    }

    #[test]
    fn oversized_regions_are_rejected() {
        assert!(matches!(
            PatchGeometry::new(64, 128, 128, 4),
            Err(GeometryError::PatchLargerThanImage { .. })
        ));
        assert!(matches!(
            PatchGeometry::new(128, 64, 130, 4),
            Err(GeometryError::MarginLargerThanImage { .. })
        ));
    }

    #[test]
    fn odd_centering_is_rejected() {
        assert!(matches!(
            PatchGeometry::new(128, 63, 80, 4),
            Err(GeometryError::OffCenter { .. })
        ));
    }
}
