use ndarray::Array2;

/// Square neighbourhood weights centred on a focal pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: usize,
    weights: Array2<f64>,
}

impl Kernel {
    /// Focal kernel of side `2r + 1`: centre weight 0, every other cell
    /// weighted `1 / ((2r + 1)^2 - 1)` so the weights sum to 1.
    pub fn focal(pixel_radius: usize) -> Self {
        let size = 2 * pixel_radius + 1;
        let neighbours = (size * size - 1) as f64;
        let weight = 1.0 / neighbours;

        let mut weights = Array2::from_elem((size, size), weight);
        weights[[pixel_radius, pixel_radius]] = 0.0;

        log::trace!(
            "Focal kernel radius {}: {}x{} weight {:.6}",
            pixel_radius,
            size,
            size,
            weight
        );

        Self {
            radius: pixel_radius,
            weights,
        }
    }

    /// 9x9 unit weights with the centre excluded
    pub fn gearys() -> Self {
        let mut weights = Array2::ones((9, 9));
        weights[[4, 4]] = 0.0;
        Self { radius: 4, weights }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn size(&self) -> usize {
        2 * self.radius + 1
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn center_weight(&self) -> f64 {
        self.weights[[self.radius, self.radius]]
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.sum()
    }

    /// Non-zero cells as (row offset, col offset, weight)
    pub fn offsets(&self) -> Vec<(isize, isize, f64)> {
        let r = self.radius as isize;
        self.weights
            .indexed_iter()
            .filter(|(_, &w)| w != 0.0)
            .map(|((i, j), &w)| (i as isize - r, j as isize - r, w))
            .collect()
    }
}

/// Focal kernel for a neighbourhood of `pixel_radius` pixels
pub fn create_kernel(pixel_radius: usize) -> Kernel {
    Kernel::focal(pixel_radius)
}
