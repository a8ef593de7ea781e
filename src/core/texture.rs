//! Grey-level co-occurrence texture and local spatial autocorrelation
//!
//! Both operate on a quantised single-band image (integer grey levels
//! 0..=255, NaN for masked pixels).

use crate::core::kernel::Kernel;
use crate::raster::{build_grid, RasterImage};
use crate::types::{RsrError, RsrResult};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Co-occurrence measures in output band order
pub const GLCM_MEASURES: [&str; 17] = [
    "asm", "contrast", "corr", "var", "idm", "savg", "svar", "sent", "ent", "dvar", "dent",
    "imcorr1", "imcorr2", "diss", "inertia", "shade", "prom",
];

/// Texture window half-sizes computed for the pre-fire NDVI
pub const TEXTURE_SIZES: [usize; 4] = [1, 2, 3, 4];

/// Co-occurrence offsets: east, south-east, south, south-west
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 1), (1, 0), (1, -1)];

/// `clamp(floor(value * gray_levels), 0, 255)`, masked pixels stay masked
pub fn quantize(image: &RasterImage, gray_levels: u8) -> RasterImage {
    let levels = gray_levels as f64;
    image.map_values(|v| {
        if v.is_finite() {
            (v * levels).floor().clamp(0.0, 255.0)
        } else {
            f64::NAN
        }
    })
}

fn entropy(probabilities: impl Iterator<Item = f64>) -> f64 {
    -probabilities
        .filter(|&p| p > 0.0)
        .map(|p| p * p.ln())
        .sum::<f64>()
}

/// Symmetric, normalised co-occurrence counts within one window
struct Cooccurrence {
    pairs: BTreeMap<(u8, u8), f64>,
}

impl Cooccurrence {
    fn collect(data: &Array2<f64>, row: usize, col: usize, size: usize) -> Option<Self> {
        let (rows, cols) = data.dim();
        let r0 = row.saturating_sub(size);
        let c0 = col.saturating_sub(size);
        let r1 = (row + size).min(rows - 1);
        let c1 = (col + size).min(cols - 1);

        let mut pairs: BTreeMap<(u8, u8), f64> = BTreeMap::new();
        let mut total = 0.0;
        for r in r0..=r1 {
            for c in c0..=c1 {
                let a = data[[r, c]];
                if !a.is_finite() {
                    continue;
                }
                for (dr, dc) in DIRECTIONS {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < r0 as isize || nc < c0 as isize || nr > r1 as isize || nc > c1 as isize {
                        continue;
                    }
                    let b = data[[nr as usize, nc as usize]];
                    if !b.is_finite() {
                        continue;
                    }
                    let (i, j) = (a as u8, b as u8);
                    *pairs.entry((i, j)).or_insert(0.0) += 1.0;
                    *pairs.entry((j, i)).or_insert(0.0) += 1.0;
                    total += 2.0;
                }
            }
        }

        if total == 0.0 {
            return None;
        }
        for p in pairs.values_mut() {
            *p /= total;
        }
        Some(Self { pairs })
    }

    /// The 17 measures in `GLCM_MEASURES` order
    fn measures(&self) -> [f64; 17] {
        let mut px: BTreeMap<u8, f64> = BTreeMap::new();
        let mut p_sum: BTreeMap<u16, f64> = BTreeMap::new();
        let mut p_diff: BTreeMap<u8, f64> = BTreeMap::new();
        for (&(i, j), &p) in &self.pairs {
            *px.entry(i).or_insert(0.0) += p;
            *p_sum.entry(i as u16 + j as u16).or_insert(0.0) += p;
            *p_diff.entry(i.abs_diff(j)).or_insert(0.0) += p;
        }

        // symmetric matrix: row and column marginals coincide
        let mu: f64 = px.iter().map(|(&i, &p)| i as f64 * p).sum();
        let var: f64 = px.iter().map(|(&i, &p)| (i as f64 - mu).powi(2) * p).sum();

        let mut asm = 0.0;
        let mut contrast = 0.0;
        let mut cross = 0.0;
        let mut idm = 0.0;
        let mut diss = 0.0;
        let mut shade = 0.0;
        let mut prom = 0.0;
        let mut hxy1 = 0.0;
        for (&(i, j), &p) in &self.pairs {
            let (fi, fj) = (i as f64, j as f64);
            let d = fi - fj;
            asm += p * p;
            contrast += d * d * p;
            cross += fi * fj * p;
            idm += p / (1.0 + d * d);
            diss += d.abs() * p;
            let s = fi + fj - 2.0 * mu;
            shade += s.powi(3) * p;
            prom += s.powi(4) * p;
            let pi = px.get(&i).copied().unwrap_or(0.0);
            let pj = px.get(&j).copied().unwrap_or(0.0);
            if pi > 0.0 && pj > 0.0 {
                hxy1 -= p * (pi * pj).ln();
            }
        }

        let corr = if var > 0.0 { (cross - mu * mu) / var } else { 0.0 };

        let savg: f64 = p_sum.iter().map(|(&k, &p)| k as f64 * p).sum();
        let svar: f64 = p_sum.iter().map(|(&k, &p)| (k as f64 - savg).powi(2) * p).sum();
        let sent = entropy(p_sum.values().copied());

        let ent = entropy(self.pairs.values().copied());

        let dmean: f64 = p_diff.iter().map(|(&k, &p)| k as f64 * p).sum();
        let dvar: f64 = p_diff.iter().map(|(&k, &p)| (k as f64 - dmean).powi(2) * p).sum();
        let dent = entropy(p_diff.values().copied());

        let hx = entropy(px.values().copied());
        // HXY2 over the product of marginals reduces to HX + HY
        let hxy2 = 2.0 * hx;
        let imcorr1 = if hx > 0.0 { (ent - hxy1) / hx } else { 0.0 };
        let imcorr2 = (1.0 - (-2.0 * (hxy2 - ent)).exp()).max(0.0).sqrt();

        [
            asm, contrast, corr, var, idm, savg, svar, sent, ent, dvar, dent, imcorr1, imcorr2,
            diss, contrast, shade, prom,
        ]
    }
}

/// Co-occurrence texture of the first band over a `(2 size + 1)` window
///
/// Bands are named `<band>_<measure>`; the caller appends the size.
pub fn glcm_texture(image: &RasterImage, size: usize) -> RsrResult<RasterImage> {
    let band = image
        .first_band()
        .ok_or_else(|| RsrError::Processing("Cannot compute texture of a bandless image".to_string()))?;
    let data = &band.data;
    let (rows, cols) = data.dim();
    log::debug!("GLCM texture of '{}' at size {} over {}x{}", band.name, size, rows, cols);

    let mut measures: Vec<Array2<f64>> = (0..GLCM_MEASURES.len())
        .map(|_| Array2::from_elem((rows, cols), f64::NAN))
        .collect();
    for r in 0..rows {
        for c in 0..cols {
            if !data[[r, c]].is_finite() {
                continue;
            }
            if let Some(glcm) = Cooccurrence::collect(data, r, c, size) {
                for (m, value) in glcm.measures().into_iter().enumerate() {
                    measures[m][[r, c]] = value;
                }
            }
        }
    }

    let mut out = RasterImage::new(*image.transform(), image.shape()).resample(image.resample_method());
    for (name, grid) in GLCM_MEASURES.iter().zip(measures) {
        out = out.with_band(&format!("{}_{}", band.name, name), grid)?;
    }
    Ok(out)
}

/// Local Geary's C: `sum((x - x_n)^2) / 81` over a 9x9 neighbourhood
pub fn gearys_c(quantized: &RasterImage) -> RsrResult<RasterImage> {
    let band = quantized
        .first_band()
        .ok_or_else(|| RsrError::Processing("Cannot compute Geary's C of a bandless image".to_string()))?;
    let kernel = Kernel::gearys();
    let cells = (kernel.size() * kernel.size()) as f64;
    let offsets = kernel.offsets();
    let data = &band.data;
    let (rows, cols) = data.dim();

    let c = build_grid((rows, cols), |r, c| {
        let x = data[[r, c]];
        if !x.is_finite() {
            return f64::NAN;
        }
        let mut total = 0.0;
        for &(dr, dc, w) in &offsets {
            let nr = r as isize + dr;
            let nc = c as isize + dc;
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let xn = data[[nr as usize, nc as usize]];
            if xn.is_finite() {
                total += w * (x - xn).powi(2);
            }
        }
        total / cells
    });

    RasterImage::from_like(quantized, "gearys_c", c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn single(values: Array2<f64>) -> RasterImage {
        RasterImage::from_bands(GeoTransform::default(), vec![("ndvi".to_string(), values)]).unwrap()
    }

    #[test]
    fn test_quantize() {
        let img = single(array![[0.5, -0.2], [1.5, f64::NAN]]);
        let q = quantize(&img, 255);
        let band = q.band("ndvi").unwrap();
        assert_eq!(band[[0, 0]], 127.0);
        assert_eq!(band[[0, 1]], 0.0);
        assert_eq!(band[[1, 0]], 255.0);
        assert!(band[[1, 1]].is_nan());
    }

    #[test]
    fn test_uniform_texture() {
        let img = single(Array2::from_elem((5, 5), 3.0));
        let out = glcm_texture(&img, 1).unwrap();
        assert_eq!(out.num_bands(), 17);
        assert_eq!(out.band_names()[0], "ndvi_asm");
        assert_abs_diff_eq!(out.band("ndvi_asm").unwrap()[[2, 2]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.band("ndvi_contrast").unwrap()[[2, 2]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.band("ndvi_ent").unwrap()[[2, 2]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.band("ndvi_savg").unwrap()[[2, 2]], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_striped_texture_contrast() {
        // vertical stripes 0/1: horizontal pairs differ, vertical pairs match
        let img = single(Array2::from_shape_fn((5, 5), |(_, c)| (c % 2) as f64));
        let out = glcm_texture(&img, 2).unwrap();
        let contrast = out.band("ndvi_contrast").unwrap()[[2, 2]];
        let inertia = out.band("ndvi_inertia").unwrap()[[2, 2]];
        assert!(contrast > 0.0 && contrast < 1.0);
        assert_eq!(contrast, inertia);
        assert!(out.band("ndvi_corr").unwrap()[[2, 2]] < 0.0);
    }

    #[test]
    fn test_gearys_c() {
        let flat = single(Array2::from_elem((9, 9), 10.0));
        let c = gearys_c(&flat).unwrap();
        assert_eq!(c.band("gearys_c").unwrap()[[4, 4]], 0.0);

        let mut spike = Array2::from_elem((9, 9), 0.0);
        spike[[4, 4]] = 9.0;
        let c = gearys_c(&single(spike)).unwrap();
        assert_abs_diff_eq!(c.band("gearys_c").unwrap()[[4, 4]], 80.0 * 81.0 / 81.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.band("gearys_c").unwrap()[[0, 0]], 1.0, epsilon = 1e-9);
    }
}
